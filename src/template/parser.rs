use serde_json::{Number, Value};

use super::error::{ErrorContext, TemplateError, bail_syntax_error};
use super::helpers::Helper;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Output(Expr),
    Block(Block),
    Partial(Partial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    If,
    Unless,
    Each,
    With,
}

impl BlockKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "if" => Some(BlockKind::If),
            "unless" => Some(BlockKind::Unless),
            "each" => Some(BlockKind::Each),
            "with" => Some(BlockKind::With),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Block {
    pub kind: BlockKind,
    pub param: Expr,
    pub body: Vec<Node>,
    pub inverse: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Partial {
    pub name: String,
    pub context: Option<Expr>,
    pub hash: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Path(PathExpr),
    Call(Helper, Vec<Expr>),
}

/// `../../a.b.[0]` is `depth: 2, parts: [a, b, 0]`; `@../index` is a data
/// path one iteration frame up.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct PathExpr {
    pub data: bool,
    pub depth: usize,
    pub parts: Vec<String>,
}

impl PathExpr {
    fn parse(raw: &str) -> Result<Self, TemplateError> {
        let mut path = PathExpr::default();
        let mut rest = raw;

        if let Some(stripped) = rest.strip_prefix('@') {
            path.data = true;
            rest = stripped;
        }
        loop {
            if let Some(stripped) = rest.strip_prefix("../") {
                path.depth += 1;
                rest = stripped;
            } else if let Some(stripped) = rest.strip_prefix("./") {
                rest = stripped;
            } else {
                break;
            }
        }
        if rest == ".." {
            path.depth += 1;
            return Ok(path);
        }
        if rest == "this" || rest == "." {
            return Ok(path);
        }
        if let Some(stripped) = rest.strip_prefix("this.").or_else(|| rest.strip_prefix("this/")) {
            rest = stripped;
        }

        let mut chars = rest.chars().peekable();
        let mut segment = String::new();
        while let Some(ch) = chars.next() {
            match ch {
                '[' => {
                    let mut literal = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(c) => literal.push(c),
                            None => bail_syntax_error!("unterminated `[` in path `{}`", raw),
                        }
                    }
                    segment.push_str(&literal);
                }
                '.' | '/' => {
                    if segment.is_empty() {
                        bail_syntax_error!("empty segment in path `{}`", raw);
                    }
                    path.parts.push(std::mem::take(&mut segment));
                }
                c => segment.push(c),
            }
        }
        if segment.is_empty() {
            bail_syntax_error!("invalid path `{}`", raw);
        }
        path.parts.push(segment);

        Ok(path)
    }
}

/// Parses template source into a node tree.
pub(crate) fn parse_template(source: &str) -> Result<Vec<Node>, TemplateError> {
    let mut segments = scan(source)?;
    apply_whitespace_control(&mut segments);

    let mut parser = TemplateParser {
        segments: segments.into_iter(),
    };
    let (nodes, end) = parser.parse_nodes()?;
    match end {
        End::Eof => Ok(nodes),
        End::Else { line, .. } => bail_syntax_error!("line {}: unexpected {{{{else}}}}", line),
        End::Close { name, line } => {
            bail_syntax_error!("line {}: unexpected closing tag {{{{/{}}}}}", line, name)
        }
    }
}

// Stage 1: split the source into raw text and `{{ }}` tags.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Output,
    Open,
    Close,
    Else,
    Partial,
    Comment,
}

impl TagKind {
    fn can_stand_alone(self) -> bool {
        !matches!(self, TagKind::Output)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Tag {
    kind: TagKind,
    body: String,
    strip_before: bool,
    strip_after: bool,
    line: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Tag(Tag),
}

fn scan(source: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut line = 1;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            let text = &rest[..start];
            line += text.matches('\n').count();
            segments.push(Segment::Text(text.to_string()));
        }

        let (tag, consumed) = scan_tag(&rest[start + 2..], line)?;
        line += rest[start..start + 2 + consumed].matches('\n').count();
        segments.push(Segment::Tag(tag));
        rest = &rest[start + 2 + consumed..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }

    Ok(segments)
}

/// Reads one tag starting right after its `{{`. Returns the tag and the
/// number of bytes consumed, closing braces included.
fn scan_tag(input: &str, line: usize) -> Result<(Tag, usize), TemplateError> {
    let mut offset = 0;
    let triple = input.starts_with('{');
    if triple {
        offset += 1;
    }
    let strip_before = input[offset..].starts_with('~');
    if strip_before {
        offset += 1;
    }

    let inner = &input[offset..];
    if let Some(comment) = inner.strip_prefix("!--") {
        let end = comment
            .find("--}}")
            .or_else(|| comment.find("--~}}"))
            .with_context_syntax(|| format!("line {line}: unterminated comment"))?;
        let strip_after = comment[end..].starts_with("--~");
        let close = if strip_after { 5 } else { 4 };
        let tag = Tag {
            kind: TagKind::Comment,
            body: String::new(),
            strip_before,
            strip_after,
            line,
        };
        return Ok((tag, offset + 3 + end + close));
    }

    let closing = if triple { "}}}" } else { "}}" };
    let end = inner
        .find(closing)
        .with_context_syntax(|| format!("line {line}: unclosed tag"))?;
    let mut body = inner[..end].trim();
    let strip_after = body.ends_with('~');
    if strip_after {
        body = body[..body.len() - 1].trim_end();
    }

    let (kind, body) = if triple {
        (TagKind::Output, body)
    } else if let Some(rest) = body.strip_prefix('#') {
        (TagKind::Open, rest)
    } else if let Some(rest) = body.strip_prefix('/') {
        (TagKind::Close, rest)
    } else if let Some(rest) = body.strip_prefix('>') {
        (TagKind::Partial, rest)
    } else if body.starts_with('!') {
        (TagKind::Comment, "")
    } else if body == "else" || body == "^" {
        (TagKind::Else, "")
    } else if let Some(rest) = body.strip_prefix("else ") {
        (TagKind::Else, rest)
    } else {
        (TagKind::Output, body)
    };

    let tag = Tag {
        kind,
        body: body.trim().to_string(),
        strip_before,
        strip_after,
        line,
    };
    Ok((tag, offset + end + closing.len()))
}

// Stage 2: `~` whitespace control and standalone tag lines.

fn is_blank(text: &str) -> bool {
    text.chars().all(|c| c == ' ' || c == '\t')
}

/// Byte offset just past the last newline, if only blanks follow it.
fn blank_line_tail(text: &str) -> Option<usize> {
    let newline = text.rfind('\n')?;
    is_blank(&text[newline + 1..]).then_some(newline + 1)
}

/// Byte offset just past the first newline, if only blanks precede it.
fn blank_line_head(text: &str) -> Option<usize> {
    let newline = text.find('\n')?;
    let head = text[..newline].strip_suffix('\r').unwrap_or(&text[..newline]);
    is_blank(head).then_some(newline + 1)
}

fn apply_whitespace_control(segments: &mut Vec<Segment>) {
    let len = segments.len();

    // Kept byte range of every text segment, computed on the original text.
    let mut keep: Vec<(usize, usize)> = segments
        .iter()
        .map(|segment| match segment {
            Segment::Text(text) => (0, text.len()),
            Segment::Tag(_) => (0, 0),
        })
        .collect();

    for i in 0..len {
        let Segment::Tag(tag) = &segments[i] else {
            continue;
        };
        let prev = i.checked_sub(1).and_then(|p| match &segments[p] {
            Segment::Text(text) => Some(text.as_str()),
            Segment::Tag(_) => None,
        });
        let next = match segments.get(i + 1) {
            Some(Segment::Text(text)) => Some(text.as_str()),
            _ => None,
        };

        if let (true, Some(text)) = (tag.strip_before, prev) {
            keep[i - 1].1 = keep[i - 1].1.min(text.trim_end().len());
        }
        if let (true, Some(text)) = (tag.strip_after, next) {
            keep[i + 1].0 = keep[i + 1].0.max(text.len() - text.trim_start().len());
        }

        if !tag.kind.can_stand_alone() {
            continue;
        }

        let prev_cut = match (i, prev) {
            (0, _) => Some(0),
            (1, Some(text)) if is_blank(text) => Some(0),
            (_, Some(text)) => blank_line_tail(text),
            (_, None) => None,
        };
        let next_cut = match next {
            None if i + 1 == len => Some(0),
            None => None,
            Some(text) if i + 2 == len && is_blank(text) => Some(text.len()),
            Some(text) => blank_line_head(text),
        };

        if let (Some(prev_cut), Some(next_cut)) = (prev_cut, next_cut) {
            if i > 0 && prev.is_some() {
                keep[i - 1].1 = keep[i - 1].1.min(prev_cut);
            }
            if next.is_some() {
                keep[i + 1].0 = keep[i + 1].0.max(next_cut);
            }
        }
    }

    let original = std::mem::take(segments);
    for (segment, (start, end)) in original.into_iter().zip(keep) {
        match segment {
            Segment::Text(text) => {
                if start < end {
                    segments.push(Segment::Text(text[start..end].to_string()));
                }
            }
            tag => segments.push(tag),
        }
    }
}

// Stage 3: expressions inside a tag.

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(String),
    String(String),
    Number(Number),
    True,
    False,
    Null,
    HashKey(String),
    LeftParen,
    RightParen,
    Eof,
}

struct Lexer<'a> {
    chars: core::iter::Peekable<core::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn next_char(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.next_char();
        }
    }

    fn read_string(&mut self, quote: char) -> Result<String, TemplateError> {
        let mut string = String::new();
        loop {
            match self.next_char() {
                Some('\\') => match self.next_char() {
                    Some(c) => string.push(c),
                    None => break,
                },
                Some(c) if c == quote => return Ok(string),
                Some(c) => string.push(c),
                None => break,
            }
        }
        bail_syntax_error!("unterminated string literal")
    }

    fn read_word(&mut self) -> Result<String, TemplateError> {
        let mut word = String::new();
        while let Some(ch) = self.peek_char() {
            match ch {
                '[' => {
                    // Segment literals may hold any character.
                    while let Some(c) = self.next_char() {
                        word.push(c);
                        if c == ']' {
                            break;
                        }
                    }
                }
                c if c.is_whitespace() || matches!(c, '(' | ')' | '=' | '"' | '\'') => break,
                c => {
                    word.push(c);
                    self.next_char();
                }
            }
        }
        if word.is_empty() {
            bail_syntax_error!("unexpected character");
        }
        Ok(word)
    }

    fn tokenize(&mut self) -> Result<Vec<Token>, TemplateError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(ch) = self.peek_char() else {
                break;
            };
            let token = match ch {
                '(' => {
                    self.next_char();
                    Token::LeftParen
                }
                ')' => {
                    self.next_char();
                    Token::RightParen
                }
                '"' | '\'' => {
                    self.next_char();
                    Token::String(self.read_string(ch)?)
                }
                _ => {
                    let word = self.read_word()?;
                    if self.peek_char() == Some('=') {
                        self.next_char();
                        Token::HashKey(word)
                    } else {
                        classify_word(word)
                    }
                }
            };
            tokens.push(token);
        }
        tokens.push(Token::Eof);
        Ok(tokens)
    }
}

fn classify_word(word: String) -> Token {
    match word.as_str() {
        "true" => return Token::True,
        "false" => return Token::False,
        "null" | "undefined" => return Token::Null,
        _ => {}
    }

    let numeric = word
        .strip_prefix('-')
        .unwrap_or(&word)
        .starts_with(|c: char| c.is_ascii_digit());
    if numeric {
        if let Ok(i) = word.parse::<i64>() {
            return Token::Number(Number::from(i));
        }
        if let Some(n) = word.parse::<f64>().ok().and_then(Number::from_f64) {
            return Token::Number(n);
        }
    }
    Token::Path(word)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn new(body: &str) -> Result<Self, TemplateError> {
        let tokens = Lexer::new(body).tokenize()?;
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn expect_end(&self) -> Result<(), TemplateError> {
        if !self.is_at_end() {
            bail_syntax_error!("unexpected {:?}", self.peek());
        }
        Ok(())
    }

    /// A single value: literal, path or parenthesized helper call.
    fn parse_operand(&mut self) -> Result<Expr, TemplateError> {
        match self.advance() {
            Token::Path(path) => Ok(Expr::Path(PathExpr::parse(&path)?)),
            Token::String(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::LeftParen => {
                let Token::Path(name) = self.advance() else {
                    bail_syntax_error!("expected a helper name after `(`");
                };
                let args = self.parse_args()?;
                if self.advance() != Token::RightParen {
                    bail_syntax_error!("expected `)` after arguments of `{}`", name);
                }
                call(&name, args)
            }
            token => bail_syntax_error!("unexpected {:?}", token),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, TemplateError> {
        let mut args = Vec::new();
        while !matches!(
            self.peek(),
            Token::Eof | Token::RightParen | Token::HashKey(_)
        ) {
            args.push(self.parse_operand()?);
        }
        Ok(args)
    }

    fn parse_hash(&mut self) -> Result<Vec<(String, Expr)>, TemplateError> {
        let mut hash = Vec::new();
        while let Token::HashKey(key) = self.peek().clone() {
            self.advance();
            hash.push((key, self.parse_operand()?));
        }
        Ok(hash)
    }

    /// `{{value}}` or `{{helper arg...}}`.
    fn parse_mustache(&mut self) -> Result<Expr, TemplateError> {
        let head = self.parse_operand()?;
        let args = self.parse_args()?;
        self.expect_end()?;

        if args.is_empty() {
            return Ok(head);
        }
        match head {
            Expr::Path(path) if !path.data && path.depth == 0 && path.parts.len() == 1 => {
                call(&path.parts[0], args)
            }
            _ => bail_syntax_error!("only helpers can take arguments"),
        }
    }
}

fn call(name: &str, args: Vec<Expr>) -> Result<Expr, TemplateError> {
    let helper = Helper::from_name(name)
        .ok_or_else(|| TemplateError::MissingHelper(name.to_string().into()))?;
    Ok(Expr::Call(helper, args))
}

/// `if cond` as found after `{{#` or `{{else `.
fn parse_block_open(body: &str, line: usize) -> Result<(BlockKind, Expr), TemplateError> {
    let (name, params) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let kind = BlockKind::from_name(name)
        .ok_or_else(|| TemplateError::MissingHelper(name.to_string().into()))?;

    let mut parser = ExprParser::new(params)?;
    if parser.is_at_end() {
        bail_syntax_error!("line {}: `{}` needs a parameter", line, name);
    }
    let param = parser.parse_mustache()?;
    Ok((kind, param))
}

fn parse_partial(body: &str) -> Result<Partial, TemplateError> {
    let mut parser = ExprParser::new(body)?;
    let name = match parser.advance() {
        Token::Path(name) | Token::String(name) => name,
        token => bail_syntax_error!("expected a partial name, found {:?}", token),
    };
    let context = match parser.peek() {
        Token::Eof | Token::HashKey(_) => None,
        _ => Some(parser.parse_operand()?),
    };
    let hash = parser.parse_hash()?;
    parser.expect_end()?;

    Ok(Partial {
        name,
        context,
        hash,
    })
}

// Stage 4: nest blocks.

enum End {
    Eof,
    Else {
        chain: Option<(BlockKind, Expr)>,
        line: usize,
    },
    Close {
        name: String,
        line: usize,
    },
}

struct TemplateParser {
    segments: std::vec::IntoIter<Segment>,
}

impl TemplateParser {
    fn parse_nodes(&mut self) -> Result<(Vec<Node>, End), TemplateError> {
        let mut nodes = Vec::new();

        while let Some(segment) = self.segments.next() {
            let tag = match segment {
                Segment::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Segment::Tag(tag) => tag,
            };

            let located = |e: TemplateError| match e {
                TemplateError::SyntaxError(msg) if !msg.starts_with("line ") => {
                    TemplateError::SyntaxError(format!("line {}: {}", tag.line, msg).into())
                }
                other => other,
            };

            match tag.kind {
                TagKind::Comment => {}
                TagKind::Output => {
                    let expr = ExprParser::new(&tag.body)
                        .and_then(|mut parser| parser.parse_mustache())
                        .map_err(located)?;
                    nodes.push(Node::Output(expr));
                }
                TagKind::Partial => nodes.push(Node::Partial(
                    parse_partial(&tag.body).map_err(located)?,
                )),
                TagKind::Open => {
                    let name = tag.body.split_whitespace().next().unwrap_or_default().to_string();
                    let (kind, param) = parse_block_open(&tag.body, tag.line).map_err(located)?;
                    let block = self.parse_block(kind, param, &name, tag.line)?;
                    nodes.push(Node::Block(block));
                }
                TagKind::Else => {
                    let chain = if tag.body.is_empty() {
                        None
                    } else {
                        Some(parse_block_open(&tag.body, tag.line).map_err(located)?)
                    };
                    return Ok((
                        nodes,
                        End::Else {
                            chain,
                            line: tag.line,
                        },
                    ));
                }
                TagKind::Close => {
                    return Ok((
                        nodes,
                        End::Close {
                            name: tag.body,
                            line: tag.line,
                        },
                    ));
                }
            }
        }

        Ok((nodes, End::Eof))
    }

    /// Parses a block body up to the `{{/name}}` that closes it. An
    /// `{{else if ...}}` becomes a nested block that shares that closing tag.
    fn parse_block(
        &mut self,
        kind: BlockKind,
        param: Expr,
        name: &str,
        line: usize,
    ) -> Result<Block, TemplateError> {
        let (body, end) = self.parse_nodes()?;
        let inverse = match end {
            End::Close { .. } => {
                self.check_close(end, name, line)?;
                Vec::new()
            }
            End::Else { chain: None, .. } => {
                let (inverse, end) = self.parse_nodes()?;
                self.check_close(end, name, line)?;
                inverse
            }
            End::Else {
                chain: Some((kind, param)),
                line,
            } => vec![Node::Block(self.parse_block(kind, param, name, line)?)],
            End::Eof => bail_syntax_error!("line {}: unclosed block `{}`", line, name),
        };

        Ok(Block {
            kind,
            param,
            body,
            inverse,
        })
    }

    fn check_close(&self, end: End, name: &str, line: usize) -> Result<(), TemplateError> {
        match end {
            End::Close {
                name: closing,
                line: close_line,
            } => {
                if closing != name {
                    bail_syntax_error!(
                        "line {}: `{}` opened on line {} does not match closing `{}`",
                        close_line,
                        name,
                        line,
                        closing
                    );
                }
                Ok(())
            }
            End::Else { line, .. } => bail_syntax_error!("line {}: duplicate {{{{else}}}}", line),
            End::Eof => bail_syntax_error!("line {}: unclosed block `{}`", line, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Expr {
        Expr::Path(PathExpr {
            data: false,
            depth: 0,
            parts: parts.iter().map(|p| p.to_string()).collect(),
        })
    }

    #[test]
    fn test_path_forms() {
        let p = PathExpr::parse("../../prefix").unwrap();
        assert_eq!((p.data, p.depth, p.parts), (false, 2, vec!["prefix".to_string()]));

        let p = PathExpr::parse("@../index").unwrap();
        assert_eq!((p.data, p.depth, p.parts), (true, 1, vec!["index".to_string()]));

        let p = PathExpr::parse("scenes.[0].id").unwrap();
        assert_eq!(p.parts, ["scenes", "0", "id"]);

        let p = PathExpr::parse("this").unwrap();
        assert!(p.parts.is_empty());

        let p = PathExpr::parse("this.events.length").unwrap();
        assert_eq!(p.parts, ["events", "length"]);

        assert!(PathExpr::parse("a..b").is_err());
    }

    #[test]
    fn test_text_and_output() {
        let nodes = parse_template("Hello {{name}}!").unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::Text("Hello ".into()),
                Node::Output(path(&["name"])),
                Node::Text("!".into()),
            ]
        );
    }

    #[test]
    fn test_helper_call_with_subexpression() {
        let nodes = parse_template(r#"{{uppercase (valuedef this.dir 'down')}}"#).unwrap();
        assert_eq!(
            nodes,
            vec![Node::Output(Expr::Call(
                Helper::Uppercase,
                vec![Expr::Call(
                    Helper::Valuedef,
                    vec![path(&["dir"]), Expr::Literal(Value::String("down".into()))],
                )],
            ))]
        );
    }

    #[test]
    fn test_standalone_block_lines_are_removed() {
        let source = "a\n  {{#if x}}\n  b\n  {{/if}}\nc\n";
        let nodes = parse_template(source).unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::Text("a\n".into()),
                Node::Block(Block {
                    kind: BlockKind::If,
                    param: path(&["x"]),
                    body: vec![Node::Text("  b\n".into())],
                    inverse: vec![],
                }),
                Node::Text("c\n".into()),
            ]
        );
    }

    #[test]
    fn test_tilde_strips_whitespace() {
        let nodes = parse_template("a  \n {{~x~}} \n b").unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::Text("a".into()),
                Node::Output(path(&["x"])),
                Node::Text("b".into()),
            ]
        );
    }

    #[test]
    fn test_else_if_chain() {
        let nodes = parse_template("{{#if a}}A{{else if b}}B{{else}}C{{/if}}").unwrap();
        let Node::Block(outer) = &nodes[0] else {
            panic!("expected block");
        };
        assert_eq!(outer.body, vec![Node::Text("A".into())]);
        let Node::Block(inner) = &outer.inverse[0] else {
            panic!("expected chained block");
        };
        assert_eq!(inner.param, path(&["b"]));
        assert_eq!(inner.body, vec![Node::Text("B".into())]);
        assert_eq!(inner.inverse, vec![Node::Text("C".into())]);
    }

    #[test]
    fn test_partial_with_hash() {
        let nodes =
            parse_template(r#"{{>eventsPartial prefix=(concat ../prefix "_" @index) events=this.events}}"#)
                .unwrap();
        let Node::Partial(partial) = &nodes[0] else {
            panic!("expected partial");
        };
        assert_eq!(partial.name, "eventsPartial");
        assert_eq!(partial.context, None);
        assert_eq!(partial.hash.len(), 2);
        assert_eq!(partial.hash[1], ("events".to_string(), path(&["events"])));
    }

    #[test]
    fn test_comments() {
        let nodes = parse_template("{{! short }}\n{{!-- has }} inside --}}x").unwrap();
        assert_eq!(nodes, vec![Node::Text("x".into())]);
    }

    #[test]
    fn test_literals() {
        let nodes = parse_template("{{valuedef a -1}}{{valuedef b 1.5}}{{eq c null}}").unwrap();
        let Node::Output(Expr::Call(_, args)) = &nodes[0] else {
            panic!("expected call");
        };
        assert_eq!(args[1], Expr::Literal(Value::from(-1)));
        let Node::Output(Expr::Call(_, args)) = &nodes[2] else {
            panic!("expected call");
        };
        assert_eq!(args[1], Expr::Literal(Value::Null));
    }

    #[test]
    fn test_missing_helper() {
        let err = parse_template("{{frobnicate a}}").unwrap_err();
        assert!(matches!(err, TemplateError::MissingHelper(name) if name == "frobnicate"));

        let err = parse_template("{{#repeat a}}x{{/repeat}}").unwrap_err();
        assert!(matches!(err, TemplateError::MissingHelper(name) if name == "repeat"));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            parse_template("{{#if a}}x").unwrap_err(),
            TemplateError::SyntaxError(_)
        ));
        assert!(matches!(
            parse_template("{{#if a}}x{{/each}}").unwrap_err(),
            TemplateError::SyntaxError(_)
        ));
        assert!(matches!(
            parse_template("x{{/if}}").unwrap_err(),
            TemplateError::SyntaxError(_)
        ));
        assert!(matches!(
            parse_template("{{name").unwrap_err(),
            TemplateError::SyntaxError(_)
        ));
    }
}
