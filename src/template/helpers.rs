use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use super::error::TemplateError;

/// The fixed set of helpers templates can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Helper {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    And,
    Or,
    Not,
    Isset,
    Multiply,
    Entries,
    Concat,
    Uppercase,
    Lowercase,
    Slug,
    EnsureArray,
    HasItems,
    Posix,
    IsRawValue,
    PreserveLineBreaks,
    Valuedef,
    Int,
    Bool,
}

impl Helper {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => Helper::Eq,
            "ne" | "neq" => Helper::Ne,
            "gt" => Helper::Gt,
            "lt" => Helper::Lt,
            "gte" => Helper::Gte,
            "lte" => Helper::Lte,
            "and" => Helper::And,
            "or" => Helper::Or,
            "not" => Helper::Not,
            "isset" => Helper::Isset,
            "multiply" => Helper::Multiply,
            "entries" => Helper::Entries,
            "concat" => Helper::Concat,
            "uppercase" => Helper::Uppercase,
            "lowercase" => Helper::Lowercase,
            "slug" => Helper::Slug,
            "ensureArray" => Helper::EnsureArray,
            "hasItems" => Helper::HasItems,
            "posix" => Helper::Posix,
            "isRawValue" => Helper::IsRawValue,
            "preserveLineBreaks" => Helper::PreserveLineBreaks,
            "valuedef" => Helper::Valuedef,
            "int" => Helper::Int,
            "bool" => Helper::Bool,
            _ => return None,
        })
    }

    pub fn call(self, args: &[&Value]) -> Result<Value, TemplateError> {
        const UNDEFINED: &Value = &Value::Null;
        let arg = |i: usize| args.get(i).copied().unwrap_or(UNDEFINED);

        Ok(match self {
            Helper::Eq => Value::Bool(strict_eq(arg(0), arg(1))),
            Helper::Ne => Value::Bool(!strict_eq(arg(0), arg(1))),
            Helper::Gt => Value::Bool(compare(arg(0), arg(1)) == Some(Ordering::Greater)),
            Helper::Lt => Value::Bool(compare(arg(0), arg(1)) == Some(Ordering::Less)),
            Helper::Gte => Value::Bool(matches!(
                compare(arg(0), arg(1)),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            Helper::Lte => Value::Bool(matches!(
                compare(arg(0), arg(1)),
                Some(Ordering::Less | Ordering::Equal)
            )),
            Helper::And => Value::Bool(!args.is_empty() && args.iter().all(|v| is_truthy(v))),
            Helper::Or => {
                if is_truthy(arg(0)) {
                    arg(0).clone()
                } else {
                    arg(1).clone()
                }
            }
            Helper::Not => Value::Bool(!is_truthy(arg(0))),
            Helper::Isset => Value::Bool(is_truthy(arg(0))),
            Helper::Multiply => number_value(to_number(arg(0)) * to_number(arg(1))),
            Helper::Entries => match arg(0) {
                Value::Object(map) => map
                    .iter()
                    .map(|(key, value)| Value::Array(vec![Value::String(key.clone()), value.clone()]))
                    .collect(),
                _ => Value::Array(Vec::new()),
            },
            Helper::Concat => Value::String(args.iter().map(|v| display(v)).collect()),
            Helper::Uppercase => Value::String(display(arg(0)).to_uppercase()),
            Helper::Lowercase => Value::String(display(arg(0)).to_lowercase()),
            Helper::Slug => Value::String(slugify(&display(arg(0)))),
            Helper::EnsureArray => match arg(0) {
                Value::Array(items) => Value::Array(items.clone()),
                value if is_truthy(value) => Value::Array(vec![value.clone()]),
                _ => Value::Array(Vec::new()),
            },
            Helper::HasItems => {
                Value::Bool(matches!(arg(0), Value::Array(items) if !items.is_empty()))
            }
            Helper::Posix => Value::String(
                display(arg(0))
                    .chars()
                    .map(|c| if c.is_whitespace() { "\\ ".to_string() } else { c.to_string() })
                    .collect(),
            ),
            Helper::IsRawValue => Value::Bool(matches!(
                arg(0),
                Value::String(_) | Value::Number(_) | Value::Bool(_)
            )),
            Helper::PreserveLineBreaks => Value::String(display(arg(0)).replace('\n', "\\n")),
            Helper::Valuedef => match arg(0) {
                Value::Null => arg(1).clone(),
                Value::String(s) if s.is_empty() => arg(1).clone(),
                value => value.clone(),
            },
            Helper::Int => Value::from(to_int(arg(0))),
            Helper::Bool => Value::Bool(to_bool(arg(0))),
        })
    }
}

/// Truthiness used by `{{#if}}`, `{{#unless}}` and `{{#with}}`: empty
/// arrays count as false on top of the usual falsy scalars.
pub(crate) fn is_empty(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        other => !is_truthy(other),
    }
}

/// Scalar truthiness: `false`, `null`, `0` and `""` are falsy, every
/// array and object is truthy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text form of a value as it appears in rendered output.
pub(crate) fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => display_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn display_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => to_number(a).partial_cmp(&to_number(b)),
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// Integer form of a value for generated source: numbers truncate, strings
/// parse their leading integer, everything else is 0 or 1.
fn to_int(value: &Value) -> i64 {
    match value {
        Value::Bool(b) => i64::from(*b),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            let end = s
                .char_indices()
                .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
                .map_or(s.len(), |(i, _)| i);
            s[..end].parse().unwrap_or(0)
        }
        Value::Null | Value::Array(_) | Value::Object(_) => 0,
    }
}

fn to_bool(value: &Value) -> bool {
    match value {
        Value::String(s) => !matches!(s.trim(), "" | "0" | "false"),
        other => is_truthy(other),
    }
}

/// Identifier-safe form of a display name: accented Latin letters folded
/// to ASCII, lowercase alphanumerics kept, whitespace and underscore runs
/// collapsed to `_`, everything else dropped.
pub fn slugify(input: &str) -> String {
    let mut cleaned = String::with_capacity(input.len());
    for c in input.chars().flat_map(char::to_lowercase) {
        match c {
            '_' => cleaned.push(' '),
            c if c.is_ascii_alphanumeric() || c.is_whitespace() => cleaned.push(c),
            c => cleaned.push_str(transliterate(c)),
        }
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join("_")
}

/// ASCII spelling of a lowercase Latin letter, empty for anything else.
fn transliterate(c: char) -> &'static str {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' | 'ľ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ß' => "ss",
        'ś' | 'š' | 'ş' => "s",
        'ť' | 'ţ' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => "",
    }
}

/// Merges `hash` pairs over the partial context, when there are any.
pub(crate) fn extend_context(base: Value, hash: Vec<(String, Value)>) -> Value {
    if hash.is_empty() {
        return base;
    }
    let mut map = match base {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.extend(hash);
    Value::Object(map)
}
