use std::borrow::Cow;

use serde_json::Value;

use super::Templates;
use super::error::{TemplateError, bail_render_error};
use super::helpers::{display, extend_context, is_empty};
use super::parser::{Block, BlockKind, Expr, Node, Partial, PathExpr};

const MAX_PARTIAL_DEPTH: usize = 64;

/// Iteration state visible through `@index`, `@first`, `@last`, `@key`.
struct Frame {
    index: usize,
    first: bool,
    last: bool,
    key: Option<String>,
}

/// One level of the context stack. Only `each`, `with` and partials push a
/// new scope; `if`/`unless` render in the scope they appear in.
struct Scope<'a> {
    value: Cow<'a, Value>,
    frame: Option<Frame>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    fn child(value: Cow<'a, Value>, frame: Option<Frame>, parent: &'a Scope<'a>) -> Self {
        Self {
            value,
            frame,
            parent: Some(parent),
        }
    }

    fn ancestor(&self, depth: usize) -> Option<&Scope<'a>> {
        let mut scope = self;
        for _ in 0..depth {
            scope = scope.parent?;
        }
        Some(scope)
    }

    fn root(&self) -> &Scope<'a> {
        let mut scope = self;
        while let Some(parent) = scope.parent {
            scope = parent;
        }
        scope
    }

    fn frame(&self, depth: usize) -> Option<&Frame> {
        let mut scope = Some(self);
        let mut frames = std::iter::from_fn(|| {
            let current = scope?;
            scope = current.parent;
            Some(current)
        })
        .filter_map(|s| s.frame.as_ref());
        frames.nth(depth)
    }
}

pub(crate) struct Renderer<'t> {
    templates: &'t Templates,
    depth: usize,
}

impl<'t> Renderer<'t> {
    pub fn new(templates: &'t Templates) -> Self {
        Self {
            templates,
            depth: 0,
        }
    }

    pub fn render(&mut self, nodes: &[Node], context: &Value) -> Result<String, TemplateError> {
        let root = Scope {
            value: Cow::Borrowed(context),
            frame: None,
            parent: None,
        };
        let mut out = String::new();
        self.render_nodes(nodes, &root, &mut out)?;
        Ok(out)
    }

    fn render_nodes(
        &mut self,
        nodes: &[Node],
        scope: &Scope<'_>,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(expr) => {
                    let value = eval(expr, scope)?;
                    out.push_str(&display(&value));
                }
                Node::Block(block) => self.render_block(block, scope, out)?,
                Node::Partial(partial) => self.render_partial(partial, scope, out)?,
            }
        }
        Ok(())
    }

    fn render_block(
        &mut self,
        block: &Block,
        scope: &Scope<'_>,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        let value = eval(&block.param, scope)?;

        match block.kind {
            BlockKind::If | BlockKind::Unless => {
                let truthy = !is_empty(&value) ^ (block.kind == BlockKind::Unless);
                let nodes = if truthy { &block.body } else { &block.inverse };
                self.render_nodes(nodes, scope, out)
            }
            BlockKind::With => {
                if is_empty(&value) {
                    return self.render_nodes(&block.inverse, scope, out);
                }
                let child = Scope::child(Cow::Borrowed(&*value), None, scope);
                self.render_nodes(&block.body, &child, out)
            }
            BlockKind::Each => match &*value {
                Value::Array(items) if !items.is_empty() => {
                    let last = items.len() - 1;
                    for (index, item) in items.iter().enumerate() {
                        let frame = Frame {
                            index,
                            first: index == 0,
                            last: index == last,
                            key: None,
                        };
                        let child = Scope::child(Cow::Borrowed(item), Some(frame), scope);
                        self.render_nodes(&block.body, &child, out)?;
                    }
                    Ok(())
                }
                Value::Object(map) if !map.is_empty() => {
                    let last = map.len() - 1;
                    for (index, (key, item)) in map.iter().enumerate() {
                        let frame = Frame {
                            index,
                            first: index == 0,
                            last: index == last,
                            key: Some(key.clone()),
                        };
                        let child = Scope::child(Cow::Borrowed(item), Some(frame), scope);
                        self.render_nodes(&block.body, &child, out)?;
                    }
                    Ok(())
                }
                _ => self.render_nodes(&block.inverse, scope, out),
            },
        }
    }

    fn render_partial(
        &mut self,
        partial: &Partial,
        scope: &Scope<'_>,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        let templates = self.templates;
        let nodes = templates
            .partial(&partial.name)
            .ok_or_else(|| TemplateError::MissingPartial(partial.name.clone().into()))?;

        if self.depth >= MAX_PARTIAL_DEPTH {
            bail_render_error!(
                "partial `{}` nested more than {} levels deep",
                partial.name,
                MAX_PARTIAL_DEPTH
            );
        }

        let base = match &partial.context {
            Some(expr) => eval(expr, scope)?,
            None => Cow::Borrowed(&*scope.value),
        };
        let value = if partial.hash.is_empty() {
            base
        } else {
            let hash = partial
                .hash
                .iter()
                .map(|(key, expr)| Ok((key.clone(), eval(expr, scope)?.into_owned())))
                .collect::<Result<Vec<_>, TemplateError>>()?;
            Cow::Owned(extend_context(base.into_owned(), hash))
        };

        let child = Scope::child(value, None, scope);
        self.depth += 1;
        let result = self.render_nodes(nodes, &child, out);
        self.depth -= 1;
        result
    }
}

fn eval<'s>(expr: &Expr, scope: &'s Scope<'_>) -> Result<Cow<'s, Value>, TemplateError> {
    match expr {
        Expr::Literal(value) => Ok(Cow::Owned(value.clone())),
        Expr::Path(path) => Ok(resolve(path, scope)),
        Expr::Call(helper, args) => {
            let args = args
                .iter()
                .map(|arg| eval(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            let args: Vec<&Value> = args.iter().map(|arg| &**arg).collect();
            Ok(Cow::Owned(helper.call(&args)?))
        }
    }
}

/// Missing values resolve to `null`, which renders as nothing.
fn resolve<'s>(path: &PathExpr, scope: &'s Scope<'_>) -> Cow<'s, Value> {
    if path.data {
        return resolve_data(path, scope);
    }
    match scope.ancestor(path.depth) {
        Some(target) => descend(&*target.value, &path.parts),
        None => Cow::Owned(Value::Null),
    }
}

fn resolve_data<'s>(path: &PathExpr, scope: &'s Scope<'_>) -> Cow<'s, Value> {
    let Some((name, rest)) = path.parts.split_first() else {
        return Cow::Owned(Value::Null);
    };

    if name == "root" {
        return descend(&*scope.root().value, rest);
    }

    let Some(frame) = scope.frame(path.depth) else {
        return Cow::Owned(Value::Null);
    };
    let value = match name.as_str() {
        "index" => Value::from(frame.index),
        "first" => Value::Bool(frame.first),
        "last" => Value::Bool(frame.last),
        "key" => frame.key.clone().map_or(Value::Null, Value::String),
        _ => Value::Null,
    };
    Cow::Owned(value)
}

fn descend<'v>(mut value: &'v Value, parts: &[String]) -> Cow<'v, Value> {
    for (i, part) in parts.iter().enumerate() {
        let next = match value {
            Value::Object(map) => map.get(part),
            Value::Array(items) if part == "length" => {
                let len = Value::from(items.len());
                return descend_owned(len, &parts[i + 1..]);
            }
            Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            Value::String(s) if part == "length" => {
                let len = Value::from(s.chars().count());
                return descend_owned(len, &parts[i + 1..]);
            }
            _ => None,
        };
        match next {
            Some(next) => value = next,
            None => return Cow::Owned(Value::Null),
        }
    }
    Cow::Borrowed(value)
}

fn descend_owned<'v>(value: Value, rest: &[String]) -> Cow<'v, Value> {
    if rest.is_empty() {
        Cow::Owned(value)
    } else {
        Cow::Owned(descend(&value, rest).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::template::Template;

    fn render(source: &str, context: Value) -> String {
        Templates::new()
            .render_str(source, &context)
            .unwrap()
    }

    #[test]
    fn test_paths_and_literals() {
        let context = json!({ "a": { "b": [10, 20] }, "s": "abc" });
        assert_eq!(render("{{a.b.[1]}}/{{a.b.length}}/{{s.length}}", context.clone()), "20/2/3");
        assert_eq!(render("[{{missing.deep}}]", context.clone()), "[]");
        assert_eq!(render("{{{a.b}}}", context), "10,20");
    }

    #[test]
    fn test_if_unless_else() {
        let context = json!({ "yes": 1, "no": 0, "empty": [], "obj": {} });
        assert_eq!(render("{{#if yes}}Y{{else}}N{{/if}}", context.clone()), "Y");
        assert_eq!(render("{{#if no}}Y{{else}}N{{/if}}", context.clone()), "N");
        assert_eq!(render("{{#if empty}}Y{{else}}N{{/if}}", context.clone()), "N");
        assert_eq!(render("{{#if obj}}Y{{else}}N{{/if}}", context.clone()), "Y");
        assert_eq!(render("{{#unless no}}U{{/unless}}", context.clone()), "U");
        assert_eq!(
            render("{{#if no}}A{{else if yes}}B{{else}}C{{/if}}", context),
            "B"
        );
    }

    #[test]
    fn test_each_data_and_parent_paths() {
        let context = json!({
            "prefix": "p",
            "rows": [ { "cells": ["a", "b"] }, { "cells": ["c"] } ],
        });
        let source = "{{#each rows}}{{#each this.cells}}{{../../prefix}}{{@../index}}{{@index}}{{this}}{{#unless @last}},{{/unless}}{{/each}};{{/each}}";
        assert_eq!(render(source, context), "p00a,p01b;p10c;");
    }

    #[test]
    fn test_each_object_and_else() {
        let context = json!({ "map": { "x": 1, "y": 2 }, "none": [] });
        assert_eq!(
            render("{{#each map}}{{@key}}={{this}}{{#unless @last}}&{{/unless}}{{/each}}", context.clone()),
            "x=1&y=2"
        );
        assert_eq!(render("{{#each none}}x{{else}}empty{{/each}}", context), "empty");
    }

    #[test]
    fn test_with_block() {
        let context = json!({ "player": { "x": 3 }, "name": "n" });
        assert_eq!(render("{{#with player}}{{x}}{{../name}}{{/with}}", context), "3n");
    }

    #[test]
    fn test_partials_with_hash_and_recursion() {
        let mut templates = Templates::new();
        templates
            .register_partial(
                "listPartial",
                "{{#each items}}{{../prefix}}_{{@index}}{{#if this.children}}[{{>listPartial prefix=(concat ../prefix \"_\" @index) items=this.children}}]{{/if}} {{/each}}",
            )
            .unwrap();

        let context = json!({
            "items": [ { "children": [ {}, {} ] }, {} ],
        });
        let out = templates
            .render_str("{{>listPartial prefix=\"e\" items=items}}", &context)
            .unwrap();
        assert_eq!(out, "e_0[e_0_0 e_0_1 ] e_1 ");
    }

    #[test]
    fn test_missing_partial_fails() {
        let err = Templates::new()
            .render_str("{{>nopePartial}}", &json!({}))
            .unwrap_err();
        assert!(matches!(err, TemplateError::MissingPartial(name) if name == "nopePartial"));
    }

    #[test]
    fn test_runaway_partial_recursion() {
        let mut templates = Templates::new();
        templates.register_partial("loopPartial", "{{>loopPartial}}").unwrap();
        let err = templates
            .render_str("{{>loopPartial}}", &json!({}))
            .unwrap_err();
        assert!(matches!(err, TemplateError::RenderError(_)));
    }

    #[test]
    fn test_standalone_lines_render_cleanly() {
        let source = "\
int values[] = {
  {{#each values}}
  {{this}}{{#unless @last}},{{/unless}}
  {{/each}}
};
";
        let out = render(source, json!({ "values": [1, 2] }));
        assert_eq!(out, "int values[] = {\n  1,\n  2\n};\n");
    }

    #[test]
    fn test_render_is_deterministic() {
        let template = Template::compile("t", "{{#each a}}{{slug this}};{{/each}}").unwrap();
        let templates = Templates::new();
        let context = json!({ "a": ["My Scene", "Other One"] });
        let first = templates.render(&template, &context).unwrap();
        let second = templates.render(&template, &context).unwrap();
        assert_eq!(first, "my_scene;other_one;");
        assert_eq!(first, second);
    }
}
