//! Handlebars-style code generation templates.
//!
//! Templates are rendered against a `serde_json::Value` context with a
//! fixed helper table and named partials registered on a [`Templates`]
//! instance. Output is never HTML-escaped.

use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use serde_json::Value;
use tracing::debug;

mod error;
mod helpers;
mod parser;
mod render;

pub use error::TemplateError;
pub use helpers::slugify;

use parser::{Node, parse_template};
use render::Renderer;

/// Marker separating a template's output name from its `.tpl` suffix.
const TEMPLATE_MARKER: &str = ".tpl";

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    pub fn compile(name: impl Into<String>, source: &str) -> Result<Self, TemplateError> {
        let name = name.into();
        let nodes = parse_template(source).map_err(|e| e.in_template(&name))?;
        Ok(Self { name, nodes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Partial registry plus rendering entry points.
#[derive(Debug, Default)]
pub struct Templates {
    partials: HashMap<String, Template>,
}

impl Templates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a partial, replacing any previous one with that name.
    pub fn register_partial(
        &mut self,
        name: impl Into<String>,
        source: &str,
    ) -> Result<(), TemplateError> {
        let template = Template::compile(name, source)?;
        self.partials.insert(template.name.clone(), template);
        Ok(())
    }

    pub fn has_partial(&self, name: &str) -> bool {
        self.partials.contains_key(name)
    }

    pub(crate) fn partial(&self, name: &str) -> Option<&[Node]> {
        self.partials.get(name).map(|t| t.nodes.as_slice())
    }

    /// Registers every `*.tpl.*` file in `dir` under its partial name
    /// (`if-conditions.tpl.h` becomes `ifConditionsPartial`). Returns the
    /// number of partials registered.
    pub async fn load_partials(&mut self, dir: &Path) -> Result<usize, TemplateError> {
        let io_err = |source| TemplateError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(name) = partial_name(&file_name) {
                files.push((name, entry.path()));
            }
        }
        // Directory order is platform dependent.
        files.sort();

        for (name, path) in &files {
            let source = read_source(path).await?;
            debug!(partial = %name, path = %path.display(), "registering partial");
            self.register_partial(name.clone(), &source)?;
        }

        Ok(files.len())
    }

    pub fn render(&self, template: &Template, context: &Value) -> Result<String, TemplateError> {
        Renderer::new(self).render(&template.nodes, context)
    }

    pub fn render_str(&self, source: &str, context: &Value) -> Result<String, TemplateError> {
        let template = Template::compile("<inline>", source)?;
        self.render(&template, context)
    }

    /// Renders the template file at `source` into `out_dir`, naming the
    /// output after the template minus its `.tpl` marker. Returns the
    /// written path.
    pub async fn render_file(
        &self,
        source: &Path,
        out_dir: &Path,
        context: &Value,
    ) -> Result<PathBuf, TemplateError> {
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let template = Template::compile(file_name.clone(), &read_source(source).await?)?;
        let rendered = self.render(&template, context)?;

        let target = out_dir.join(output_name(&file_name));
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|source| TemplateError::Io {
                path: out_dir.to_path_buf(),
                source,
            })?;
        tokio::fs::write(&target, rendered)
            .await
            .map_err(|source| TemplateError::Io {
                path: target.clone(),
                source,
            })?;

        Ok(target)
    }
}

async fn read_source(path: &Path) -> Result<String, TemplateError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// `neo_scenes.tpl.h` renders to `neo_scenes.h`.
pub fn output_name(template_name: &str) -> String {
    template_name.replacen(TEMPLATE_MARKER, "", 1)
}

/// `events.tpl.h` registers as `eventsPartial`, `if-conditions.tpl.h` as
/// `ifConditionsPartial`. Files without the `.tpl` marker are not partials.
pub fn partial_name(file_name: &str) -> Option<String> {
    let (stem, rest) = file_name.split_once(TEMPLATE_MARKER)?;
    if stem.is_empty() || !(rest.is_empty() || rest.starts_with('.')) {
        return None;
    }

    let mut name = String::with_capacity(stem.len() + 7);
    let mut upper = false;
    for ch in stem.chars() {
        if matches!(ch, '-' | '_' | ' ' | '.') {
            upper = !name.is_empty();
        } else if upper {
            name.extend(ch.to_uppercase());
            upper = false;
        } else {
            name.push(ch);
        }
    }
    if name.is_empty() {
        return None;
    }
    name.push_str("Partial");
    Some(name)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_output_name() {
        assert_eq!(output_name("neo_scenes.tpl.h"), "neo_scenes.h");
        assert_eq!(output_name("Makefile.tpl"), "Makefile");
        assert_eq!(output_name("plain.h"), "plain.h");
    }

    #[test]
    fn test_partial_name() {
        assert_eq!(partial_name("events.tpl.h").as_deref(), Some("eventsPartial"));
        assert_eq!(
            partial_name("if-conditions.tpl.h").as_deref(),
            Some("ifConditionsPartial")
        );
        assert_eq!(partial_name("value.tpl").as_deref(), Some("valuePartial"));
        assert_eq!(partial_name("README.md"), None);
        assert_eq!(partial_name("x.tplx"), None);
    }

    #[test]
    fn test_register_partial_is_idempotent() {
        let mut templates = Templates::new();
        templates.register_partial("greetPartial", "hi {{name}}").unwrap();
        templates.register_partial("greetPartial", "hello {{name}}").unwrap();

        let out = templates
            .render_str("{{>greetPartial}}!", &json!({ "name": "bob" }))
            .unwrap();
        assert_eq!(out, "hello bob!");
    }

    #[test]
    fn test_syntax_error_names_template() {
        let err = Template::compile("neo_types.tpl.h", "{{#if a}}").unwrap_err();
        assert!(err.to_string().contains("neo_types.tpl.h"));
    }

    #[tokio::test]
    async fn test_load_partials_and_render_file() {
        let dir = tempfile::tempdir().unwrap();
        let partials = dir.path().join("partials");
        std::fs::create_dir_all(&partials).unwrap();
        std::fs::write(partials.join("item-line.tpl.h"), "int {{name}};\n").unwrap();
        std::fs::write(partials.join("notes.txt"), "ignored").unwrap();
        std::fs::write(
            dir.path().join("decls.tpl.h"),
            "{{#each items}}\n{{>itemLinePartial}}\n{{/each}}\n",
        )
        .unwrap();

        let mut templates = Templates::new();
        assert_eq!(templates.load_partials(&partials).await.unwrap(), 1);
        assert!(templates.has_partial("itemLinePartial"));

        let out_dir = dir.path().join("build");
        let context = json!({ "items": [{ "name": "a" }, { "name": "b" }] });
        let written = templates
            .render_file(&dir.path().join("decls.tpl.h"), &out_dir, &context)
            .await
            .unwrap();

        assert_eq!(written, out_dir.join("decls.h"));
        assert_eq!(std::fs::read_to_string(written).unwrap(), "int a;\nint b;\n");
    }
}
