//! Project data: the snapshot model, its normalization passes and the
//! on-disk project tree.

use std::path::Path;

use serde_json::{Map, Value, json};

mod model;
mod sanitize;
mod serialize;
mod store;

pub use model::*;
pub use sanitize::{
    BackgroundSizes, DEFAULT_GRID_SIZE, ImageSizes, NoBackgrounds, sanitize, sanitize_project,
    sanitize_scene, sanitize_script,
};
pub use serialize::{serialize, serialize_scene, unserialize, unserialize_scene};
pub use store::ProjectStore;

/// Directories exposed to templates under `paths`.
#[derive(Debug, Clone, Copy)]
pub struct ContextPaths<'a> {
    pub project_dir: &'a Path,
    pub build_dir: &'a Path,
    pub resources_dir: &'a Path,
}

impl Snapshot {
    /// The value templates are rendered against. Variables are flattened
    /// into `[{key, value}]` across all variable files.
    pub fn template_context(&self, paths: ContextPaths<'_>) -> Result<Value, serde_json::Error> {
        let mut context = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let variables = self
            .variables
            .iter()
            .flat_map(|set| set.values.iter())
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();
        context.insert("variables".into(), Value::Array(variables));
        context
            .entry("project")
            .or_insert_with(|| Value::Object(Map::new()));
        context.insert(
            "paths".into(),
            json!({
                "projectDir": paths.project_dir.display().to_string(),
                "buildDir": paths.build_dir.display().to_string(),
                "resourcesDir": paths.resources_dir.display().to_string(),
            }),
        );

        Ok(Value::Object(context))
    }
}
