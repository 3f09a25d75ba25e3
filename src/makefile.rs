//! Renders the toolchain Makefile for a build.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use crate::config::ProjectSettings;
use crate::error::Result;
use crate::paths::{BuildPaths, Resources};
use crate::project::GameProject;
use crate::template::Templates;

const DEFAULT_BUTANO_DIR: &str = "butano";
const DEFAULT_ROM_CODE: &str = "SBTP";
const ROM_TITLE_LEN: usize = 12;
const OBJECT_DIR: &str = "obj";

/// Template values for `Makefile.tpl`. Every directory is given relative
/// to the working directory so the Makefile keeps working if the project
/// moves.
pub fn makefile_context(
    project: &GameProject,
    settings: &ProjectSettings,
    paths: &BuildPaths,
) -> Value {
    let dirs = |configured: &[String], default: &str| -> Vec<String> {
        let configured: Vec<&str> = configured
            .iter()
            .map(|dir| dir.trim())
            .filter(|dir| !dir.is_empty())
            .collect();
        let configured = if configured.is_empty() { vec![default] } else { configured };
        configured
            .into_iter()
            .map(|dir| display(&paths.from_work_dir(Path::new(dir))))
            .collect()
    };

    let butano = settings
        .butano_path
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .unwrap_or(DEFAULT_BUTANO_DIR);

    json!({
        "target": paths.target,
        "romName": rom_title(project),
        "romCode": project.rom_code.as_deref().filter(|c| !c.is_empty()).unwrap_or(DEFAULT_ROM_CODE),
        "python": settings.python(),
        "butanoPath": display(&paths.from_work_dir(Path::new(butano))),
        "objectDir": OBJECT_DIR,
        "buildDir": display(&paths.from_work_dir(&paths.build_dir)),
        "includeDirs": dirs(&settings.include_dirs, "include"),
        "sourceDirs": dirs(&settings.source_dirs, "src"),
        "graphicsDirs": dirs(&settings.graphics_dirs, "graphics"),
        "audioDirs": dirs(&settings.audio_dirs, "audio"),
    })
}

/// Writes `<work dir>/Makefile` and returns its path.
pub async fn synthesize(
    templates: &Templates,
    resources: &Resources,
    project: &GameProject,
    settings: &ProjectSettings,
    paths: &BuildPaths,
) -> Result<PathBuf> {
    let context = makefile_context(project, settings, paths);
    let written = templates
        .render_file(&resources.makefile_template(), &paths.work_dir, &context)
        .await?;
    Ok(written)
}

/// Header titles are at most 12 uppercase characters.
fn rom_title(project: &GameProject) -> String {
    let name = project
        .rom_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(&project.name);
    name.trim()
        .chars()
        .take(ROM_TITLE_LEN)
        .collect::<String>()
        .to_uppercase()
}

/// Makefiles want forward slashes on every platform.
fn display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
