//! Build configurations stored in the project file.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::project::Fields;

/// Id selecting the project's own `settings` block.
pub const DEFAULT_CONFIGURATION: &str = "default";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmulatorType {
    #[default]
    External,
    Internal,
}

/// Toolchain and launch settings of one configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_path: Option<String>,
    #[serde(default)]
    pub emulator_type: EmulatorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulator_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub butano_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_dirs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_dirs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub graphics_dirs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio_dirs: Vec<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

impl ProjectSettings {
    /// The interpreter to run build scripts with.
    pub fn python(&self) -> Cow<'_, str> {
        match self.python_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => Cow::Borrowed(path),
            _ => Cow::Borrowed(default_python()),
        }
    }

    /// The emulator command line, before the ROM path is appended.
    pub fn emulator(&self) -> Cow<'_, str> {
        match self.emulator_command.as_deref().map(str::trim) {
            Some(command) if !command.is_empty() => Cow::Borrowed(command),
            _ => Cow::Borrowed(default_emulator()),
        }
    }
}

/// A named alternate to the default settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedConfiguration {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub settings: ProjectSettings,
}

/// Picks the settings for `selected`. Unknown ids fall back to `default`
/// with a warning; they are never an error.
pub fn resolve_configuration<'a>(
    default: &'a ProjectSettings,
    configurations: &'a [NamedConfiguration],
    selected: Option<&str>,
) -> &'a ProjectSettings {
    let Some(id) = selected.filter(|id| !id.is_empty() && *id != DEFAULT_CONFIGURATION) else {
        return default;
    };

    match configurations.iter().find(|c| c.id == id) {
        Some(configuration) => &configuration.settings,
        None => {
            warn!(configuration = %id, "unknown build configuration, using default");
            default
        }
    }
}

pub fn default_python() -> &'static str {
    if cfg!(windows) { "python" } else { "python3" }
}

pub fn default_emulator() -> &'static str {
    if cfg!(target_os = "macos") {
        "open -a mGBA"
    } else if cfg!(windows) {
        "mGBA.exe"
    } else {
        "mgba-qt"
    }
}
