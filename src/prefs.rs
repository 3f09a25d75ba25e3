//! Per-user editor preferences.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::error::{IoContext, Result};

const APP_DIR: &str = "neobuild";
const CONFIG_FILE: &str = "config.json";
pub const MAX_RECENT_PROJECTS: usize = 10;

/// What the build pipeline asks of the preference store.
#[async_trait]
pub trait Preferences: Send + Sync + 'static {
    /// Id of the build configuration the user selected, if any.
    async fn build_configuration(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_configuration: Option<String>,
    #[serde(default)]
    pub recent_projects: Vec<RecentProject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentProject {
    pub name: String,
    pub path: String,
}

impl EditorConfig {
    /// Moves `path` to the front of the recent list, dropping older entries
    /// past the limit.
    pub fn add_recent_project(&mut self, name: impl Into<String>, path: impl Into<String>) {
        let path = path.into();
        self.recent_projects.retain(|recent| recent.path != path);
        self.recent_projects.insert(
            0,
            RecentProject {
                name: name.into(),
                path,
            },
        );
        self.recent_projects.truncate(MAX_RECENT_PROJECTS);
    }
}

#[async_trait]
impl Preferences for EditorConfig {
    async fn build_configuration(&self) -> Option<String> {
        self.build_configuration.clone()
    }
}

/// Preferences kept as JSON in the user's config directory.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl Default for PreferenceStore {
    fn default() -> Self {
        let dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::at(dir.join(APP_DIR).join(CONFIG_FILE))
    }
}

impl PreferenceStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file yields the defaults.
    pub async fn load(&self) -> EditorConfig {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), %err, "cannot read preferences");
                }
                return EditorConfig::default();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|err| {
            warn!(path = %self.path.display(), %err, "ignoring malformed preferences");
            EditorConfig::default()
        })
    }

    pub async fn save(&self, config: &EditorConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.with_path("create", parent)?;
        }
        let mut text = serde_json::to_string_pretty(config)?;
        text.push('\n');
        fs::write(&self.path, text).await.with_path("write", &self.path)
    }

    pub async fn set_build_configuration(&self, id: Option<String>) -> Result<()> {
        let mut config = self.load().await;
        config.build_configuration = id;
        self.save(&config).await
    }

    pub async fn add_recent_project(&self, name: &str, path: &str) -> Result<()> {
        let mut config = self.load().await;
        config.add_recent_project(name, path);
        self.save(&config).await
    }
}

#[async_trait]
impl Preferences for PreferenceStore {
    async fn build_configuration(&self) -> Option<String> {
        self.load().await.build_configuration
    }
}
