use std::io;
use std::path::{Path, PathBuf};

use crate::process::ProcessError;
use crate::template::TemplateError;

/// Everything that can stop a build pipeline.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("toolchain not found: {0}")]
    ToolchainMissing(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("ROM file not found: {}", .0.display())]
    ArtifactMissing(PathBuf),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("{context}: {source}")]
    FileSystem {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid project data: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;

impl BuildError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, BuildError::Process(err) if err.is_aborted())
    }

    pub(crate) fn fs(context: impl Into<String>, source: io::Error) -> Self {
        BuildError::FileSystem {
            context: context.into(),
            source,
        }
    }
}

/// Attaches the offending path to an I/O failure.
pub(crate) trait IoContext<T> {
    fn with_path(self, action: &str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn with_path(self, action: &str, path: &Path) -> Result<T> {
        self.map_err(|source| BuildError::fs(format!("failed to {action} {}", path.display()), source))
    }
}
