use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use super::stages::Stage;
use crate::cancel::CancelToken;
use crate::project::Snapshot;

/// Opaque build identifier, a UUID on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(String);

impl BuildId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BuildId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BuildId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Remove the working directory before building.
    pub clean: bool,
    /// Build configuration id. `None` defers to the user preferences.
    pub configuration: Option<String>,
}

/// One build attempt. Everything but the stage and the cancellation flag
/// is fixed at creation.
pub struct Build {
    pub id: BuildId,
    pub project_file: PathBuf,
    pub snapshot: Snapshot,
    pub options: BuildOptions,
    pub cancel: CancelToken,
    stage: Mutex<Stage>,
    task: Mutex<Option<JoinHandle<()>>>,
    abort_reported: AtomicBool,
}

impl fmt::Debug for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Build")
            .field("id", &self.id)
            .field("project_file", &self.project_file)
            .field("options", &self.options)
            .field("stage", &self.stage())
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Build {
    pub fn stage(&self) -> Stage {
        *self.stage.lock()
    }

    pub(crate) fn set_stage(&self, stage: Stage) {
        debug!(build = %self.id, %stage, "stage");
        *self.stage.lock() = stage;
    }

    /// Records that `build-aborted` went out for this build. Returns whether
    /// it already had.
    pub(crate) fn mark_abort_reported(&self) -> bool {
        self.abort_reported.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn attach_task(&self, task: JoinHandle<()>) {
        *self.task.lock() = Some(task);
    }

    pub(crate) fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task.lock().take()
    }
}

#[derive(Default)]
struct Inner {
    builds: HashMap<BuildId, Arc<Build>>,
    latest: Option<BuildId>,
}

/// All known builds plus the most recently started one, which is what an
/// abort without an id targets.
#[derive(Default)]
pub struct BuildRegistry {
    inner: Mutex<Inner>,
}

impl BuildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new build and makes it the latest. Finished builds are
    /// dropped from the registry at this point.
    pub fn create(
        &self,
        project_file: PathBuf,
        snapshot: Snapshot,
        options: BuildOptions,
    ) -> Arc<Build> {
        let build = Arc::new(Build {
            id: BuildId::generate(),
            project_file,
            snapshot,
            options,
            cancel: CancelToken::new(),
            stage: Mutex::new(Stage::Created),
            task: Mutex::new(None),
            abort_reported: AtomicBool::new(false),
        });

        let mut inner = self.inner.lock();
        let before = inner.builds.len();
        inner.builds.retain(|_, build| !build.stage().is_terminal());
        let evicted = before - inner.builds.len();
        if evicted > 0 {
            debug!(evicted, "dropped finished builds");
        }
        inner.builds.insert(build.id.clone(), build.clone());
        inner.latest = Some(build.id.clone());

        build
    }

    pub fn get(&self, id: &BuildId) -> Option<Arc<Build>> {
        self.inner.lock().builds.get(id).cloned()
    }

    /// The build with `id`, or the latest one when no id is given.
    pub fn resolve(&self, id: Option<&BuildId>) -> Option<Arc<Build>> {
        let inner = self.inner.lock();
        let id = id.or(inner.latest.as_ref())?;
        inner.builds.get(id).cloned()
    }

    pub fn latest_id(&self) -> Option<BuildId> {
        self.inner.lock().latest.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().builds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
