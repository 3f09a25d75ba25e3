//! Build orchestration: starting, aborting and tracking builds.
//!
//! A build runs as its own tokio task through the stages in [`Stage`]
//! order. Progress goes to the [`Reporter`] as [`BuildEvent`]s, always
//! tagged with the build id, and every build ends with exactly one of
//! `build-completed`, `build-error` or `build-aborted`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{Instrument, info, info_span, warn};

mod registry;
mod stages;

pub use registry::{Build, BuildId, BuildOptions, BuildRegistry};
pub use stages::{GENERATED_TEMPLATES, Stage};

use crate::error::Result;
use crate::events::{BuildEvent, BuildLogger, Reporter};
use crate::paths::{self, BuildPaths, Resources};
use crate::prefs::Preferences;
use crate::process::ProcessRunner;
use crate::project::{ImageSizes, Snapshot, sanitize, serialize};
use stages::Pipeline;

struct Shared {
    registry: BuildRegistry,
    runner: Arc<dyn ProcessRunner>,
    reporter: Arc<dyn Reporter>,
    resources: Resources,
    preferences: Arc<dyn Preferences>,
}

/// Entry point for the UI: start, abort and clean builds.
#[derive(Clone)]
pub struct BuildController {
    shared: Arc<Shared>,
}

impl BuildController {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        reporter: Arc<dyn Reporter>,
        resources: Resources,
        preferences: Arc<dyn Preferences>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: BuildRegistry::new(),
                runner,
                reporter,
                resources,
                preferences,
            }),
        }
    }

    pub fn registry(&self) -> &BuildRegistry {
        &self.shared.registry
    }

    pub fn resources(&self) -> &Resources {
        &self.shared.resources
    }

    /// Normalizes the snapshot, registers a build for it and starts the
    /// pipeline in the background. Must be called from within a tokio
    /// runtime.
    pub fn start_build(
        &self,
        project_file: impl Into<PathBuf>,
        mut snapshot: Snapshot,
        options: BuildOptions,
    ) -> BuildId {
        let project_file = project_file.into();
        let project_dir = BuildPaths::new(&project_file).project_dir;
        let sizes = ImageSizes::new(
            &project_dir,
            Some(self.shared.resources.default_background()),
        );
        sanitize(&mut snapshot, &sizes);
        serialize(&mut snapshot);

        let build = self.shared.registry.create(project_file, snapshot, options);
        let id = build.id.clone();
        info!(build = %id, project = %build.project_file.display(), clean = build.options.clean, "build started");
        self.shared
            .reporter
            .report(BuildEvent::Started { id: id.clone() });

        let span = info_span!("build", id = %id);
        let task = tokio::spawn(drive(self.shared.clone(), build.clone()).instrument(span));
        build.attach_task(task);

        id
    }

    /// Cancels the build with `id`, or the latest build. Always reports
    /// `build-aborted`, even when there is no such build.
    pub fn abort_build(&self, id: Option<&BuildId>) {
        let target = self.shared.registry.resolve(id);
        let reported = match &target {
            Some(build) => {
                build.mark_abort_reported();
                if build.cancel.cancel() {
                    info!(build = %build.id, "abort requested");
                }
                Some(build.id.clone())
            }
            None => {
                warn!(build = ?id, "abort requested for an unknown build");
                id.cloned()
            }
        };
        self.shared
            .reporter
            .report(BuildEvent::Aborted { id: reported });
    }

    /// Removes the project's working directory. Independent of any build.
    pub async fn clean_build_folder(&self, project_file: &Path) -> Result<bool> {
        paths::clean_build_dir(project_file).await
    }

    /// Waits for the build's pipeline to finish and returns its final
    /// stage. `None` for unknown builds.
    pub async fn join(&self, id: &BuildId) -> Option<Stage> {
        let build = self.shared.registry.get(id)?;
        if let Some(task) = build.take_task() {
            if let Err(err) = task.await {
                warn!(build = %id, %err, "build task failed");
            }
        }
        Some(build.stage())
    }

    pub fn stage(&self, id: &BuildId) -> Option<Stage> {
        self.shared.registry.get(id).map(|build| build.stage())
    }
}

/// Runs one pipeline and reports how it ended. The only place stage errors
/// are caught.
async fn drive(shared: Arc<Shared>, build: Arc<Build>) {
    let log = BuildLogger::new(&*shared.reporter, &build.id);
    let _listener = build.cancel.on_cancel({
        let id = build.id.clone();
        move || info!(build = %id, "cancellation signalled")
    });

    let selected = match build.options.configuration.clone() {
        Some(id) => Some(id),
        None => shared.preferences.build_configuration().await,
    };
    let pipeline = Pipeline::new(
        &build,
        &*shared.runner,
        log,
        &shared.resources,
        selected.as_deref(),
    );
    let outcome = pipeline.run().await;

    if build.cancel.is_cancelled() {
        build.set_stage(Stage::Aborted);
        info!("build aborted");
        if !build.mark_abort_reported() {
            log.aborted();
        }
        return;
    }

    match outcome {
        Ok(()) => {
            build.set_stage(Stage::Completed);
            info!("build completed");
            log.completed();
        }
        Err(err) => {
            build.set_stage(Stage::Failed);
            warn!(%err, "build failed");
            log.error(err.to_string());
        }
    }
}
