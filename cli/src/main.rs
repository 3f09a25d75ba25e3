use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use neobuild::paths::{self, BuildPaths, Resources};
use neobuild::project::ImageSizes;
use neobuild::{
    BuildController, BuildEvent, BuildOptions, PreferenceStore, ProjectStore, Stage, SystemRunner,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod reporter;

use cli::{Command, Format};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse();
    match args.command {
        Command::Build {
            project,
            clean,
            config,
            resources,
            format,
        } => {
            let options = BuildOptions {
                clean,
                configuration: config,
            };
            let stage = build(&project, options, resources.as_deref(), format).await?;
            Ok(if stage == Stage::Completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Clean { project } => {
            if paths::clean_build_dir(&project).await? {
                info!(project = %project.display(), "build folder removed");
            } else {
                info!(project = %project.display(), "nothing to clean");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::RomPath { project } => {
            println!("{}", BuildPaths::new(&project).rom.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Runs one build to the end, printing its events. Ctrl-C aborts it.
async fn build(
    project: &Path,
    options: BuildOptions,
    resources: Option<&Path>,
    format: Format,
) -> anyhow::Result<Stage> {
    let project = std::path::absolute(project)
        .with_context(|| format!("Failed to resolve {}", project.display()))?;
    let project = project.as_path();
    let resources = Resources::locate(resources);
    let store = ProjectStore::new(project);
    let sizes = ImageSizes::new(store.root(), Some(resources.default_background()));
    let snapshot = store
        .load(&sizes)
        .await
        .with_context(|| format!("Failed to load project {}", project.display()))?;

    let name = snapshot
        .project
        .as_ref()
        .map(|project| project.name.clone())
        .unwrap_or_default();
    let preferences = Arc::new(PreferenceStore::default());
    if let Err(err) = preferences
        .add_recent_project(&name, &project.to_string_lossy())
        .await
    {
        warn!(%err, "cannot record recent project");
    }

    let (events, mut rx) = mpsc::unbounded_channel::<BuildEvent>();
    let controller = BuildController::new(
        Arc::new(SystemRunner),
        Arc::new(events),
        resources,
        preferences,
    );
    let id = controller.start_build(store.project_file(), snapshot, options);

    let join = controller.join(&id);
    tokio::pin!(join);
    let stage = loop {
        tokio::select! {
            stage = &mut join => break stage,
            Some(event) = rx.recv() => println!("{}", reporter::render(&event, format)?),
            Ok(()) = tokio::signal::ctrl_c() => controller.abort_build(Some(&id)),
        }
    };

    while let Ok(event) = rx.try_recv() {
        println!("{}", reporter::render(&event, format)?);
    }

    stage.context("Build vanished from the registry")
}
