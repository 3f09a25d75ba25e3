use std::fmt;

use tokio::fs;
use tracing::{debug, info};

use super::registry::Build;
use crate::config::{EmulatorType, ProjectSettings, resolve_configuration};
use crate::error::{BuildError, IoContext, Result};
use crate::events::BuildLogger;
use crate::makefile;
use crate::paths::{self, BuildPaths, Resources};
use crate::process::{CommandSpec, LineSink, ProcessRunner, RunOptions};
use crate::project::{ContextPaths, GameProject};
use crate::template::Templates;

/// Generated sources, rendered in this order into the build directory.
pub const GENERATED_TEMPLATES: &[&str] = &["neo_types.tpl.h", "neo_variables.tpl.h", "neo_scenes.tpl.h"];

const MIN_PYTHON_MAJOR: u64 = 3;
const MAKE: &str = "make";

/// Where a build is. Stages run in declaration order; `Cleaning` only when
/// asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Created,
    CheckingDependencies,
    Cleaning,
    PreBuildingTemplates,
    SynthesizingBuildConfig,
    Compiling,
    PlacingArtifact,
    LaunchingRunner,
    Completed,
    Aborted,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Aborted | Stage::Failed)
    }

    /// The `build-step` message announcing the stage.
    pub fn message(self) -> Option<&'static str> {
        Some(match self {
            Stage::CheckingDependencies => "Checking dependencies...",
            Stage::Cleaning => "Cleaning build folder...",
            Stage::PreBuildingTemplates => "Pre-building templates...",
            Stage::SynthesizingBuildConfig => "Generating Makefile...",
            Stage::Compiling => "Building project...",
            Stage::PlacingArtifact => "Copying ROM...",
            Stage::LaunchingRunner => "Launching emulator...",
            Stage::Created | Stage::Completed | Stage::Aborted | Stage::Failed => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Stage::Created => "created",
            Stage::CheckingDependencies => "checking_dependencies",
            Stage::Cleaning => "cleaning",
            Stage::PreBuildingTemplates => "pre_building_templates",
            Stage::SynthesizingBuildConfig => "synthesizing_build_config",
            Stage::Compiling => "compiling",
            Stage::PlacingArtifact => "placing_artifact",
            Stage::LaunchingRunner => "launching_runner",
            Stage::Completed => "completed",
            Stage::Aborted => "aborted",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The stage sequence of one build.
pub(crate) struct Pipeline<'a> {
    pub build: &'a Build,
    pub runner: &'a dyn ProcessRunner,
    pub log: BuildLogger<'a>,
    pub resources: &'a Resources,
    pub paths: BuildPaths,
    pub settings: ProjectSettings,
    fallback_project: GameProject,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        build: &'a Build,
        runner: &'a dyn ProcessRunner,
        log: BuildLogger<'a>,
        resources: &'a Resources,
        selected: Option<&str>,
    ) -> Self {
        let fallback_project = GameProject::default();
        let project = build.snapshot.project.as_ref().unwrap_or(&fallback_project);
        let settings =
            resolve_configuration(&project.settings, &project.configurations, selected).clone();

        Self {
            build,
            runner,
            log,
            resources,
            paths: BuildPaths::new(&build.project_file),
            settings,
            fallback_project,
        }
    }

    fn project(&self) -> &GameProject {
        self.build
            .snapshot
            .project
            .as_ref()
            .unwrap_or(&self.fallback_project)
    }

    /// Runs the stages in order. Returns `Ok` without finishing when the
    /// build is cancelled between stages.
    pub async fn run(&self) -> Result<()> {
        if !self.enter(Stage::CheckingDependencies) {
            return Ok(());
        }
        self.check_dependencies().await?;

        if self.build.options.clean {
            if !self.enter(Stage::Cleaning) {
                return Ok(());
            }
            self.clean().await?;
        }

        if !self.enter(Stage::PreBuildingTemplates) {
            return Ok(());
        }
        let templates = self.prebuild_templates().await?;

        if !self.enter(Stage::SynthesizingBuildConfig) {
            return Ok(());
        }
        let written = makefile::synthesize(
            &templates,
            self.resources,
            self.project(),
            &self.settings,
            &self.paths,
        )
        .await?;
        debug!(path = %written.display(), "makefile written");
        self.log.success("Makefile generated");

        if !self.enter(Stage::Compiling) {
            return Ok(());
        }
        self.compile().await?;

        if !self.enter(Stage::PlacingArtifact) {
            return Ok(());
        }
        self.place_artifact().await?;

        if !self.enter(Stage::LaunchingRunner) {
            return Ok(());
        }
        self.launch()
    }

    /// Moves to `stage` unless the build was cancelled.
    fn enter(&self, stage: Stage) -> bool {
        if self.build.cancel.is_cancelled() {
            debug!(%stage, "skipping stage, build cancelled");
            return false;
        }
        self.build.set_stage(stage);
        if let Some(message) = stage.message() {
            self.log.step(message);
        }
        true
    }

    fn run_options(&self, with_output: bool) -> RunOptions<'_> {
        RunOptions {
            cwd: Some(&self.paths.work_dir),
            sink: with_output.then_some(&self.log as &dyn LineSink),
            cancel: Some(&self.build.cancel),
        }
    }

    async fn check_dependencies(&self) -> Result<()> {
        let python = self.settings.python();
        self.log.log(format!("Checking {python}..."));

        let version = CommandSpec::new(&*python).arg("--version");
        let options = RunOptions {
            cwd: Some(&self.paths.project_dir),
            ..self.run_options(false)
        };
        let output = match self.runner.run(&version, options).await {
            Ok(output) => output,
            Err(err) if err.is_aborted() => return Err(err.into()),
            Err(err) => return Err(BuildError::ToolchainMissing(format!("{python} ({err})"))),
        };

        match parse_python_version(&output) {
            Some(version) if version.major < MIN_PYTHON_MAJOR => Err(BuildError::ToolchainMissing(
                format!("{python} is version {version}, Python {MIN_PYTHON_MAJOR} is required"),
            )),
            Some(version) => {
                info!(%version, "python found");
                self.log.success(format!("Python {version} found"));
                Ok(())
            }
            None => {
                self.log.success(format!("Python found: {}", output.trim()));
                Ok(())
            }
        }
    }

    async fn clean(&self) -> Result<()> {
        if paths::clean_build_dir(&self.paths.project_file).await? {
            self.log.success("Build folder removed");
        } else {
            self.log.log("Build folder already clean");
        }
        Ok(())
    }

    async fn prebuild_templates(&self) -> Result<Templates> {
        let mut templates = Templates::new();
        let partials = templates.load_partials(&self.resources.partials_dir()).await?;
        debug!(partials, "partials registered");

        let context = self.build.snapshot.template_context(ContextPaths {
            project_dir: &self.paths.project_dir,
            build_dir: &self.paths.build_dir,
            resources_dir: self.resources.root(),
        })?;

        let templates_dir = self.resources.templates_dir();
        for name in GENERATED_TEMPLATES {
            let written = templates
                .render_file(&templates_dir.join(name), &self.paths.build_dir, &context)
                .await?;
            let file_name = written.file_name().unwrap_or(written.as_os_str());
            self.log.success(format!("Generated {}", file_name.to_string_lossy()));
        }

        Ok(templates)
    }

    async fn compile(&self) -> Result<()> {
        self.log.log("Building using the generated Makefile...");
        let command = CommandSpec::new(MAKE);
        self.runner.run(&command, self.run_options(true)).await?;
        self.log.success("Project built successfully");
        Ok(())
    }

    /// A missing ROM is reported, then the build cancels itself so nothing
    /// tries to launch it.
    async fn place_artifact(&self) -> Result<()> {
        let artifact = &self.paths.artifact;
        let present = fs::metadata(artifact)
            .await
            .is_ok_and(|meta| meta.is_file());
        if !present {
            self.log
                .error(BuildError::ArtifactMissing(artifact.clone()).to_string());
            self.build.cancel.cancel();
            return Ok(());
        }

        let rom = &self.paths.rom;
        if let Some(out_dir) = rom.parent() {
            fs::create_dir_all(out_dir)
                .await
                .with_path("create", out_dir)?;
        }
        fs::copy(artifact, rom).await.with_path("copy ROM to", rom)?;
        self.log.success(format!("ROM written to {}", rom.display()));
        Ok(())
    }

    fn launch(&self) -> Result<()> {
        if self.settings.emulator_type == EmulatorType::Internal {
            self.log.success("ROM ready for the built-in emulator");
            return Ok(());
        }

        let line = self.settings.emulator();
        let Some(command) = CommandSpec::parse(&line) else {
            self.log.log("No emulator configured");
            return Ok(());
        };
        let command = command.arg(self.paths.rom.to_string_lossy());

        info!(program = %command.program, "launching emulator");
        self.runner
            .spawn_detached(&command, Some(&self.paths.project_dir))?;
        self.log.success(format!("Launched {}", command.program));
        Ok(())
    }
}

/// Reads `Python 3.12.1` (or a bare version) into a semver version.
/// Pre-release suffixes such as `3.13.0rc1` are dropped.
pub(crate) fn parse_python_version(output: &str) -> Option<semver::Version> {
    let token = output
        .split_whitespace()
        .find(|word| word.starts_with(|c: char| c.is_ascii_digit()))?;
    if let Ok(version) = semver::Version::parse(token) {
        return Some(version);
    }

    let mut numbers = token.split('.').map(|part| {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        digits.parse::<u64>().ok()
    });
    let major = numbers.next().flatten()?;
    let minor = numbers.next().flatten().unwrap_or(0);
    let patch = numbers.next().flatten().unwrap_or(0);
    Some(semver::Version::new(major, minor, patch))
}
