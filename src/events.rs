use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::controller::BuildId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Log,
    Success,
    Error,
}

/// Progress notifications sent to the UI while a build runs.
///
/// The serialized form carries the channel name under `event`, plus the
/// payload fields the editor front end reads (`id`, `message`, `type`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum BuildEvent {
    #[serde(rename = "build-started")]
    Started { id: BuildId },
    #[serde(rename = "build-step")]
    Step { id: BuildId, message: String },
    #[serde(rename = "build-log")]
    Log {
        id: BuildId,
        #[serde(rename = "type")]
        kind: LogKind,
        message: String,
    },
    #[serde(rename = "build-error")]
    Error { id: BuildId, message: String },
    /// `id` is `None` when an abort was requested while no build was known.
    #[serde(rename = "build-aborted")]
    Aborted { id: Option<BuildId> },
    #[serde(rename = "build-completed")]
    Completed { id: BuildId },
}

impl BuildEvent {
    pub fn channel(&self) -> &'static str {
        match self {
            BuildEvent::Started { .. } => "build-started",
            BuildEvent::Step { .. } => "build-step",
            BuildEvent::Log { .. } => "build-log",
            BuildEvent::Error { .. } => "build-error",
            BuildEvent::Aborted { .. } => "build-aborted",
            BuildEvent::Completed { .. } => "build-completed",
        }
    }

    pub fn build_id(&self) -> Option<&BuildId> {
        match self {
            BuildEvent::Started { id }
            | BuildEvent::Step { id, .. }
            | BuildEvent::Log { id, .. }
            | BuildEvent::Error { id, .. }
            | BuildEvent::Completed { id } => Some(id),
            BuildEvent::Aborted { id } => id.as_ref(),
        }
    }
}

/// Sink for build progress events.
///
/// Implementations must not block: events are emitted from inside the
/// pipeline, between awaits.
pub trait Reporter: Send + Sync + 'static {
    fn report(&self, event: BuildEvent);
}

impl Reporter for UnboundedSender<BuildEvent> {
    fn report(&self, event: BuildEvent) {
        // A closed receiver means nobody is listening anymore.
        let _ = self.send(event);
    }
}

/// Per-build convenience wrapper emitting the different event kinds.
#[derive(Clone, Copy)]
pub(crate) struct BuildLogger<'a> {
    reporter: &'a dyn Reporter,
    id: &'a BuildId,
}

impl<'a> BuildLogger<'a> {
    pub fn new(reporter: &'a dyn Reporter, id: &'a BuildId) -> Self {
        Self { reporter, id }
    }

    pub fn step(&self, message: impl Into<String>) {
        self.reporter.report(BuildEvent::Step {
            id: self.id.clone(),
            message: message.into(),
        });
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit_log(LogKind::Log, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit_log(LogKind::Success, message.into());
    }

    /// Error line in the log only, no terminal error event.
    pub fn error_line(&self, message: impl Into<String>) {
        self.emit_log(LogKind::Error, message.into());
    }

    /// Error line in the log followed by a `build-error` event.
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        self.emit_log(LogKind::Error, message.clone());
        self.reporter.report(BuildEvent::Error {
            id: self.id.clone(),
            message,
        });
    }

    pub fn aborted(&self) {
        self.reporter.report(BuildEvent::Aborted {
            id: Some(self.id.clone()),
        });
    }

    pub fn completed(&self) {
        self.reporter.report(BuildEvent::Completed {
            id: self.id.clone(),
        });
    }

    fn emit_log(&self, kind: LogKind, message: String) {
        self.reporter.report(BuildEvent::Log {
            id: self.id.clone(),
            kind,
            message,
        });
    }
}

impl crate::process::LineSink for BuildLogger<'_> {
    fn stdout_line(&self, line: &str) {
        self.log(line);
    }

    fn stderr_line(&self, line: &str) {
        self.error_line(line);
    }
}
