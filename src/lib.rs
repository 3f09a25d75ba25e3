//! Build orchestration for handheld console game projects.
//!
//! A [`BuildController`] takes a project [`Snapshot`], renders the
//! generated sources and the Makefile from the bundled template set, runs
//! the native toolchain and launches the resulting ROM in an emulator.
//! Progress is streamed to a [`Reporter`] as [`BuildEvent`]s.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use neobuild::{BuildController, BuildOptions, PreferenceStore, ProjectStore, Resources, SystemRunner};
//! use neobuild::project::ImageSizes;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let (events, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let resources = Resources::locate(None);
//! let store = ProjectStore::new("/games/demo/demo.json");
//! let sizes = ImageSizes::new(store.root(), Some(resources.default_background()));
//! let snapshot = store.load(&sizes).await?;
//!
//! let controller = BuildController::new(
//!     Arc::new(SystemRunner),
//!     Arc::new(events),
//!     resources,
//!     Arc::new(PreferenceStore::default()),
//! );
//! let id = controller.start_build(store.project_file(), snapshot, BuildOptions::default());
//! while let Some(event) = rx.recv().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod makefile;
pub mod paths;
pub mod prefs;
pub mod process;
pub mod project;
pub mod template;

pub use cancel::CancelToken;
pub use controller::{BuildController, BuildId, BuildOptions, Stage};
pub use error::{BuildError, Result};
pub use events::{BuildEvent, LogKind, Reporter};
pub use paths::{BuildPaths, Resources};
pub use prefs::{PreferenceStore, Preferences};
pub use process::{ProcessRunner, SystemRunner};
pub use project::{ProjectStore, Snapshot};
