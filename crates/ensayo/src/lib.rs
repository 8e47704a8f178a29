//! Ensayo: end-to-end browser test sessions
//!
//! Ensayo (Spanish: "rehearsal") drives a web project through one full
//! test session: install dependencies, build the requested variant, serve
//! the output over HTTP, then run declarative browser tests against it,
//! either once or on every change to a test file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    ENSAYO Session                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Toolchain  │    │ Static     │    │ Engine     │            │
//! │   │ install    │───►│ Server     │───►│ cdp /      │            │
//! │   │ + build    │    │ (axum)     │    │ playwright │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! │                           ▲                 ▲                   │
//! │                           │   ┌─────────────┴──┐                │
//! │                           └───┤ Runner + Cache │◄── watch       │
//! │                               └────────────────┘                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ensayo::{Options, ProjectSettings, Session, SessionOutcome};
//!
//! # async fn demo() -> ensayo::EnsayoResult<()> {
//! let settings = ProjectSettings::discover(std::path::Path::new("."))?;
//! let options = Options::builder().nobuild(true).build();
//! if let SessionOutcome::Completed(run) = Session::new(options, settings).run().await? {
//!     std::process::exit(run.exit_code());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod command;
pub mod discovery;
pub mod engine;
pub mod events;
pub mod options;
pub mod outcome;
pub mod reporter;
mod result;
pub mod runner;
pub mod server;
pub mod session;
pub mod settings;
pub mod testfile;
pub mod toolchain;
pub mod watch;

#[cfg(test)]
mod testing;

pub use cache::ModuleCache;
pub use command::{CommandSpec, ProcessRunner, SystemProcessRunner};
pub use engine::{DefaultEngineFactory, Engine, EngineConfig, EngineFactory};
pub use events::{EventBus, SessionEvent};
pub use options::{BrowserFamily, EngineKind, Options, OptionsBuilder};
pub use outcome::{RunOutcome, TestRecord, TestStatus};
pub use reporter::{Reporter, ReporterKind};
pub use result::{EnsayoError, EnsayoResult};
pub use runner::{RunnerConfig, TestRunner};
pub use server::{RunningServer, ServerConfig, ServerLauncher, StaticServerLauncher};
pub use session::{Session, SessionOutcome, WatchSubscription};
pub use settings::ProjectSettings;
pub use testfile::{Step, TestCase, TestFile};
pub use watch::{FileWatcher, WatchConfig};
