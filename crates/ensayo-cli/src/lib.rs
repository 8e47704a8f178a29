//! Ensayo CLI library
//!
//! Turns command-line flags into a test session and a process exit code.

#![warn(missing_docs)]

mod commands;
mod error;
pub mod logging;

pub use commands::{Cli, LogFormat};
pub use error::{CliError, CliResult};

use ensayo::{ProjectSettings, Session, SessionOutcome};
use std::process::ExitCode;

/// Settings from `--settings`, or `ensayo.yaml` discovered in `--root`
pub fn load_settings(cli: &Cli) -> CliResult<ProjectSettings> {
    if !cli.root.is_dir() {
        return Err(CliError::invalid_argument(format!(
            "root `{}` is not a directory",
            cli.root.display()
        )));
    }
    match &cli.settings {
        Some(path) if !path.is_file() => Err(CliError::config(format!(
            "settings file `{}` not found",
            path.display()
        ))),
        Some(path) => {
            let mut settings = ProjectSettings::load(path)?;
            if cli.root != std::path::Path::new(".") {
                settings.root = cli.root.clone();
            }
            Ok(settings)
        }
        None => Ok(ProjectSettings::discover(&cli.root)?),
    }
}

/// Run one session; in watch mode, until Ctrl-C
pub async fn run(cli: Cli) -> CliResult<i32> {
    let settings = load_settings(&cli)?;
    let options = cli.options();
    tracing::debug!(?options, root = %settings.root.display(), "starting session");

    match Session::new(options, settings).run().await? {
        SessionOutcome::Completed(run) => Ok(run.exit_code()),
        SessionOutcome::Watching(mut subscription) => {
            tracing::info!(
                patterns = ?subscription.patterns(),
                url = %subscription.base_url().unwrap_or_default(),
                "watching for changes, press Ctrl-C to stop"
            );
            let signal = tokio::signal::ctrl_c().await;
            subscription.stop().await?;
            signal?;
            Ok(0)
        }
    }
}

/// Map a numeric code to a process exit code
#[must_use]
pub fn exit_status(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
