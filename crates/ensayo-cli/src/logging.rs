//! Log subscriber setup

use crate::commands::LogFormat;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset
#[must_use]
pub const fn default_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

fn filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new(default_directive(true))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(false)))
    }
}

/// Install the global subscriber; logs go to stderr so stdout stays the report
pub fn init(debug: bool, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(filter(debug));
    let result = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("log subscriber already installed");
    }
}
