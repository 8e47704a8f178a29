//! Result and error types for Ensayo.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Ensayo operations
pub type EnsayoResult<T> = Result<T, EnsayoError>;

/// Errors that can occur during a test session
#[derive(Debug, Error)]
pub enum EnsayoError {
    /// An external command exited unsuccessfully
    #[error("{step} failed with exit code {code}")]
    CommandFailed {
        /// Session step that ran the command (install, clean, build)
        step: String,
        /// Exit code reported by the child process
        code: i32,
    },

    /// An external command could not be spawned at all
    #[error("Failed to spawn `{program}` for {step}: {source}")]
    CommandSpawn {
        /// Session step that ran the command
        step: String,
        /// Program that failed to start
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The static server could not bind or serve
    #[error("Failed to start server on {addr}: {message}")]
    ServerStart {
        /// Address the server tried to bind
        addr: String,
        /// Error message
        message: String,
    },

    /// Invalid option or settings combination
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// The selected engine cannot drive the requested browser
    #[error("Engine `{engine}` does not support browser `{browser}`")]
    UnsupportedBrowser {
        /// Engine name
        engine: String,
        /// Browser name
        browser: String,
    },

    /// Test file discovery failed (bad glob pattern)
    #[error("Invalid test pattern `{pattern}`: {message}")]
    Discovery {
        /// Pattern that failed
        pattern: String,
        /// Error message
        message: String,
    },

    /// A test file could not be parsed
    #[error("Failed to parse {}: {message}", path.display())]
    TestFileParse {
        /// Test file path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// A test step failed while running in the browser
    #[error("Step {index} ({action}) failed: {message}")]
    StepFailed {
        /// Zero-based step index
        index: usize,
        /// Step action name
        action: String,
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// File watcher error
    #[error("Watch error: {message}")]
    Watch {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl EnsayoError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a watch error
    #[must_use]
    pub fn watch(message: impl Into<String>) -> Self {
        Self::Watch {
            message: message.into(),
        }
    }

    /// Create a step failure
    #[must_use]
    pub fn step_failed(index: usize, action: &str, message: impl Into<String>) -> Self {
        Self::StepFailed {
            index,
            action: action.to_string(),
            message: message.into(),
        }
    }

    /// Process exit code for a fatal error.
    ///
    /// A failed sub-process hands its own exit code through; everything
    /// else maps to 2 so it never collides with "tests failed" (1).
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::CommandFailed { code, .. } if *code != 0 => *code,
            _ => 2,
        }
    }
}
