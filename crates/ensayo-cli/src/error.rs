//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Session error
    #[error(transparent)]
    Ensayo(#[from] ensayo::EnsayoError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Ensayo(e) => e.exit_code(),
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensayo::EnsayoError;

    #[test]
    fn test_child_code_propagates() {
        let err = CliError::from(EnsayoError::CommandFailed {
            step: "install".to_string(),
            code: 7,
        });
        assert_eq!(err.exit_code(), 7);
        assert!(err.to_string().contains("install"));
    }

    #[test]
    fn test_other_errors_exit_two() {
        assert_eq!(CliError::config("bad").exit_code(), 2);
        assert_eq!(CliError::invalid_argument("bad").exit_code(), 2);
        assert_eq!(
            CliError::from(std::io::Error::other("disk")).exit_code(),
            2
        );
        assert_eq!(CliError::config("x").to_string(), "Configuration error: x");
    }
}
