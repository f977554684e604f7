//! Error types for CLI operations.

use contracts::PlaybackError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Calibration, robot description or synchronizer could not be set up
    #[error("Playback setup failed: {source}")]
    Setup {
        #[source]
        source: PlaybackError,
    },

    /// Playback stopped on a fatal error
    #[error("Playback failed after {emitted} spins: {source}")]
    Playback {
        emitted: u64,
        #[source]
        source: PlaybackError,
    },

    /// Spin output could not be written
    #[error("Failed to write spin output: {message}")]
    Output { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn setup(source: PlaybackError) -> Self {
        Self::Setup { source }
    }

    pub fn playback(emitted: u64, source: PlaybackError) -> Self {
        Self::Playback { emitted, source }
    }

    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_error_message() {
        let err = CliError::playback(
            3,
            PlaybackError::resource_exhausted("pending_spins", 65, 64),
        );
        assert_eq!(
            err.to_string(),
            "Playback failed after 3 spins: resource exhausted: pending_spins depth=65, max=64"
        );
    }
}
