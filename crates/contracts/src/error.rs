//! Layered error definitions
//!
//! Categorized by source: config / source / transform / session

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum PlaybackError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Missing or invalid static input (robot model, calibration, no logs).
    /// Fatal to setup, never retried.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    // ===== Source Errors =====
    /// One input log could not be opened or read
    #[error("log source '{source_name}' unavailable: {message}")]
    SourceUnavailable {
        source_name: String,
        message: String,
    },

    // ===== Transform Errors =====
    /// Dynamic transform update older than the latest sample of that edge
    #[error("stale update for '{child}' -> '{parent}': stamp {stamp} < latest {latest}")]
    StaleUpdate {
        child: String,
        parent: String,
        stamp: f64,
        latest: f64,
    },

    /// Edge would create a cycle or redefine an existing edge of another kind
    #[error("invalid edge '{child}' -> '{parent}': {message}")]
    Cycle {
        child: String,
        parent: String,
        message: String,
    },

    // ===== Session Errors =====
    /// A bounded queue overflowed; the session cannot make progress
    #[error("resource exhausted: {resource} depth={depth}, max={max}")]
    ResourceExhausted {
        resource: String,
        depth: usize,
        max: usize,
    },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl PlaybackError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create setup configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create source unavailable error
    pub fn source_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create cycle / edge conflict error
    pub fn cycle(
        child: impl Into<String>,
        parent: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Cycle {
            child: child.into(),
            parent: parent.into(),
            message: message.into(),
        }
    }

    /// Create resource exhausted error
    pub fn resource_exhausted(resource: impl Into<String>, depth: usize, max: usize) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
            depth,
            max,
        }
    }

    /// Whether the error ends the playback session (as opposed to being
    /// downgraded and logged by the caller).
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::SourceUnavailable { .. } | Self::StaleUpdate { .. }
        )
    }
}
