//! ParameterStore - shared key/value parameter lookup
//!
//! Stands in for the process-wide parameter server the calibration and
//! robot description collaborators fall back to.

use std::collections::HashMap;

/// Read-only parameter lookup
pub trait ParameterStore {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory parameter store
#[derive(Debug, Clone, Default)]
pub struct MapParameterStore {
    values: HashMap<String, String>,
}

impl MapParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ParameterStore for MapParameterStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Environment-backed parameter store
///
/// `get("lidar_calibration")` reads `SPIN_PLAYBACK_LIDAR_CALIBRATION`.
#[derive(Debug, Clone)]
pub struct EnvParameterStore {
    prefix: String,
}

impl Default for EnvParameterStore {
    fn default() -> Self {
        Self {
            prefix: "SPIN_PLAYBACK_".to_string(),
        }
    }
}

impl EnvParameterStore {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn env_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase())
    }
}

impl ParameterStore for EnvParameterStore {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.env_key(key))
            .ok()
            .filter(|value| !value.is_empty())
    }
}
