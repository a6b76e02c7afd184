//! Engine configuration structures.
//!
//! These structures define the configurable aspects of a VergeDB engine
//! instance: which version-store backend to run on and how to tune it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main engine configuration.
///
/// # Example
///
/// ```rust
/// use verge_common::config::{EngineConfig, StoreBackend};
///
/// let config = EngineConfig::default();
/// assert!(matches!(config.backend, StoreBackend::Memory));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Which version-store backend to open.
    pub backend: StoreBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration for the in-memory backend.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates a configuration for the sled backend at the given path.
    #[must_use]
    pub fn sled(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackend::Sled(SledStoreConfig {
                path: path.into(),
                ..SledStoreConfig::default()
            }),
        }
    }

    /// Creates a minimal configuration for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self::in_memory()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<(), String> {
        match &self.backend {
            StoreBackend::Memory => Ok(()),
            StoreBackend::Sled(sled) => sled.validate(),
        }
    }
}

/// Version-store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreBackend {
    /// In-process store, linearizable per record via per-chain mutexes.
    /// Contents do not survive the process.
    Memory,
    /// Embedded persistent store over sled's native per-key
    /// compare-and-swap. Requires the `sled-backend` feature of
    /// `verge-store`.
    Sled(SledStoreConfig),
}

/// Configuration for the sled backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SledStoreConfig {
    /// Directory holding the sled database.
    pub path: PathBuf,

    /// sled page-cache capacity in bytes.
    /// Default: 64 MB.
    pub cache_capacity_bytes: u64,

    /// Background flush interval in milliseconds; `None` leaves flushing
    /// to sled's defaults.
    pub flush_every_ms: Option<u64>,
}

impl Default for SledStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./verge-data"),
            cache_capacity_bytes: 64 * 1024 * 1024,
            flush_every_ms: Some(500),
        }
    }
}

impl SledStoreConfig {
    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("sled backend requires a non-empty path".to_string());
        }

        if self.cache_capacity_bytes < 1024 * 1024 {
            return Err("cache_capacity_bytes must be at least 1 MB".to_string());
        }

        if self.flush_every_ms == Some(0) {
            return Err("flush_every_ms must be non-zero when set".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sled_config() {
        let config = EngineConfig::sled("/tmp/verge-test");
        assert!(config.validate().is_ok());

        match config.backend {
            StoreBackend::Sled(sled) => {
                assert_eq!(sled.path, PathBuf::from("/tmp/verge-test"));
            }
            StoreBackend::Memory => panic!("expected sled backend"),
        }
    }

    #[test]
    fn test_invalid_sled_config() {
        let mut sled = SledStoreConfig::default();
        sled.cache_capacity_bytes = 1024;
        assert!(sled.validate().is_err());

        let mut sled = SledStoreConfig::default();
        sled.path = PathBuf::new();
        assert!(sled.validate().is_err());

        let mut sled = SledStoreConfig::default();
        sled.flush_every_ms = Some(0);
        assert!(sled.validate().is_err());
    }
}
