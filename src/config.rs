// Facade and engine configuration
// Loadable from JSON; every field has a working default

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, Result};

fn parse_json<T: DeserializeOwned>(json: &str, what: &str) -> Result<T> {
    serde_json::from_str(json)
        .map_err(|e| CryptoError::invalid_argument("config", format!("invalid {}: {}", what, e)))
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let json = std::fs::read_to_string(path)?;
    parse_json(&json, what)
}

/// Settings for the crypto facade
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Where file operations put output when the caller names no path
    pub temp_dir: Option<PathBuf>,

    /// Upper bound on a single file task, in seconds
    pub file_timeout_secs: Option<u64>,
}

impl CryptoConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_json(json, "config")
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        read_json(path, "config")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn file_timeout(&self) -> Option<Duration> {
        self.file_timeout_secs.map(Duration::from_secs)
    }
}

/// Settings for the bundled software engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareEngineConfig {
    /// Use the full SHA-256 of the public key as identifier instead of the
    /// first 8 bytes of its SHA-512
    pub sha256_fingerprints: bool,

    /// Block size plaintext is padded to when padding is requested
    pub padding_frame: usize,

    /// Largest random buffer a single call may request
    pub max_random_size: u32,
}

impl Default for SoftwareEngineConfig {
    fn default() -> Self {
        Self {
            sha256_fingerprints: false,
            padding_frame: 160,
            max_random_size: 1024 * 1024,
        }
    }
}

impl SoftwareEngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_json(json, "engine config")
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        read_json(path, "engine config")
    }
}

/// Facade settings at the top level plus an `engine` section, as read by
/// the command line tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub crypto: CryptoConfig,
    pub engine: SoftwareEngineConfig,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_json(json, "config")
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        read_json(path, "config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = CryptoConfig::from_json_str(r#"{ "file_timeout_secs": 5 }"#).unwrap();
        assert_eq!(config.file_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.temp_dir(), std::env::temp_dir());
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = SoftwareEngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SoftwareEngineConfig::default());
        assert_eq!(config.padding_frame, 160);
    }

    #[test]
    fn test_invalid_json() {
        assert!(CryptoConfig::from_json_str("{ not json").is_err());
        assert!(AppConfig::from_json_str(r#"{ "engine": { "padding_frame": "wide" } }"#).is_err());
    }

    #[test]
    fn test_app_config_reads_engine_section() {
        let config = AppConfig::from_json_str(
            r#"{
                "file_timeout_secs": 9,
                "engine": { "sha256_fingerprints": true, "max_random_size": 64 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.crypto.file_timeout(), Some(Duration::from_secs(9)));
        assert!(config.engine.sha256_fingerprints);
        assert_eq!(config.engine.max_random_size, 64);
        assert_eq!(config.engine.padding_frame, 160);

        assert_eq!(AppConfig::from_json_str("{}").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_config_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "padding_frame": 32 }"#).unwrap();
        assert_eq!(SoftwareEngineConfig::from_json_file(&path).unwrap().padding_frame, 32);

        let missing = dir.path().join("missing.json");
        assert!(matches!(AppConfig::from_json_file(&missing), Err(CryptoError::Io(_))));
    }
}
