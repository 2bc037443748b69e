//! Configuration for kvstore

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the store directory
    #[serde(rename = "store-path", default = "default_store_path")]
    pub store_path: PathBuf,

    /// Byte quota for the whole store (absent = unlimited)
    #[serde(rename = "quota-bytes", default = "default_quota")]
    pub quota_bytes: Option<u64>,
}

/// Default store location, shared with the smarttrack application
pub fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smarttrack")
        .join("store")
}

fn default_quota() -> Option<u64> {
    Some(crate::DEFAULT_QUOTA_BYTES)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            quota_bytes: default_quota(),
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            return Ok(config);
        }

        // Try default locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("kvstore").join("config.yml")),
            Some(PathBuf::from("kvstore.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kv.yml");
        std::fs::write(&path, "store-path: /tmp/kv-test\nquota-bytes: 1024\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.store_path, PathBuf::from("/tmp/kv-test"));
        assert_eq!(config.quota_bytes, Some(1024));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kv.yml");
        std::fs::write(&path, "quota-bytes: ~\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.store_path, default_store_path());
        assert_eq!(config.quota_bytes, None);
    }
}
