//! Configuration loading

use anyhow::{Context, Result};
use scenekit_core::HistoryConfig;
use scenekit_import::ImportConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Load configuration from file, or defaults when the file is absent
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenekit_import::{BatchPolicy, ModelFormat};
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.import.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.history.max_records, 100);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scenekit.toml");
        std::fs::write(
            &path,
            r#"
[import]
supported_types = ["glb", "obj"]
batch_policy = "continue"

[import.placement]
grid_height = 1.5

[history]
max_records = 20
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(
            config.import.supported_types,
            vec![ModelFormat::Glb, ModelFormat::Obj]
        );
        assert_eq!(config.import.batch_policy, BatchPolicy::Continue);
        assert_eq!(config.import.placement.grid_height, 1.5);
        assert_eq!(config.import.zip.legacy_encoding, "gbk");
        assert_eq!(config.history.max_records, 20);
        assert_eq!(config.history.max_logs, 500);
    }

    #[test]
    fn test_saved_default_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scenekit.toml");
        save_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.import.http_timeout_secs, 30);
        assert_eq!(config.import.supported_types.len(), 4);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scenekit.toml");
        std::fs::write(&path, "[import]\nmax_file_size = \"big\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
