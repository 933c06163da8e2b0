//! YAML configuration files
//!
//! A missing or broken file never stops the organ from starting: loading
//! falls back to the type's defaults and says why in the log.

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read `path`, or the defaults when it is absent or unreadable
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("No config at {}, using defaults", path.display());
            return T::default();
        }
        Err(e) => {
            log::warn!("Cannot read {}: {}, using defaults", path.display(), e);
            return T::default();
        }
    };

    serde_yaml::from_str(&text).unwrap_or_else(|e| {
        log::warn!("Ignoring invalid config {}: {}", path.display(), e);
        T::default()
    })
}

/// Write `config` to `path`, creating its directory
pub fn save_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    }
    let yaml = serde_yaml::to_string(config).context("Cannot serialize config")?;
    std::fs::write(path, yaml).with_context(|| format!("Cannot write {}", path.display()))?;
    log::info!("Saved config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioConfig;
    use crate::engine::OutputLayout;
    use crate::synth::{Temperament, Tuning};
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct TestConfig {
        audio: AudioConfig,
        tuning: Tuning,
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config: TestConfig = load_config(&dir.path().join("absent.yaml"));
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("organum.yaml");

        let config = TestConfig {
            audio: AudioConfig::default().with_layout(OutputLayout::Binaural),
            tuning: Tuning {
                base_frequency: 415.0,
                temperament: Temperament::WerckmeisterIii,
            },
        };

        save_config(&config, &path).unwrap();
        let loaded: TestConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_broken_yaml_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("organum.yaml");
        std::fs::write(&path, "audio: [not, a, map").unwrap();
        let config: TestConfig = load_config(&path);
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn test_directory_path_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config: TestConfig = load_config(dir.path());
        assert_eq!(config, TestConfig::default());
    }
}
