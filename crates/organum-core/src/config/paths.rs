//! Standard locations for the configuration file and the waveform cache

use std::path::PathBuf;

/// Get the default config file path
///
/// Returns: `~/.config/organum/organum.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("organum")
        .join("organum.yaml")
}

/// Get the default waveform cache directory
///
/// Returns: `~/.cache/organum/waves`
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".cache"))
        .join("organum")
        .join("waves")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path() {
        assert!(default_config_path().ends_with("organum/organum.yaml"));
    }

    #[test]
    fn test_cache_dir() {
        assert!(default_cache_dir().ends_with("organum/waves"));
    }
}
