//! Configuration file loading
//!
//! Handles loading and saving board configuration as TOML.

use crate::config::Config;
use crate::error::ConfigError;

use std::path::{Path, PathBuf};

/// Configuration file handler
pub struct ConfigFile;

impl ConfigFile {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        config.board.validate()?;
        Ok(config)
    }

    /// Load configuration from the first default location that parses
    pub fn load_default() -> Option<Config> {
        for path in Self::default_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    return Some(config);
                }
                Err(e) => log::warn!("Ignoring {}: {}", path.display(), e),
            }
        }
        None
    }

    /// Get default configuration file paths
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/dvfsctl/board.toml")];

        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("dvfsctl").join("board.toml"));
        }

        paths.push(PathBuf::from("dvfsctl.toml"));
        paths
    }

    /// Render configuration as TOML
    pub fn to_toml(config: &Config) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(config)?)
    }

    /// Write configuration to a file
    pub fn save<P: AsRef<Path>>(config: &Config, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, Self::to_toml(config)?).map_err(|e| ConfigError::InvalidValue {
            key: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_paths_not_empty() {
        let paths = ConfigFile::default_paths();
        assert_eq!(paths[0], PathBuf::from("/etc/dvfsctl/board.toml"));
        assert!(paths.iter().any(|p| p.ends_with("dvfsctl.toml")));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigFile::load("/nonexistent/path/board.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_save_and_load_default_board() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.toml");

        ConfigFile::save(&Config::default(), &path).unwrap();
        let loaded = ConfigFile::load(&path).unwrap();

        assert_eq!(loaded.board.clocks.len(), 3);
        assert_eq!(loaded.board.dependencies[0].max_below_mv, Some(200));
        assert_eq!(
            loaded.board.voltage_domains[0]
                .regulator
                .as_ref()
                .map(|r| r.ramp_uv_per_us),
            Some(Some(12_500))
        );
    }

    #[test]
    fn test_load_rejects_dangling_reference() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[board.power_domain]]
            name = "pd_cpu"
            voltage_domain = "vd_missing"
            "#
        )
        .unwrap();

        assert!(matches!(
            ConfigFile::load(file.path()),
            Err(ConfigError::UnknownReference { .. })
        ));
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[smp]\ncores = \"four\"").unwrap();
        assert!(matches!(
            ConfigFile::load(file.path()),
            Err(ConfigError::TomlError(_))
        ));
    }
}
