use std::path::{Path, PathBuf};

use silt_core::MonitorConfig;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Infer the format from a file extension, defaulting to YAML the way
    /// the monitor config has always been authored.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// Loads, saves, and resolves paths for [`MonitorConfig`].
///
/// Mirrors the monitor's own default-on-missing-file behaviour: a config
/// path that doesn't exist yet is not an error, it just means "use
/// defaults".
pub struct ConfigLoader;

impl ConfigLoader {
    pub async fn load(path: &Path) -> Result<MonitorConfig, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            return Ok(MonitorConfig::default());
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let mut config = match ConfigFormat::from_path(path) {
            #[cfg(feature = "yaml")]
            ConfigFormat::Yaml => serde_yaml::from_str::<MonitorConfig>(&raw)?,
            #[cfg(not(feature = "yaml"))]
            ConfigFormat::Yaml => return Err(ConfigError::UnknownFormat(path.display().to_string())),
            #[cfg(feature = "toml")]
            ConfigFormat::Toml => toml::from_str::<MonitorConfig>(&raw)?,
            #[cfg(not(feature = "toml"))]
            ConfigFormat::Toml => return Err(ConfigError::UnknownFormat(path.display().to_string())),
        };

        for watched in &mut config.watched {
            watched.path = expand_path(&watched.path);
        }
        Ok(config)
    }

    pub async fn save(
        config: &MonitorConfig,
        path: &Path,
        format: ConfigFormat,
    ) -> Result<(), ConfigError> {
        let serialized = match format {
            #[cfg(feature = "yaml")]
            ConfigFormat::Yaml => serde_yaml::to_string(config)?,
            #[cfg(not(feature = "yaml"))]
            ConfigFormat::Yaml => return Err(ConfigError::UnknownFormat(path.display().to_string())),
            #[cfg(feature = "toml")]
            ConfigFormat::Toml => toml::to_string_pretty(config)?,
            #[cfg(not(feature = "toml"))]
            ConfigFormat::Toml => return Err(ConfigError::UnknownFormat(path.display().to_string())),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, serialized)
            .await
            .map_err(|source| ConfigError::Io {
                path: tmp_path.display().to_string(),
                source,
            })?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Ok(())
    }

    /// Validate and refuse to start the pipeline on a non-empty issue list.
    pub fn validate_or_err(config: &MonitorConfig) -> Result<(), ConfigError> {
        let issues = config.validate();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }

    /// JSON Schema describing the on-disk shape of [`MonitorConfig`], for
    /// editors and `silt config schema`.
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(MonitorConfig)
    }

    /// Platform data directory for vector and template storage
    /// (`$XDG_DATA_HOME/silt` on Linux, the analogous directory elsewhere),
    /// falling back to `./silt_data` when the platform has none.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("silt"))
            .unwrap_or_else(|| PathBuf::from("./silt_data"))
    }
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}
