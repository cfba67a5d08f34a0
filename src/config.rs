//! Persistent output settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::codec::OutputFormat;
use crate::error::{Error, Result};

/// Name of the application's directory under the platform config/data dirs.
const APP_DIR: &str = "manga-watermark-removal";
const CONFIG_FILE: &str = "config.json";

/// Output settings used by removal runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Where recovered pages are written.
    pub output_dir: PathBuf,
    /// Format of recovered pages.
    pub output_format: OutputFormat,
    /// Run the lossless size-reduction pass on output.
    pub output_optimize: bool,
}

impl Default for Config {
    fn default() -> Self {
        let output_dir = dirs::data_dir()
            .map_or_else(|| PathBuf::from("output"), |d| d.join(APP_DIR).join("output"));
        Self {
            output_dir,
            output_format: OutputFormat::default(),
            output_optimize: false,
        }
    }
}

impl Config {
    /// Check that the settings can be used for a removal run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the output directory is empty.
    pub fn validate(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("output directory is not set".to_string()));
        }
        Ok(())
    }
}

/// Default location of the configuration file.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map_or_else(|| PathBuf::from("."), |d| d.join(APP_DIR))
        .join(CONFIG_FILE)
}

/// A [`Config`] bound to the file it is persisted in.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    /// Load the configuration at `path`.
    ///
    /// A missing file yields the defaults; an unreadable or unparsable one is
    /// replaced by the defaults. Either way the resulting config is written
    /// back, so the file exists afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Write`] if the file cannot be written.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = if path.exists() {
            match read_config(&path) {
                Ok(config) => config,
                Err(e) => {
                    warn!("ignoring {}: {e}", path.display());
                    Config::default()
                }
            }
        } else {
            Config::default()
        };

        let store = Self { path, config };
        store.write()?;
        Ok(store)
    }

    /// The current configuration.
    #[must_use]
    pub fn get(&self) -> &Config {
        &self.config
    }

    /// Where the configuration is persisted.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the configuration and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails validation (the
    /// current configuration is kept), and [`Error::Write`] if it cannot be
    /// written.
    pub fn save(&mut self, config: Config) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.write()?;
        info!("saved config to {}", self.path.display());
        Ok(())
    }

    fn write(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.config).map_err(|source| Error::Config {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| Error::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        std::fs::write(&self.path, text).map_err(|source| Error::Write {
            path: self.path.clone(),
            source,
        })
    }
}

fn read_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| Error::Config {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.get(), &Config::default());
        assert!(path.is_file());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut store = ConfigStore::load(&path).unwrap();
        let config = Config {
            output_dir: PathBuf::from("/srv/clean"),
            output_format: OutputFormat::Jpeg,
            output_optimize: true,
        };
        store.save(config.clone()).unwrap();

        let reloaded = ConfigStore::load(&path).unwrap();
        assert_eq!(reloaded.get(), &config);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.get(), &Config::default());
    }

    #[test]
    fn save_rejects_empty_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::load(dir.path().join("config.json")).unwrap();
        let before = store.get().clone();

        let result = store.save(Config {
            output_dir: PathBuf::new(),
            ..Config::default()
        });
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        assert_eq!(store.get(), &before);
    }

    #[test]
    fn config_uses_camel_case_keys() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json.get("outputDir").is_some());
        assert_eq!(json["outputFormat"], "Png");
        assert_eq!(json["outputOptimize"], false);
    }
}
