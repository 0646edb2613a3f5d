//! Persisted settings: default model, gateway base URL, simulated-stream
//! pacing. Stored as TOML under the platform config directory.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::core::models::DEFAULT_MODEL_ID;
use crate::utils::url::normalize_base_url;

pub const DEFAULT_BASE_URL: &str = "https://gateway.permacommons.org/api";
pub const BASE_URL_ENV_VAR: &str = "PALABRE_BASE_URL";

/// Pacing defaults for models whose replies are re-streamed locally.
pub const DEFAULT_WORDS_PER_CHUNK: usize = 3;
pub const DEFAULT_CHUNK_INTERVAL_MS: u64 = 50;

/// Errors that can occur when loading configuration from disk.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path_display(path), source)
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse config at {}: {}",
                    path_display(path),
                    source
                )
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

/// Render a path with the home directory collapsed to `~` on Unix.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words_per_chunk: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_interval_ms: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        Self::load_from_path(&Self::get_config_path())
    }

    pub fn load_from_path(config_path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                path: config_path.clone(),
                source,
            })?;
            let config: Config =
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: config_path.clone(),
                    source,
                })?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to_path(&Self::get_config_path())
    }

    pub(crate) fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };

        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(config_path)
            .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;
        Ok(())
    }

    pub(crate) fn get_config_path() -> PathBuf {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "palabre")
            .expect("Failed to determine config directory");
        proj_dirs.config_dir().join("config.toml")
    }

    /// Model used when no `/model` switch has happened and nothing is
    /// configured.
    pub fn effective_model(&self) -> &str {
        self.default_model.as_deref().unwrap_or(DEFAULT_MODEL_ID)
    }

    /// `PALABRE_BASE_URL` wins over the config file, which wins over the
    /// built-in gateway.
    pub fn effective_base_url(&self) -> String {
        std::env::var(BASE_URL_ENV_VAR)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| self.base_url.clone())
            .map(|value| normalize_base_url(&value))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn effective_words_per_chunk(&self) -> usize {
        self.words_per_chunk.unwrap_or(DEFAULT_WORDS_PER_CHUNK).max(1)
    }

    pub fn effective_chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms.unwrap_or(DEFAULT_CHUNK_INTERVAL_MS))
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "default-model" => self.default_model = Some(value.to_string()),
            "base-url" => self.base_url = Some(normalize_base_url(value)),
            "words-per-chunk" => {
                let parsed = value
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        format!("words-per-chunk must be a positive integer, got '{value}'")
                    })?;
                self.words_per_chunk = Some(parsed);
            }
            "chunk-interval-ms" => {
                let parsed = value.parse::<u64>().map_err(|_| {
                    format!("chunk-interval-ms must be a non-negative integer, got '{value}'")
                })?;
                self.chunk_interval_ms = Some(parsed);
            }
            _ => return Err(unknown_key_message(key)),
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: &str) -> Result<(), String> {
        match key {
            "default-model" => self.default_model = None,
            "base-url" => self.base_url = None,
            "words-per-chunk" => self.words_per_chunk = None,
            "chunk-interval-ms" => self.chunk_interval_ms = None,
            _ => return Err(unknown_key_message(key)),
        }
        Ok(())
    }
}

fn unknown_key_message(key: &str) -> String {
    format!(
        "Unknown setting '{key}'. Valid keys: default-model, base-url, words-per-chunk, chunk-interval-ms"
    )
}
