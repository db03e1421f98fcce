//! Configuration storage for analysis settings.
//!
//! Provides centralized storage for named JSON documents such as the default
//! pipeline configuration. All config is stored in ~/.puncta_config/ by default.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or writing stored configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("HOME not set")]
    NoHome,
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Configuration storage manager.
///
/// Documents are stored as `<root>/<name>.json`.
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    /// Root directory for all configuration (e.g., ~/.puncta_config)
    root_path: PathBuf,
}

impl ConfigStorage {
    /// Create a new config storage with default path (~/.puncta_config)
    pub fn new() -> Result<Self, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::NoHome)?;
        let root_path = PathBuf::from(home).join(".puncta_config");
        Ok(Self { root_path })
    }

    /// Create a new config storage with custom root path
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Get the root configuration path
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Path of a named document
    pub fn document_path(&self, name: &str) -> PathBuf {
        let name_safe = name.replace(['/', '\\'], "_");
        self.root_path.join(format!("{name_safe}.json"))
    }

    /// Load a named document.
    ///
    /// Returns None if the document does not exist.
    /// Returns Some(Err) if the file exists but cannot be loaded.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Option<Result<T, ConfigError>> {
        let path = self.document_path(name);

        if !path.exists() {
            return None;
        }

        Some(load_json_file(&path))
    }

    /// Save a named document.
    ///
    /// Creates the config directory if it doesn't exist.
    /// Returns the path where the document was saved.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, ConfigError> {
        std::fs::create_dir_all(&self.root_path).map_err(|source| ConfigError::Io {
            path: self.root_path.clone(),
            source,
        })?;

        let path = self.document_path(name);
        save_json_file(&path, value)?;
        Ok(path)
    }

    /// Delete a named document.
    ///
    /// Returns Ok(true) if the file was deleted, Ok(false) if it didn't exist.
    pub fn delete(&self, name: &str) -> Result<bool, ConfigError> {
        let path = self.document_path(name);

        if !path.exists() {
            return Ok(false);
        }

        std::fs::remove_file(&path).map_err(|source| ConfigError::Io { path, source })?;
        Ok(true)
    }
}

/// Read and parse a JSON file
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize a value as pretty JSON, replacing any existing file
pub fn save_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
