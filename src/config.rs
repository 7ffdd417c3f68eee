//! Configuration file parser for ~/.config/gfeed/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as a warning so typos are
//! visible.
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::catalog::ImageLibrary;
use crate::feed::FeedContext;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid currency code '{0}': expected three ASCII letters")]
    Currency(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Site-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed `<title>`, normally the shop name.
    pub site_title: String,

    /// Feed `<link href>`, the shop's public URL.
    pub site_url: String,

    /// Catalog database path. Defaults to `catalog.db` next to the config.
    pub database: Option<PathBuf>,

    /// Image rendition used for `g:image_link` (falls back to "full").
    pub image_size: String,

    /// ISO 4217 code appended to prices, e.g. "USD".
    pub currency: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_title: String::new(),
            site_url: String::new(),
            database: None,
            image_size: ImageLibrary::FULL_SIZE.to_string(),
            currency: None,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] =
        ["site_title", "site_url", "database", "image_size", "currency"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Malformed currency → `Err(ConfigError::Currency)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let mut config: Config = toml::from_str(&content)?;
        config.normalize()?;
        tracing::info!(
            path = %path.display(),
            site = %config.site_url,
            image_size = %config.image_size,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn normalize(&mut self) -> Result<(), ConfigError> {
        if self.image_size.trim().is_empty() {
            self.image_size = ImageLibrary::FULL_SIZE.to_string();
        }
        self.currency = match self.currency.take() {
            Some(code) if code.trim().is_empty() => None,
            Some(code) => {
                let code = code.trim();
                if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(ConfigError::Currency(code.to_string()));
                }
                Some(code.to_ascii_uppercase())
            }
            None => None,
        };
        Ok(())
    }

    /// Resolves the database path, relative paths taken from `config_dir`.
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        match &self.database {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => config_dir.join(path),
            None => config_dir.join("catalog.db"),
        }
    }

    /// Site-level values for a generation run at `now`.
    pub fn feed_context(&self, now: DateTime<FixedOffset>) -> FeedContext {
        FeedContext {
            site_title: self.site_title.clone(),
            site_url: self.site_url.clone(),
            image_size: self.image_size.clone(),
            currency: self.currency.clone(),
            generated_at: now,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
