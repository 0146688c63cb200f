//! Run configuration.
//!
//! The defaults ship embedded in the binary (`config/default.toml`). A file
//! passed with `--config` replaces them wholesale; individual command-line
//! flags are applied on top afterwards.

use std::path::{Path, PathBuf};

use case_map_spatial::PlaceOverride;
use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Errors loading the run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Config`].
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    /// The configured geocoding service does not exist or is disabled.
    #[error("No enabled geocoding service named '{0}'")]
    UnknownService(String),

    /// No geocoding service is enabled at all.
    #[error("No geocoding service is enabled")]
    NoService,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Carry baseline rows missing from today's snapshot forward.
    #[serde(default)]
    pub retain_absent: bool,
    pub boundaries: BoundariesConfig,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub place_overrides: Vec<PlaceOverrideConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundariesConfig {
    /// GeoJSON file of place polygons.
    pub path: PathBuf,
    /// Feature property holding the place label.
    pub place_property: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputsConfig {
    /// Authoritative merged table.
    pub table: PathBuf,
    /// Records for manual review.
    pub review: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeocoderConfig {
    /// Service id from the geocoder registry. Highest priority if unset.
    pub service: Option<String>,
    /// Overrides the service's minimum delay between calls.
    pub rate_limit_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaceOverrideConfig {
    pub address: String,
    pub place: String,
}

impl Config {
    /// Loads `path`, or the embedded defaults when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                Self::parse(&text, &path.display().to_string())
            }
            None => Self::parse(DEFAULT_CONFIG, "<embedded default>"),
        }
    }

    fn parse(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            source: e,
        })
    }

    /// Overrides in the form the classifier consumes.
    #[must_use]
    pub fn place_overrides(&self) -> Vec<PlaceOverride> {
        self.place_overrides
            .iter()
            .map(|o| PlaceOverride {
                address: o.address.clone(),
                place: o.place.clone(),
            })
            .collect()
    }
}
