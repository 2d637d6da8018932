use crate::error::AppError;
use gallery_access::{GalleryConfig, PickerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Host configuration, read from a TOML file with `[gallery]` and `[picker]` tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gallery: GalleryConfig,
    pub picker: PickerConfig,
}

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self, AppError> {
        Ok(toml::from_str(content)?)
    }

    /// Load the configuration file, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        log::debug!("Loading configuration from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}
