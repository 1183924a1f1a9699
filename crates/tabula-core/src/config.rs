//! Model configuration, read from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TabulaError};

const MAX_CONFIG_FILE_BYTES: u64 = 65_536;

/// Defaults applied to new sheets and to the history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub default_col_width: u32,
    pub default_row_height: u32,
    pub default_cols: usize,
    pub default_rows: usize,
    pub sheet_name_prefix: String,
    /// Maximum number of undo entries; unbounded when unset.
    pub history_limit: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            default_col_width: 96,
            default_row_height: 23,
            default_cols: 26,
            default_rows: 100,
            sheet_name_prefix: "Sheet".to_string(),
            history_limit: None,
        }
    }
}

impl ModelConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ModelConfig = toml::from_str(text)?;
        if config.default_cols == 0 || config.default_rows == 0 {
            return Err(TabulaError::invalid(
                "default_cols and default_rows must be at least 1",
            ));
        }
        Ok(config)
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(ModelConfig::default());
        }
        let meta = std::fs::metadata(path)?;
        if meta.len() > MAX_CONFIG_FILE_BYTES {
            return Err(TabulaError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Refusing to read {}: config file too large ({} bytes, max {})",
                    path.display(),
                    meta.len(),
                    MAX_CONFIG_FILE_BYTES
                ),
            )));
        }
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}
