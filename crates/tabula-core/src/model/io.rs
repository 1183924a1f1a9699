use std::path::Path;

use super::Model;
use crate::config::ModelConfig;
use crate::error::Result;
use crate::storage::{parse_workbook, parse_workbook_content, write_workbook, write_workbook_content};

impl Model {
    /// Build a model from workbook JSON.
    pub fn from_json(content: &str, config: ModelConfig) -> Result<Self> {
        let data = parse_workbook_content(content)?;
        Self::from_data(&data, config)
    }

    pub fn to_json(&self) -> Result<String> {
        write_workbook_content(&self.export())
    }

    /// Open a workbook file. The model starts with an empty history.
    pub fn load(path: &Path, config: ModelConfig) -> Result<Self> {
        let data = parse_workbook(path)?;
        let model = Self::from_data(&data, config)?;
        tracing::info!(path = %path.display(), "loaded workbook");
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_workbook(path, &self.export())?;
        tracing::info!(path = %path.display(), "saved workbook");
        Ok(())
    }
}
