use std::path::Path;

use serde::Deserialize;

use crate::{
    boundary::BoundaryConfig,
    classifier::ClassifierConfig,
    error::{Error, Result},
    patterns::{PatternConfig, PatternStore},
};

/// Tunables for detection and classification.
///
/// Every field has a default, so a partial document such as
/// `{"boundary": {"min_document_length": 2}}` is accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    pub boundary: BoundaryConfig,
    pub classifier: ClassifierConfig,
    /// Pattern tables; the built-in tables are used when absent.
    pub patterns: Option<PatternConfig>,
}

impl SplitterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            (
                "boundary.confidence_threshold",
                self.boundary.confidence_threshold,
            ),
            (
                "classifier.confidence_threshold",
                self.classifier.confidence_threshold,
            ),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.classifier.max_input_chars == 0 {
            return Err(Error::Config(
                "classifier.max_input_chars must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn pattern_store(&self) -> PatternStore {
        match &self.patterns {
            Some(config) => PatternStore::from_config(config),
            None => PatternStore::default(),
        }
    }
}
