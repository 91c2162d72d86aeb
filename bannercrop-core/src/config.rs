//! Editor Configuration
//!
//! Every field has a default; a config file only needs the overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::validation::RatioPolicy;
use crate::{
    MAX_UPLOAD_BYTES, MIN_BOX_SIZE, RATIO_TOLERANCE, STAGE_HEIGHT, STAGE_WIDTH, TARGET_RATIO,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    pub target_ratio: f64,
    pub ratio_tolerance: f64,
    pub ratio_policy: RatioPolicy,
    pub stage_width: f64,
    pub stage_height: f64,
    pub min_box_size: f64,
    pub max_upload_bytes: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            target_ratio: TARGET_RATIO,
            ratio_tolerance: RATIO_TOLERANCE,
            ratio_policy: RatioPolicy::default(),
            stage_width: STAGE_WIDTH,
            stage_height: STAGE_HEIGHT,
            min_box_size: MIN_BOX_SIZE,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl EditorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: EditorConfig = serde_json::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if !(self.target_ratio > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "targetRatio must be positive, got {}",
                self.target_ratio
            )));
        }
        if !(self.ratio_tolerance >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "ratioTolerance must not be negative, got {}",
                self.ratio_tolerance
            )));
        }
        if !(self.stage_width > 0.0 && self.stage_height > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "stage must be non-empty, got {}x{}",
                self.stage_width, self.stage_height
            )));
        }
        if !(self.min_box_size > 0.0) {
            return Err(ConfigError::Invalid("minBoxSize must be positive".to_string()));
        }
        Ok(())
    }

    /// Acceptable ratio range, inclusive.
    pub fn ratio_range(&self) -> (f64, f64) {
        let spread = self.target_ratio * self.ratio_tolerance;
        (self.target_ratio - spread, self.target_ratio + spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.stage_width, 720.0);
        assert_eq!(config.stage_height, 280.0);
        assert_eq!(config.max_upload_bytes, 67_108_864);
        assert_eq!(config.ratio_policy, RatioPolicy::Warn);
        assert_eq!(config.ratio_range(), (2.125, 2.875));
    }

    #[test]
    fn test_partial_override() {
        let config = EditorConfig::from_json(r#"{"ratioPolicy": "block", "targetRatio": 3.0}"#).unwrap();
        assert_eq!(config.ratio_policy, RatioPolicy::Block);
        assert_eq!(config.target_ratio, 3.0);
        assert_eq!(config.ratio_tolerance, 0.15);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = EditorConfig::from_json(r#"{"targetRatio": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EditorConfig::from_json(r#"{"stageHeight": -1}"#).unwrap_err();
        assert!(err.to_string().contains("stage"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"minBoxSize": 12}}"#).unwrap();

        let config = EditorConfig::load(file.path()).unwrap();
        assert_eq!(config.min_box_size, 12.0);
    }
}
