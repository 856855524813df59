//! # Analysis Configuration
//!
//! Values that stay fixed for a whole analysis run: the tax schedule, the wager
//! settings, the stimulus-scale constants and the summary settings. The file
//! format is TOML; every section is optional and falls back to the experiment
//! defaults.
//!
//! ```toml
//! [tax]
//! boundaries = [0.0, 500.0, 1000.0, 1500.0, 2000.0, inf]
//! rates = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5]
//!
//! [wager]
//! budget = 1000.0
//! loss_rate = 0.25
//!
//! [summary]
//! coverages = [0.5, 0.8, 0.95]
//! point = "median"
//! ```

use crate::bet::{BetError, BetSolver, WagerSettings};
use crate::heuristics::StimulusScale;
use crate::posterior::marginal::{MarginalError, PointEstimate, SummarySettings};
use crate::tax::{TaxError, TaxSchedule};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid tax schedule: {0}")]
    Tax(#[from] TaxError),
    #[error("Invalid wager settings: {0}")]
    Wager(#[from] BetError),
    #[error("Invalid summary settings: {0}")]
    Summary(#[from] MarginalError),
    #[error("Invalid stimulus scale: {0}")]
    Stimulus(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub tax: TaxSchedule,
    pub wager: WagerSettings,
    pub stimulus: StimulusScale,
    pub summary: SummarySettings,
}

impl AnalysisConfig {
    /// Loads a configuration from a TOML file and validates it.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: AnalysisConfig = toml::from_str(&toml_string)?;
        config.validate()?;
        log::info!("Loaded analysis configuration from '{path}'");
        Ok(config)
    }

    /// Loads `path` if given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => AnalysisConfig::load(p),
            None => Ok(AnalysisConfig::default()),
        }
    }

    /// Saves the configuration in human-readable TOML.
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Checks every section. The tax schedule is validated when it is parsed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.wager.validate()?;
        self.summary.validate()?;
        let s = &self.stimulus;
        if !(s.max_abs_mean_diff.is_finite() && s.max_abs_mean_diff >= 0.0) {
            return Err(ConfigError::Stimulus(format!(
                "max_abs_mean_diff must be finite and non-negative, got {}",
                s.max_abs_mean_diff
            )));
        }
        if !(s.axis_range.is_finite() && s.axis_range > 0.0) {
            return Err(ConfigError::Stimulus(format!(
                "axis_range must be finite and positive, got {}",
                s.axis_range
            )));
        }
        if s.outcome_prefix == Some(0) {
            return Err(ConfigError::Stimulus(
                "outcome_prefix must keep at least one draw".to_string(),
            ));
        }
        Ok(())
    }

    /// A bet solver borrowing this configuration's tax schedule.
    pub fn solver(&self) -> Result<BetSolver<'_>, ConfigError> {
        Ok(BetSolver::new(self.wager, &self.tax)?)
    }

    pub fn point_estimate(&self) -> PointEstimate {
        self.summary.point
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        let config = AnalysisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tax, TaxSchedule::experiment_default());
        assert_eq!(config.summary.coverages, vec![0.5, 0.8, 0.95]);
        assert_eq!(config.point_estimate(), PointEstimate::Median);
    }

    #[test]
    fn save_then_load_keeps_infinite_boundary() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        let config = AnalysisConfig::default();
        config.save(path).unwrap();
        let loaded = AnalysisConfig::load(path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[tax]\nboundaries = [0.0, 100.0, inf]\nrates = [0.0, 0.5, 0.9]\n\n[wager]\nloss_rate = 0.4\n"
        )
        .unwrap();
        file.flush().unwrap();
        let config = AnalysisConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.tax.tiers().len(), 2);
        assert_eq!(config.wager.loss_rate, 0.4);
        assert_eq!(config.wager.budget, 1000.0);
        assert_eq!(config.stimulus, StimulusScale::default());
    }

    #[test]
    fn invalid_sections_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[tax]\nboundaries = [0.0, 100.0]\nrates = [0.5, 0.1]\n").unwrap();
        file.flush().unwrap();
        let err = AnalysisConfig::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseError(_)), "{err}");

        let mut config = AnalysisConfig::default();
        config.stimulus.axis_range = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Stimulus(_))));

        let mut config = AnalysisConfig::default();
        config.summary.coverages = vec![1.5];
        assert!(matches!(config.validate(), Err(ConfigError::Summary(_))));
    }
}
