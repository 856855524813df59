//! TOML container for one fitted model: its grouping design, model terms and
//! posterior draws. An external sampler writes it; the `predict` and
//! `summarize` commands read it.
//!
//! ```toml
//! model_id = "llo_vis"
//!
//! [[dimensions]]
//! name = "vis"
//! levels = ["HOPs", "intervals"]
//!
//! [[terms]]
//! name = "lo_ground_truth"
//! predictor = "anchor"
//!
//! [[draws]]
//! draw = 1
//! coefficients = [0.83]
//! ```

use super::design::{Design, Dimension, LinearPredictor, ModelTerm, PosteriorDraws};
use super::{DrawError, DrawId};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to read or write fit artifact: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse fit artifact TOML: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize fit artifact to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Draw {draw} has {found} coefficients, but the artifact declares {expected} terms.")]
    CoefficientCount {
        draw: DrawId,
        found: usize,
        expected: usize,
    },
    #[error("The artifact contains no draws.")]
    NoDraws,
    #[error("Invalid fit artifact: {0}")]
    Draw(#[from] DrawError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub draw: DrawId,
    /// One value per term, in term order.
    pub coefficients: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitArtifact {
    pub model_id: String,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    pub terms: Vec<ModelTerm>,
    pub draws: Vec<DrawRecord>,
}

impl FitArtifact {
    pub fn load(path: &str) -> Result<Self, ArtifactError> {
        let toml_string = fs::read_to_string(path)?;
        let artifact: FitArtifact = toml::from_str(&toml_string)?;
        log::info!(
            "Loaded fit '{}' from '{}' ({} draws, {} terms).",
            artifact.model_id,
            path,
            artifact.draws.len(),
            artifact.terms.len()
        );
        Ok(artifact)
    }

    pub fn save(&self, path: &str) -> Result<(), ArtifactError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Validates the artifact and packs the draws into a coefficient matrix.
    pub fn to_posterior(&self) -> Result<PosteriorDraws, ArtifactError> {
        if self.draws.is_empty() {
            return Err(ArtifactError::NoDraws);
        }
        let n_terms = self.terms.len();
        let mut coefficients = Array2::zeros((self.draws.len(), n_terms));
        for (mut row, record) in coefficients.rows_mut().into_iter().zip(&self.draws) {
            if record.coefficients.len() != n_terms {
                return Err(ArtifactError::CoefficientCount {
                    draw: record.draw,
                    found: record.coefficients.len(),
                    expected: n_terms,
                });
            }
            for (cell, &value) in row.iter_mut().zip(&record.coefficients) {
                *cell = value;
            }
        }
        let design = Design::new(self.dimensions.clone())?;
        Ok(PosteriorDraws::new(
            self.model_id.clone(),
            design,
            self.terms.clone(),
            self.draws.iter().map(|d| d.draw).collect(),
            coefficients,
        )?)
    }

    pub fn from_posterior(posterior: &PosteriorDraws) -> Self {
        FitArtifact {
            model_id: posterior.model_id().to_string(),
            dimensions: posterior.design().dimensions().to_vec(),
            terms: posterior.terms().to_vec(),
            draws: posterior
                .draw_ids()
                .iter()
                .zip(posterior.coefficients().rows())
                .map(|(&draw, row)| DrawRecord {
                    draw,
                    coefficients: row.to_vec(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posterior::GroupingKey;
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    const SMALL_FIT: &str = r#"
model_id = "llo_vis"

[[dimensions]]
name = "vis"
levels = ["HOPs", "intervals"]

[[terms]]
name = "intercept"
predictor = "constant"

[[terms]]
name = "lo_ground_truth"
predictor = "anchor"

[[terms]]
name = "lo_ground_truth:visintervals"
predictor = "anchor"
conditions = [{ dimension = "vis", level = "intervals" }]

[[draws]]
draw = 1
coefficients = [0.1, 0.8, 0.3]

[[draws]]
draw = 2
coefficients = [-0.1, 0.6, 0.5]
"#;

    #[test]
    fn parses_and_evaluates() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SMALL_FIT.as_bytes()).unwrap();
        file.flush().unwrap();
        let artifact = FitArtifact::load(file.path().to_str().unwrap()).unwrap();
        let posterior = artifact.to_posterior().unwrap();
        assert_eq!(posterior.draw_ids(), &[DrawId(1), DrawId(2)]);
        let key = GroupingKey::new(["intervals"]);
        assert_relative_eq!(posterior.eval(1, &key, 2.0), -0.1 + 2.0 * 1.1, epsilon = 1e-12);
    }

    #[test]
    fn save_then_load_round_trip() {
        let artifact: FitArtifact = toml::from_str(SMALL_FIT).unwrap();
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        artifact.save(path).unwrap();
        let reloaded = FitArtifact::load(path).unwrap();
        assert_eq!(reloaded, artifact);
        let posterior = reloaded.to_posterior().unwrap();
        assert_eq!(FitArtifact::from_posterior(&posterior), artifact);
    }

    #[test]
    fn coefficient_count_is_checked() {
        let mut artifact: FitArtifact = toml::from_str(SMALL_FIT).unwrap();
        artifact.draws[1].coefficients.pop();
        assert!(matches!(
            artifact.to_posterior(),
            Err(ArtifactError::CoefficientCount { draw: DrawId(2), found: 2, expected: 3 })
        ));
        artifact.draws.clear();
        assert!(matches!(artifact.to_posterior(), Err(ArtifactError::NoDraws)));
    }
}
