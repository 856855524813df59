//! Grouping design, model terms and the linear-predictor capability.
//!
//! A fitted linear-log-odds model is described as a list of [`ModelTerm`]s. A term
//! contributes its coefficient to the linear predictor of a grouping key when the
//! key matches every one of the term's `(dimension, level)` conditions; slope-type
//! terms are additionally multiplied by the anchor predictor (ground truth on the
//! log-odds scale). Treatment-coded main effects, interactions and per-subject
//! random effects are all expressed this way.

use super::{DrawError, DrawId, GroupingKey};
use ahash::AHashSet;
use itertools::Itertools;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// One grouping variable and its levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub levels: Vec<String>,
}

impl Dimension {
    pub fn new<S: Into<String>>(name: S, levels: &[&str]) -> Self {
        Dimension {
            name: name.into(),
            levels: levels.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// The ordered grouping dimensions of a fitted design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Dimension>", into = "Vec<Dimension>")]
pub struct Design {
    dimensions: Vec<Dimension>,
}

impl TryFrom<Vec<Dimension>> for Design {
    type Error = DrawError;

    fn try_from(dimensions: Vec<Dimension>) -> Result<Self, Self::Error> {
        Design::new(dimensions)
    }
}

impl From<Design> for Vec<Dimension> {
    fn from(design: Design) -> Self {
        design.dimensions
    }
}

impl Design {
    pub fn new(dimensions: Vec<Dimension>) -> Result<Self, DrawError> {
        let mut seen = AHashSet::new();
        for dim in &dimensions {
            if !seen.insert(dim.name.as_str()) {
                return Err(DrawError::DuplicateDimension(dim.name.clone()));
            }
            if dim.levels.is_empty() {
                return Err(DrawError::EmptyDimension(dim.name.clone()));
            }
            if let Some(level) = dim.levels.iter().duplicates().next() {
                return Err(DrawError::DuplicateLevel {
                    dimension: dim.name.clone(),
                    level: level.clone(),
                });
            }
        }
        Ok(Design { dimensions })
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.dimensions.iter().map(|d| d.name.as_str()).collect()
    }

    /// Every combination of levels, first dimension varying slowest.
    pub fn keys(&self) -> Vec<GroupingKey> {
        if self.dimensions.is_empty() {
            return vec![GroupingKey::empty()];
        }
        self.dimensions
            .iter()
            .map(|d| d.levels.iter().cloned())
            .multi_cartesian_product()
            .map(GroupingKey)
            .collect()
    }

    /// Checks that `key` has one known level per dimension.
    pub fn check_key(&self, key: &GroupingKey) -> Result<(), DrawError> {
        if key.levels().len() != self.dimensions.len() {
            return Err(DrawError::ForeignKey {
                key: key.clone(),
                reason: format!(
                    "expected {} levels, found {}",
                    self.dimensions.len(),
                    key.levels().len()
                ),
            });
        }
        for (dim, level) in self.dimensions.iter().zip(key.levels()) {
            if !dim.levels.contains(level) {
                return Err(DrawError::ForeignKey {
                    key: key.clone(),
                    reason: format!("'{level}' is not a level of '{}'", dim.name),
                });
            }
        }
        Ok(())
    }

    /// The sub-design made of the dimensions at `indices`, in that order.
    pub fn project(&self, indices: &[usize]) -> Design {
        Design {
            dimensions: indices.iter().map(|&i| self.dimensions[i].clone()).collect(),
        }
    }
}

/// What a term's coefficient multiplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermPredictor {
    /// Intercept-type term.
    Constant,
    /// Slope-type term, multiplied by the anchor predictor.
    Anchor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermCondition {
    pub dimension: String,
    pub level: String,
}

/// One coefficient of the fitted linear predictor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTerm {
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<TermCondition>,
    pub predictor: TermPredictor,
}

impl ModelTerm {
    pub fn constant<S: Into<String>>(name: S, conditions: &[(&str, &str)]) -> Self {
        ModelTerm::build(name, conditions, TermPredictor::Constant)
    }

    pub fn anchor<S: Into<String>>(name: S, conditions: &[(&str, &str)]) -> Self {
        ModelTerm::build(name, conditions, TermPredictor::Anchor)
    }

    fn build<S: Into<String>>(name: S, conditions: &[(&str, &str)], predictor: TermPredictor) -> Self {
        ModelTerm {
            name: name.into(),
            conditions: conditions
                .iter()
                .map(|&(dimension, level)| TermCondition {
                    dimension: dimension.to_string(),
                    level: level.to_string(),
                })
                .collect(),
            predictor,
        }
    }
}

/// The capability the engine needs from a fitted model: evaluate the linear
/// predictor of draw `row` for grouping key `key` at predictor value `x`.
///
/// Implementations must be immutable for the duration of an analysis; the engine
/// evaluates draws concurrently.
pub trait LinearPredictor: Sync {
    /// Identifies the fit, so results of different fits are never combined.
    fn model_id(&self) -> &str;
    fn design(&self) -> &Design;
    /// Draw ids in row order.
    fn draw_ids(&self) -> &[DrawId];
    fn eval(&self, row: usize, key: &GroupingKey, x: f64) -> f64;
}

#[derive(Debug, Clone)]
struct CompiledTerm {
    /// `(dimension index, level)` pairs that must all match.
    conditions: Vec<(usize, String)>,
    anchor: bool,
}

impl CompiledTerm {
    #[inline]
    fn applies_to(&self, key: &GroupingKey) -> bool {
        self.conditions
            .iter()
            .all(|(dim, level)| key.levels()[*dim] == *level)
    }
}

/// Posterior draws of a term-structured linear predictor, one row per draw.
#[derive(Debug, Clone)]
pub struct PosteriorDraws {
    model_id: String,
    design: Design,
    terms: Vec<ModelTerm>,
    compiled: Vec<CompiledTerm>,
    draw_ids: Vec<DrawId>,
    coefficients: Array2<f64>,
}

impl PosteriorDraws {
    /// Validates the terms against the design and the coefficient matrix shape
    /// (`draws × terms`).
    pub fn new(
        model_id: impl Into<String>,
        design: Design,
        terms: Vec<ModelTerm>,
        draw_ids: Vec<DrawId>,
        coefficients: Array2<f64>,
    ) -> Result<Self, DrawError> {
        if coefficients.nrows() != draw_ids.len() || coefficients.ncols() != terms.len() {
            return Err(DrawError::ShapeMismatch {
                rows: coefficients.nrows(),
                cols: coefficients.ncols(),
                draws: draw_ids.len(),
                terms: terms.len(),
            });
        }
        let mut seen = AHashSet::with_capacity(draw_ids.len());
        for &id in &draw_ids {
            if !seen.insert(id) {
                return Err(DrawError::DuplicateDraw(id));
            }
        }
        for (row, &id) in coefficients.rows().into_iter().zip(&draw_ids) {
            if let Some((col, &value)) = row.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                return Err(DrawError::NonFiniteCoefficient {
                    draw: id,
                    term: terms[col].name.clone(),
                    value,
                });
            }
        }

        let compiled = terms
            .iter()
            .map(|term| compile_term(&design, term))
            .collect::<Result<Vec<_>, _>>()?;

        let model_id = model_id.into();
        log::debug!(
            "Posterior '{}': {} draws, {} terms, {} grouping cells",
            model_id,
            draw_ids.len(),
            terms.len(),
            design.keys().len()
        );
        Ok(PosteriorDraws {
            model_id,
            design,
            terms,
            compiled,
            draw_ids,
            coefficients,
        })
    }

    pub fn terms(&self) -> &[ModelTerm] {
        &self.terms
    }

    pub fn coefficients(&self) -> &Array2<f64> {
        &self.coefficients
    }

    /// Coefficients of one draw.
    pub fn draw(&self, row: usize) -> ArrayView1<'_, f64> {
        self.coefficients.row(row)
    }
}

fn compile_term(design: &Design, term: &ModelTerm) -> Result<CompiledTerm, DrawError> {
    let conditions = term
        .conditions
        .iter()
        .map(|c| {
            let dim = design
                .index_of(&c.dimension)
                .ok_or_else(|| DrawError::UnknownDimension {
                    term: term.name.clone(),
                    dimension: c.dimension.clone(),
                })?;
            if !design.dimensions()[dim].levels.contains(&c.level) {
                return Err(DrawError::UnknownLevel {
                    term: term.name.clone(),
                    dimension: c.dimension.clone(),
                    level: c.level.clone(),
                });
            }
            Ok((dim, c.level.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CompiledTerm {
        conditions,
        anchor: term.predictor == TermPredictor::Anchor,
    })
}

impl LinearPredictor for PosteriorDraws {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn design(&self) -> &Design {
        &self.design
    }

    fn draw_ids(&self) -> &[DrawId] {
        &self.draw_ids
    }

    fn eval(&self, row: usize, key: &GroupingKey, x: f64) -> f64 {
        self.compiled
            .iter()
            .zip(self.coefficients.row(row))
            .filter(|(term, _)| term.applies_to(key))
            .map(|(term, &beta)| if term.anchor { beta * x } else { beta })
            .sum()
    }
}
