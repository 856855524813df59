//! # Posterior Draw Engine
//!
//! Turns posterior draws of a linear-log-odds model into per-draw psychophysical
//! quantities and summarizes them. The pipeline is:
//!
//! 1. [`design`]: the grouping dimensions of the fitted design and the
//!    [`design::LinearPredictor`] capability the engine needs from a fit.
//! 2. [`contrast`]: slopes, intercepts, PSE and JND per `(draw, grouping key)`.
//! 3. [`marginal`]: weighted marginalization over grouping dimensions, then point
//!    estimates and credible intervals across draws.
//!
//! Every intermediate result is a [`table::DrawTable`], an arena keyed by draw id
//! and grouping key. Joins go through those keys, never through row positions, so
//! values from different draws (or different fits) cannot be combined by accident.

pub mod artifact;
pub mod contrast;
pub mod design;
pub mod marginal;
pub mod table;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifies one posterior draw within a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrawId(pub u32);

impl fmt::Display for DrawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One level per grouping dimension, in the order of the owning design.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupingKey(pub Vec<String>);

impl GroupingKey {
    pub fn new<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GroupingKey(levels.into_iter().map(Into::into).collect())
    }

    pub fn levels(&self) -> &[String] {
        &self.0
    }

    /// Key of a model without grouping dimensions.
    pub fn empty() -> Self {
        GroupingKey(Vec::new())
    }
}

impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("(all)")
        } else {
            f.write_str(&self.0.join(":"))
        }
    }
}

/// The derived statistics the engine can report as undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    Pse,
    Jnd,
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Statistic::Pse => "PSE",
            Statistic::Jnd => "JND",
        })
    }
}

/// A comprehensive error type for building and joining draw tables.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DrawError {
    #[error("Grouping dimension '{0}' appears more than once in the design.")]
    DuplicateDimension(String),

    #[error("Grouping dimension '{0}' has no levels.")]
    EmptyDimension(String),

    #[error("Level '{level}' appears more than once in dimension '{dimension}'.")]
    DuplicateLevel { dimension: String, level: String },

    #[error("Term '{term}' refers to unknown grouping dimension '{dimension}'.")]
    UnknownDimension { term: String, dimension: String },

    #[error("Term '{term}' refers to unknown level '{level}' of dimension '{dimension}'.")]
    UnknownLevel {
        term: String,
        dimension: String,
        level: String,
    },

    #[error("Coefficient matrix is {rows}x{cols}, but the fit has {draws} draws and {terms} terms.")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        draws: usize,
        terms: usize,
    },

    #[error("Draw id {0} appears more than once.")]
    DuplicateDraw(DrawId),

    #[error("Grouping key {key} does not belong to the design ({reason}).")]
    ForeignKey { key: GroupingKey, reason: String },

    #[error("Grouping key {0} appears more than once in the table.")]
    DuplicateKey(GroupingKey),

    #[error("Non-finite coefficient {value} for draw {draw}, term '{term}'.")]
    NonFiniteCoefficient {
        draw: DrawId,
        term: String,
        value: f64,
    },

    #[error("Anchors must be finite and distinct, got low = {low}, high = {high}.")]
    InvalidAnchors { low: f64, high: f64 },

    #[error("Draw alignment failed: {0}")]
    DrawAlignment(String),

    #[error("{statistic} is undefined for draw {draw} at {key}: the slope is exactly 0.")]
    UndefinedStatistic {
        statistic: Statistic,
        draw: DrawId,
        key: GroupingKey,
    },
}
