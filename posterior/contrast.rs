//! Per-draw slopes, intercepts, PSE and JND.
//!
//! For a linear-log-odds fit with linear predictor `η(x)` per grouping key, the
//! slope is the change in `η` between two anchor values of the predictor and the
//! intercept is `η` at the intercept anchor. From those:
//!
//! - `PSE = −intercept / slope`, the predictor value at which `η = 0`;
//! - `JND = logit(0.75) / slope`, the predictor change that moves the response
//!   probability from 0.5 to 0.75.
//!
//! Both are undefined for a draw whose slope is exactly zero. Such cells are left
//! empty and reported as [`DrawError::UndefinedStatistic`] records.

use super::design::LinearPredictor;
use super::table::DrawTable;
use super::{DrawError, GroupingKey, Statistic};
use ndarray::Axis;
use ndarray::parallel::prelude::*;
use serde::{Deserialize, Serialize};

/// `logit(0.75) = ln 3`.
pub const LOGIT_THREE_QUARTERS: f64 = 1.098_612_288_668_109_8;

/// Predictor values at which the linear predictor is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Anchors {
    pub low: f64,
    pub high: f64,
    pub intercept_at: f64,
}

impl Default for Anchors {
    fn default() -> Self {
        Anchors {
            low: 0.0,
            high: 1.0,
            intercept_at: 0.0,
        }
    }
}

impl Anchors {
    pub fn validate(&self) -> Result<(), DrawError> {
        let finite = self.low.is_finite() && self.high.is_finite() && self.intercept_at.is_finite();
        if !finite || self.low == self.high {
            return Err(DrawError::InvalidAnchors {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

/// Evaluates `cell(row, key)` for every draw and every key of the fit's design,
/// parallel over draws.
fn evaluate_cells<P, F>(fit: &P, cell: F) -> Result<DrawTable, DrawError>
where
    P: LinearPredictor + ?Sized,
    F: Fn(usize, &GroupingKey) -> f64 + Sync,
{
    let keys = fit.design().keys();
    let mut values = ndarray::Array2::from_elem((fit.draw_ids().len(), keys.len()), None);
    values
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(row, mut out)| {
            for (col, key) in keys.iter().enumerate() {
                out[col] = Some(cell(row, key));
            }
        });
    DrawTable::new(
        fit.model_id(),
        fit.design().clone(),
        fit.draw_ids().to_vec(),
        keys,
        values,
    )
}

/// `(η(high) − η(low)) / (high − low)` per draw and grouping key.
pub fn slopes<P: LinearPredictor + ?Sized>(fit: &P, anchors: &Anchors) -> Result<DrawTable, DrawError> {
    anchors.validate()?;
    let run = anchors.high - anchors.low;
    evaluate_cells(fit, |row, key| {
        (fit.eval(row, key, anchors.high) - fit.eval(row, key, anchors.low)) / run
    })
}

/// `η(intercept_at)` per draw and grouping key.
pub fn intercepts<P: LinearPredictor + ?Sized>(
    fit: &P,
    anchors: &Anchors,
) -> Result<DrawTable, DrawError> {
    anchors.validate()?;
    evaluate_cells(fit, |row, key| fit.eval(row, key, anchors.intercept_at))
}

#[inline]
pub fn pse(intercept: f64, slope: f64) -> Option<f64> {
    (slope != 0.0).then(|| -intercept / slope)
}

#[inline]
pub fn jnd(slope: f64) -> Option<f64> {
    (slope != 0.0).then(|| LOGIT_THREE_QUARTERS / slope)
}

/// PSE and JND tables plus the cells where they are undefined.
#[derive(Debug, Clone)]
pub struct DerivedStatistics {
    pub pse: DrawTable,
    pub jnd: DrawTable,
    /// One [`DrawError::UndefinedStatistic`] per empty cell and statistic.
    pub undefined: Vec<DrawError>,
}

/// Derives PSE and JND from aligned intercept and slope tables.
///
/// Alignment (fit, draw ids, grouping keys) is checked before any value is
/// computed, so a mismatch never yields a partial result.
pub fn derive_statistics(
    intercepts: &DrawTable,
    slopes: &DrawTable,
) -> Result<DerivedStatistics, DrawError> {
    intercepts.check_aligned(slopes)?;

    let pse_table = intercepts.zip_with(slopes, |_, _, a, b| pse(a, b))?;
    let jnd_table = slopes.with_values(slopes.values().mapv(|v| v.and_then(jnd)));

    let mut undefined = Vec::new();
    for (draw, key, value) in slopes.rows() {
        if value == Some(0.0) {
            for statistic in [Statistic::Pse, Statistic::Jnd] {
                undefined.push(DrawError::UndefinedStatistic {
                    statistic,
                    draw,
                    key: key.clone(),
                });
            }
        }
    }
    if !undefined.is_empty() {
        log::warn!(
            "{} draw cells of fit '{}' have a zero slope; their PSE and JND are excluded.",
            undefined.len() / 2,
            slopes.model_id()
        );
    }

    Ok(DerivedStatistics {
        pse: pse_table,
        jnd: jnd_table,
        undefined,
    })
}

/// All per-draw quantities of one fit.
#[derive(Debug, Clone)]
pub struct DrawStatistics {
    pub slope: DrawTable,
    pub intercept: DrawTable,
    pub pse: DrawTable,
    pub jnd: DrawTable,
    pub undefined: Vec<DrawError>,
}

pub fn analyze<P: LinearPredictor + ?Sized>(
    fit: &P,
    anchors: &Anchors,
) -> Result<DrawStatistics, DrawError> {
    log::info!(
        "Computing per-draw statistics for fit '{}' ({} draws, {} grouping cells).",
        fit.model_id(),
        fit.draw_ids().len(),
        fit.design().keys().len()
    );
    let slope = slopes(fit, anchors)?;
    let intercept = intercepts(fit, anchors)?;
    let DerivedStatistics { pse, jnd, undefined } = derive_statistics(&intercept, &slope)?;
    Ok(DrawStatistics {
        slope,
        intercept,
        pse,
        jnd,
        undefined,
    })
}
