//! # Marginalization and Summaries
//!
//! Averages per-draw quantities over grouping dimensions that are not of
//! interest, then summarizes each remaining grouping cell across draws with a
//! point estimate and equal-tailed credible intervals.
//!
//! Marginalization happens within each draw before any summary is taken, so the
//! marginal posterior keeps the joint structure of the draws.

use super::table::DrawTable;
use super::{DrawError, GroupingKey};
use ahash::AHashMap;
use ndarray::parallel::prelude::*;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarginalError {
    #[error("Cannot retain unknown grouping dimension '{0}'.")]
    UnknownDimension(String),

    #[error("Grouping dimension '{0}' is retained more than once.")]
    DuplicateDimension(String),

    #[error("No weight given for {0}.")]
    MissingWeight(String),

    #[error("Weight for {what} must be finite and non-negative, got {value}.")]
    InvalidWeight { what: String, value: f64 },

    #[error("The weights of marginal cell {0} sum to zero.")]
    ZeroWeight(GroupingKey),

    #[error("Credible interval coverage must lie strictly between 0 and 1, got {0}.")]
    InvalidCoverage(f64),

    #[error(transparent)]
    Draw(#[from] DrawError),
}

/// How the cells that collapse into one marginal cell are weighted.
#[derive(Debug, Clone, Default)]
pub enum Weighting {
    /// Every contributing cell counts equally.
    #[default]
    Equal,
    /// One weight per level of a dropped dimension; a cell's weight is the
    /// product over its dropped dimensions. Dimensions without an entry weigh
    /// their levels equally.
    Levels(BTreeMap<String, BTreeMap<String, f64>>),
    /// One weight per full grouping key, for example observed cell counts.
    Cells(AHashMap<GroupingKey, f64>),
}

fn check_weight(what: impl FnOnce() -> String, value: f64) -> Result<f64, MarginalError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(MarginalError::InvalidWeight {
            what: what(),
            value,
        })
    }
}

impl Weighting {
    fn weight_of(
        &self,
        table: &DrawTable,
        key: &GroupingKey,
        dropped: &[usize],
    ) -> Result<f64, MarginalError> {
        match self {
            Weighting::Equal => Ok(1.0),
            Weighting::Levels(levels) => {
                let dims = table.design().dimensions();
                let mut w = 1.0;
                for &d in dropped {
                    let name = &dims[d].name;
                    let Some(per_level) = levels.get(name) else {
                        continue;
                    };
                    let level = &key.levels()[d];
                    let value = per_level.get(level).copied().ok_or_else(|| {
                        MarginalError::MissingWeight(format!("level '{level}' of '{name}'"))
                    })?;
                    w *= check_weight(|| format!("level '{level}' of '{name}'"), value)?;
                }
                Ok(w)
            }
            Weighting::Cells(cells) => {
                let value = cells
                    .get(key)
                    .copied()
                    .ok_or_else(|| MarginalError::MissingWeight(format!("cell {key}")))?;
                check_weight(|| format!("cell {key}"), value)
            }
        }
    }
}

/// Averages `table` over every dimension not named in `retain`, per draw.
///
/// The result is keyed by the retained dimensions in the order given. A marginal
/// cell fed by a single source cell copies it unchanged. A marginal cell is
/// undefined for a draw if any of its contributing cells is undefined there.
pub fn marginalize(
    table: &DrawTable,
    retain: &[&str],
    weighting: &Weighting,
) -> Result<DrawTable, MarginalError> {
    let design = table.design();
    let mut retained = Vec::with_capacity(retain.len());
    for &name in retain {
        let idx = design
            .index_of(name)
            .ok_or_else(|| MarginalError::UnknownDimension(name.to_string()))?;
        if retained.contains(&idx) {
            return Err(MarginalError::DuplicateDimension(name.to_string()));
        }
        retained.push(idx);
    }
    let dropped: Vec<usize> = (0..design.dimensions().len())
        .filter(|d| !retained.contains(d))
        .collect();

    let projected = design.project(&retained);
    let out_keys = projected.keys();
    let out_index: AHashMap<&GroupingKey, usize> =
        out_keys.iter().enumerate().map(|(i, k)| (k, i)).collect();

    // (source column, weight) per marginal cell
    let mut groups: Vec<Vec<(usize, f64)>> = vec![Vec::new(); out_keys.len()];
    for (col, key) in table.keys().iter().enumerate() {
        let sub = GroupingKey(retained.iter().map(|&d| key.levels()[d].clone()).collect());
        let Some(&group) = out_index.get(&sub) else {
            continue;
        };
        let w = weighting.weight_of(table, key, &dropped)?;
        groups[group].push((col, w));
    }
    let (out_keys, groups): (Vec<GroupingKey>, Vec<Vec<(usize, f64)>>) = out_keys
        .iter()
        .cloned()
        .zip(groups)
        .filter(|(_, g)| !g.is_empty())
        .unzip();
    for (key, group) in out_keys.iter().zip(&groups) {
        let total: f64 = group.iter().map(|&(_, w)| w).sum();
        if group.len() > 1 && total <= 0.0 {
            return Err(MarginalError::ZeroWeight(key.clone()));
        }
    }

    log::debug!(
        "Marginalizing {} cells onto {} cells over dimensions {:?}",
        table.keys().len(),
        out_keys.len(),
        dropped
            .iter()
            .map(|&d| design.dimensions()[d].name.as_str())
            .collect::<Vec<_>>()
    );

    let source = table.values();
    let mut values = Array2::from_elem((table.n_draws(), out_keys.len()), None);
    values
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(row, mut out)| {
            for (col, group) in groups.iter().enumerate() {
                out[col] = marginal_cell(source, row, group);
            }
        });

    Ok(DrawTable::new(
        table.model_id(),
        projected,
        table.draw_ids().to_vec(),
        out_keys,
        values,
    )?)
}

fn marginal_cell(
    source: &Array2<Option<f64>>,
    row: usize,
    group: &[(usize, f64)],
) -> Option<f64> {
    if let [(col, _)] = group {
        return source[[row, *col]];
    }
    let mut sum = 0.0;
    let mut total = 0.0;
    for &(col, w) in group {
        // zero-weight cells are skipped, even when undefined
        if w == 0.0 {
            continue;
        }
        sum += w * source[[row, col]]?;
        total += w;
    }
    Some(sum / total)
}

/// Which point estimate summarizes the draws of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointEstimate {
    #[default]
    Median,
    Mean,
}

/// The `[summary]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub coverages: Vec<f64>,
    pub point: PointEstimate,
}

impl Default for SummarySettings {
    fn default() -> Self {
        SummarySettings {
            coverages: vec![0.5, 0.8, 0.95],
            point: PointEstimate::Median,
        }
    }
}

impl SummarySettings {
    pub fn validate(&self) -> Result<(), MarginalError> {
        for &c in &self.coverages {
            check_coverage(c)?;
        }
        Ok(())
    }
}

fn check_coverage(c: f64) -> Result<(), MarginalError> {
    if c > 0.0 && c < 1.0 {
        Ok(())
    } else {
        Err(MarginalError::InvalidCoverage(c))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CredibleInterval {
    pub coverage: f64,
    pub lower: f64,
    pub upper: f64,
}

impl CredibleInterval {
    pub fn contains(&self, other: &CredibleInterval) -> bool {
        self.lower <= other.lower && other.upper <= self.upper
    }
}

/// Summary of one grouping cell across draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginalEstimate {
    pub key: GroupingKey,
    pub point: f64,
    /// In the order the coverages were requested.
    pub intervals: Vec<CredibleInterval>,
    pub n_draws: usize,
    /// Draws where the cell was undefined.
    pub n_excluded: usize,
}

/// Linear-interpolation empirical quantile (Hyndman and Fan type 7) of
/// ascending `sorted`, which must not be empty.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Point estimate and equal-tailed intervals for every cell of `table`.
///
/// Undefined draws are excluded per cell; a cell with no defined draw is
/// omitted from the result.
pub fn summarize(
    table: &DrawTable,
    coverages: &[f64],
    point: PointEstimate,
) -> Result<Vec<MarginalEstimate>, MarginalError> {
    for &c in coverages {
        check_coverage(c)?;
    }
    let estimates: Vec<Option<MarginalEstimate>> = table
        .keys()
        .par_iter()
        .map(|key| {
            let mut draws = table.defined_draws(key);
            if draws.is_empty() {
                return None;
            }
            draws.sort_by(f64::total_cmp);
            let point = match point {
                PointEstimate::Median => quantile_sorted(&draws, 0.5),
                PointEstimate::Mean => draws.iter().sum::<f64>() / draws.len() as f64,
            };
            let intervals = coverages
                .iter()
                .map(|&coverage| CredibleInterval {
                    coverage,
                    lower: quantile_sorted(&draws, (1.0 - coverage) / 2.0),
                    upper: quantile_sorted(&draws, (1.0 + coverage) / 2.0),
                })
                .collect();
            Some(MarginalEstimate {
                key: key.clone(),
                point,
                intervals,
                n_draws: draws.len(),
                n_excluded: table.n_draws() - draws.len(),
            })
        })
        .collect();

    let mut out = Vec::with_capacity(estimates.len());
    for (key, estimate) in table.keys().iter().zip(estimates) {
        match estimate {
            Some(e) => out.push(e),
            None => log::warn!("Cell {key} has no defined draws and is omitted from the summary."),
        }
    }
    Ok(out)
}
