//! # Heuristic Estimators
//!
//! Each heuristic maps what a participant could read off a chart to an estimated
//! probability of superiority, in percent. The sign convention is shared by all of
//! them: `mean_diff` is the reference group minus the comparison group, so a
//! positive difference pushes the estimate below 50.
//!
//! Each estimator documents the domain on which its result lies in [0, 100].
//! Outside that domain the formula is applied as written and the value passes
//! through unclamped: a reading that falls off the scale is kept as such for the
//! mixture model to score. The only failure mode is
//! [`HeuristicError::DegenerateInput`], raised where a divisor that defines the
//! scale of the judgment is not positive (no discrimination is possible) instead
//! of letting a NaN leak into the mixture model.

use crate::types::{HeuristicId, StimulusFeatures, VisCondition};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HeuristicError {
    #[error("Degenerate input for heuristic '{heuristic}': {reason}")]
    DegenerateInput {
        heuristic: HeuristicId,
        reason: String,
    },

    #[error("Heuristic '{0}' needs the paired-draw differences, but the stimulus has none.")]
    MissingDraws(HeuristicId),
}

fn degenerate(heuristic: HeuristicId, reason: impl Into<String>) -> HeuristicError {
    HeuristicError::DegenerateInput {
        heuristic,
        reason: reason.into(),
    }
}

/// Corpus-level constants that fix the scale of several heuristics. They are
/// computed once over the whole stimulus set and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StimulusScale {
    /// Largest absolute mean difference across the stimulus set.
    pub max_abs_mean_diff: f64,
    /// Width of the visible chart axis.
    pub axis_range: f64,
    /// Number of leading draws a participant is assumed to attend to, if limited.
    pub outcome_prefix: Option<usize>,
}

impl Default for StimulusScale {
    fn default() -> Self {
        StimulusScale {
            max_abs_mean_diff: 1.0,
            axis_range: 1.0,
            outcome_prefix: None,
        }
    }
}

/// Width of the central 95% interval of one group under a Normal model:
/// `Φ⁻¹(0.975)·σ − Φ⁻¹(0.025)·σ`.
pub fn interval_length(sd: f64) -> Result<f64, HeuristicError> {
    let normal = Normal::new(0.0, sd).map_err(|e| {
        degenerate(
            HeuristicId::MeansFirstInterval,
            format!("standard deviation {sd} does not define a Normal: {e}"),
        )
    })?;
    Ok(normal.inverse_cdf(0.975) - normal.inverse_cdf(0.025))
}

/// `50 − 50·Δ / max|Δ|`.
///
/// In [0, 100] when `|Δ| ≤ max|Δ|`, which holds for every stimulus the maximum
/// was taken over.
pub fn relative_mean_difference(mean_diff: f64, max_abs_mean_diff: f64) -> Result<f64, HeuristicError> {
    if max_abs_mean_diff == 0.0 {
        return Err(degenerate(
            HeuristicId::RelativeMeanDifference,
            "the largest absolute mean difference in the stimulus set is 0",
        ));
    }
    Ok(50.0 - 50.0 * mean_diff / max_abs_mean_diff)
}

/// `50 − 50·Δ / axisRange`.
///
/// In [0, 100] when `|Δ| ≤ axisRange`.
pub fn mean_difference_vs_axis(mean_diff: f64, axis_range: f64) -> Result<f64, HeuristicError> {
    if !(axis_range > 0.0) {
        return Err(degenerate(
            HeuristicId::MeanDifferenceVsAxis,
            format!("axis range must be positive, got {axis_range}"),
        ));
    }
    Ok(50.0 - 50.0 * mean_diff / axis_range)
}

/// Means first, then uncertainty, reading the uncertainty off interval marks:
/// `50 − 50·Δ / intervalLength / 2`.
///
/// In [0, 100] when `|Δ| ≤ 2·intervalLength`.
pub fn means_first_interval(mean_diff: f64, interval_length: f64) -> Result<f64, HeuristicError> {
    if !(interval_length > 0.0) {
        return Err(degenerate(
            HeuristicId::MeansFirstInterval,
            format!("interval length must be positive, got {interval_length}"),
        ));
    }
    Ok(50.0 - 50.0 * mean_diff / interval_length / 2.0)
}

/// Length of the intersection of two equal-length intervals whose centres sit at
/// `∓Δ/2` around a common centre.
pub fn interval_overlap(mean_diff: f64, interval_length: f64) -> f64 {
    let half = interval_length / 2.0;
    let reference_mean = mean_diff / 2.0;
    let comparison_mean = -mean_diff / 2.0;
    let lower = (reference_mean - half).max(comparison_mean - half);
    let upper = (reference_mean + half).min(comparison_mean + half);
    (upper - lower).max(0.0)
}

/// Overlap-based estimate. When the reference group is ahead (`Δ > 0`) the
/// estimate is the overlap share scaled into [0, 50]; otherwise it is mirrored into
/// [50, 100]. The branch encodes which group is ahead, the overlap only how far.
/// In [0, 100] whenever the overlap does not exceed `scale`.
fn overlap_estimate(mean_diff: f64, overlap: f64, scale: f64) -> f64 {
    if mean_diff > 0.0 {
        50.0 * overlap / scale
    } else {
        100.0 - 50.0 * overlap / scale
    }
}

/// Overlap of the two intervals relative to their length. Always in [0, 100].
pub fn interval_overlap_estimate(mean_diff: f64, interval_length: f64) -> Result<f64, HeuristicError> {
    if !(interval_length > 0.0) {
        return Err(degenerate(
            HeuristicId::IntervalOverlap,
            format!("interval length must be positive, got {interval_length}"),
        ));
    }
    let overlap = interval_overlap(mean_diff, interval_length);
    Ok(overlap_estimate(mean_diff, overlap, interval_length))
}

/// Overlap of the two intervals relative to the chart axis.
///
/// In [0, 100] when `intervalLength ≤ axisRange`, that is when an interval fits on
/// the axis.
pub fn interval_overlap_vs_axis(
    mean_diff: f64,
    interval_length: f64,
    axis_range: f64,
) -> Result<f64, HeuristicError> {
    if !(axis_range > 0.0) {
        return Err(degenerate(
            HeuristicId::IntervalOverlapVsAxis,
            format!("axis range must be positive, got {axis_range}"),
        ));
    }
    if !(interval_length > 0.0) {
        return Err(degenerate(
            HeuristicId::IntervalOverlapVsAxis,
            format!("interval length must be positive, got {interval_length}"),
        ));
    }
    let overlap = interval_overlap(mean_diff, interval_length);
    Ok(overlap_estimate(mean_diff, overlap, axis_range))
}

/// Share of paired draws in which the comparison group came out ahead.
/// Truncation to a prefix of the draws is the caller's job. Always in [0, 100].
pub fn outcome_proportion(draw_diffs: &[f64]) -> Result<f64, HeuristicError> {
    if draw_diffs.is_empty() {
        return Err(degenerate(HeuristicId::OutcomeProportion, "no draws to count"));
    }
    let behind = draw_diffs.iter().filter(|&&d| d < 0.0).count();
    Ok(100.0 * behind as f64 / draw_diffs.len() as f64)
}

/// Means first, then uncertainty, estimated from the draws themselves. The spread
/// is `sqrt(span² / 2)` with `span = max − min`.
///
/// In [0, 100] when `|mean(d)| ≤ 2·spread`. Draws that all sit far to one side
/// of zero relative to their span fall outside it; `[2.0, 2.5, 3.0]` reads as
/// roughly −38.
pub fn means_first_draws(draw_diffs: &[f64]) -> Result<f64, HeuristicError> {
    if draw_diffs.is_empty() {
        return Err(degenerate(HeuristicId::MeansFirstDraws, "no draws to average"));
    }
    let n = draw_diffs.len() as f64;
    let mean_diff = draw_diffs.iter().sum::<f64>() / n;
    let (min, max) = draw_diffs
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &d| {
            (lo.min(d), hi.max(d))
        });
    let span = max - min;
    let spread = (span * span / 2.0).sqrt();
    if !(spread > 0.0) {
        return Err(degenerate(
            HeuristicId::MeansFirstDraws,
            "all draws are identical, so their spread is 0",
        ));
    }
    Ok(50.0 - 50.0 * mean_diff / spread / 2.0)
}

fn draws_for<'f>(
    heuristic: HeuristicId,
    features: &'f StimulusFeatures,
    scale: &StimulusScale,
) -> Result<&'f [f64], HeuristicError> {
    let draws = features
        .draw_diffs
        .as_deref()
        .ok_or(HeuristicError::MissingDraws(heuristic))?;
    Ok(match scale.outcome_prefix {
        Some(n) => &draws[..n.min(draws.len())],
        None => draws,
    })
}

/// Evaluates one heuristic on one stimulus.
pub fn estimate(
    heuristic: HeuristicId,
    features: &StimulusFeatures,
    scale: &StimulusScale,
) -> Result<f64, HeuristicError> {
    let delta = features.mean_diff;
    match heuristic {
        HeuristicId::RelativeMeanDifference => relative_mean_difference(delta, scale.max_abs_mean_diff),
        HeuristicId::MeanDifferenceVsAxis => mean_difference_vs_axis(delta, scale.axis_range),
        HeuristicId::MeansFirstInterval => means_first_interval(delta, interval_length(features.sd)?),
        HeuristicId::IntervalOverlap => {
            interval_overlap_estimate(delta, interval_length(features.sd)?)
        }
        HeuristicId::IntervalOverlapVsAxis => {
            interval_overlap_vs_axis(delta, interval_length(features.sd)?, scale.axis_range)
        }
        HeuristicId::OutcomeProportion => outcome_proportion(draws_for(heuristic, features, scale)?),
        HeuristicId::MeansFirstDraws => means_first_draws(draws_for(heuristic, features, scale)?),
    }
}

/// Evaluates every heuristic admissible under `vis`, in `HeuristicId::ALL` order.
pub fn estimate_all(
    features: &StimulusFeatures,
    scale: &StimulusScale,
    vis: VisCondition,
) -> Result<Vec<(HeuristicId, f64)>, HeuristicError> {
    vis.admissible()
        .into_iter()
        .map(|h| estimate(h, features, scale).map(|value| (h, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interval_length_is_two_times_1_96_sigma() {
        assert_relative_eq!(interval_length(1.0).unwrap(), 3.919927969, epsilon = 1e-6);
        assert_relative_eq!(interval_length(2.5).unwrap(), 2.5 * 3.919927969, epsilon = 1e-6);
        assert!(interval_length(0.0).is_err());
    }

    #[test]
    fn relative_mean_difference_spans_the_range() {
        assert_relative_eq!(relative_mean_difference(2.0, 2.0).unwrap(), 0.0);
        assert_relative_eq!(relative_mean_difference(-2.0, 2.0).unwrap(), 100.0);
        assert_relative_eq!(relative_mean_difference(0.0, 2.0).unwrap(), 50.0);
        assert!(matches!(
            relative_mean_difference(1.0, 0.0),
            Err(HeuristicError::DegenerateInput {
                heuristic: HeuristicId::RelativeMeanDifference,
                ..
            })
        ));
    }

    #[test]
    fn means_first_interval_halves_the_ratio() {
        assert_relative_eq!(means_first_interval(1.0, 4.0).unwrap(), 50.0 - 6.25);
    }

    #[test]
    fn overlap_of_disjoint_and_identical_intervals() {
        assert_relative_eq!(interval_overlap(0.0, 3.0), 3.0);
        assert_relative_eq!(interval_overlap(1.0, 3.0), 2.0);
        assert_relative_eq!(interval_overlap(-1.0, 3.0), 2.0);
        assert_eq!(interval_overlap(5.0, 3.0), 0.0);
    }

    #[test]
    fn overlap_branches_split_the_range() {
        // Reference ahead: [0, 50]; comparison ahead or tied: [50, 100].
        assert_relative_eq!(interval_overlap_estimate(1.0, 4.0).unwrap(), 50.0 * 3.0 / 4.0);
        assert_relative_eq!(interval_overlap_estimate(-1.0, 4.0).unwrap(), 100.0 - 50.0 * 3.0 / 4.0);
        assert_relative_eq!(interval_overlap_estimate(0.0, 4.0).unwrap(), 50.0);
        assert_eq!(interval_overlap_estimate(10.0, 4.0).unwrap(), 0.0);
        assert_eq!(interval_overlap_estimate(-10.0, 4.0).unwrap(), 100.0);
    }

    #[test]
    fn overlap_vs_axis_uses_the_axis_as_scale() {
        assert_relative_eq!(interval_overlap_vs_axis(1.0, 4.0, 10.0).unwrap(), 50.0 * 3.0 / 10.0);
        assert_relative_eq!(
            interval_overlap_vs_axis(-1.0, 4.0, 10.0).unwrap(),
            100.0 - 50.0 * 3.0 / 10.0
        );
    }

    #[test]
    fn overlap_vs_axis_rejects_a_non_positive_interval() {
        for length in [0.0, -1.0] {
            assert!(matches!(
                interval_overlap_vs_axis(1.0, length, 10.0),
                Err(HeuristicError::DegenerateInput {
                    heuristic: HeuristicId::IntervalOverlapVsAxis,
                    ..
                })
            ));
        }
    }

    #[test]
    fn outcome_proportion_counts_negative_differences() {
        let diffs = [-1.0, 2.0, -0.5, 0.0];
        assert_relative_eq!(outcome_proportion(&diffs).unwrap(), 50.0);
        assert_relative_eq!(outcome_proportion(&diffs[..1]).unwrap(), 100.0);
        assert!(outcome_proportion(&[]).is_err());
    }

    #[test]
    fn means_first_draws_uses_span_based_spread() {
        let diffs = [1.0, 3.0];
        // mean 2, span 2, spread sqrt(2)
        let expected = 50.0 - 50.0 * 2.0 / 2f64.sqrt() / 2.0;
        assert_relative_eq!(means_first_draws(&diffs).unwrap(), expected, epsilon = 1e-12);
        assert!(means_first_draws(&[1.0, 1.0]).is_err());
    }

    #[test]
    fn one_signed_draws_inside_the_domain_stay_in_range() {
        // mean 1.05, spread 1.9/√2: within 2·spread
        let value = means_first_draws(&[0.1, 2.0]).unwrap();
        let spread = 1.9 / 2f64.sqrt();
        assert_relative_eq!(value, 50.0 - 50.0 * 1.05 / spread / 2.0, epsilon = 1e-12);
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn out_of_domain_readings_pass_through_unclamped() {
        // mean 2.5, spread √0.5: the mean is more than twice the spread
        let value = means_first_draws(&[2.0, 2.5, 3.0]).unwrap();
        assert_relative_eq!(value, 50.0 - 50.0 * 2.5 / 0.5f64.sqrt() / 2.0, epsilon = 1e-12);
        assert_relative_eq!(value, -38.388_347_648_318_44, epsilon = 1e-9);
        assert_relative_eq!(means_first_draws(&[-3.0, -2.5, -2.0]).unwrap(), 100.0 - value, epsilon = 1e-9);

        assert_relative_eq!(relative_mean_difference(3.0, 2.0).unwrap(), -25.0);
        assert_relative_eq!(means_first_interval(-10.0, 2.0).unwrap(), 175.0);
    }

    #[test]
    fn dispatch_honours_the_outcome_prefix() {
        let features = StimulusFeatures {
            mean_diff: 0.5,
            sd: 1.0,
            draw_diffs: Some(vec![-1.0, -1.0, 1.0, 1.0]),
        };
        let full = StimulusScale::default();
        let prefix = StimulusScale {
            outcome_prefix: Some(2),
            ..StimulusScale::default()
        };
        assert_relative_eq!(estimate(HeuristicId::OutcomeProportion, &features, &full).unwrap(), 50.0);
        assert_relative_eq!(estimate(HeuristicId::OutcomeProportion, &features, &prefix).unwrap(), 100.0);
    }

    #[test]
    fn missing_draws_are_reported() {
        let features = StimulusFeatures {
            mean_diff: 0.5,
            sd: 1.0,
            draw_diffs: None,
        };
        assert_eq!(
            estimate(HeuristicId::MeansFirstDraws, &features, &StimulusScale::default()),
            Err(HeuristicError::MissingDraws(HeuristicId::MeansFirstDraws))
        );
        let for_intervals =
            estimate_all(&features, &StimulusScale::default(), VisCondition::Intervals).unwrap();
        assert_eq!(for_intervals.len(), 5);
    }
}
