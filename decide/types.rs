//! # Shared Domain Types
//!
//! Identifiers for experimental cells, visualization conditions and heuristics.
//! Everything here is immutable once constructed; stimulus records are created by
//! the (external) stimulus generator and only read by the decision model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The visualization a participant saw on a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VisCondition {
    /// 95% interval bars around each group mean.
    #[serde(rename = "intervals")]
    Intervals,
    /// Hypothetical outcome plots: animated single draws per group.
    #[serde(rename = "HOPs")]
    Hops,
    /// Density curves.
    #[serde(rename = "densities")]
    Densities,
    /// Quantile dotplots.
    #[serde(rename = "QDPs")]
    Qdps,
}

impl VisCondition {
    pub const ALL: [VisCondition; 4] = [
        VisCondition::Intervals,
        VisCondition::Hops,
        VisCondition::Densities,
        VisCondition::Qdps,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VisCondition::Intervals => "intervals",
            VisCondition::Hops => "HOPs",
            VisCondition::Densities => "densities",
            VisCondition::Qdps => "QDPs",
        }
    }

    /// Whether the participant could see sampled outcomes rather than summary marks.
    pub fn shows_outcomes(self) -> bool {
        matches!(self, VisCondition::Hops)
    }

    /// Whether a heuristic can be applied to what this visualization shows.
    ///
    /// Mean-based strategies are available everywhere. Interval-based strategies need
    /// a visible spread mark, and the sampled-outcome strategies only make sense when
    /// individual draws are animated (HOPs).
    pub fn admits(self, heuristic: HeuristicId) -> bool {
        match heuristic.family() {
            HeuristicFamily::Means => true,
            HeuristicFamily::Intervals => !self.shows_outcomes(),
            HeuristicFamily::Outcomes => self.shows_outcomes(),
        }
    }

    /// The admissible heuristics for this condition, in `HeuristicId::ALL` order.
    pub fn admissible(self) -> Vec<HeuristicId> {
        HeuristicId::ALL
            .iter()
            .copied()
            .filter(|&h| self.admits(h))
            .collect()
    }
}

impl fmt::Display for VisCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} '{value}'. Expected one of: {expected}")]
pub struct ParseNameError {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

impl FromStr for VisCondition {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VisCondition::ALL
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseNameError {
                kind: "visualization condition",
                value: s.to_string(),
                expected: VisCondition::ALL.map(|v| v.as_str()).join(", "),
            })
    }
}

/// Broad strategy families, used to decide admissibility per visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicFamily {
    Means,
    Intervals,
    Outcomes,
}

/// Identifiers for the judgment strategies a participant might use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicId {
    RelativeMeanDifference,
    MeanDifferenceVsAxis,
    MeansFirstInterval,
    IntervalOverlap,
    IntervalOverlapVsAxis,
    OutcomeProportion,
    MeansFirstDraws,
}

impl HeuristicId {
    pub const ALL: [HeuristicId; 7] = [
        HeuristicId::RelativeMeanDifference,
        HeuristicId::MeanDifferenceVsAxis,
        HeuristicId::MeansFirstInterval,
        HeuristicId::IntervalOverlap,
        HeuristicId::IntervalOverlapVsAxis,
        HeuristicId::OutcomeProportion,
        HeuristicId::MeansFirstDraws,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HeuristicId::RelativeMeanDifference => "relative_mean_difference",
            HeuristicId::MeanDifferenceVsAxis => "mean_difference_vs_axis",
            HeuristicId::MeansFirstInterval => "means_first_interval",
            HeuristicId::IntervalOverlap => "interval_overlap",
            HeuristicId::IntervalOverlapVsAxis => "interval_overlap_vs_axis",
            HeuristicId::OutcomeProportion => "outcome_proportion",
            HeuristicId::MeansFirstDraws => "means_first_draws",
        }
    }

    pub fn family(self) -> HeuristicFamily {
        match self {
            HeuristicId::RelativeMeanDifference | HeuristicId::MeanDifferenceVsAxis => {
                HeuristicFamily::Means
            }
            HeuristicId::MeansFirstInterval
            | HeuristicId::IntervalOverlap
            | HeuristicId::IntervalOverlapVsAxis => HeuristicFamily::Intervals,
            HeuristicId::OutcomeProportion | HeuristicId::MeansFirstDraws => {
                HeuristicFamily::Outcomes
            }
        }
    }
}

impl fmt::Display for HeuristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeuristicId {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HeuristicId::ALL
            .iter()
            .copied()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| ParseNameError {
                kind: "heuristic",
                value: s.to_string(),
                expected: HeuristicId::ALL.map(|h| h.as_str()).join(", "),
            })
    }
}

/// One experimental cell. Created by the stimulus generator, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StimulusCondition {
    /// Magnitude category of the difference in means (e.g. "small", "large").
    pub mean_diff_level: String,
    /// Category of the difference in standard deviations.
    pub sd_diff_level: String,
    pub vis: VisCondition,
    pub trial: u32,
    /// Whether the trial began with the group means drawn on screen.
    pub start_means: bool,
}

/// The stimulus quantities a heuristic can read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusFeatures {
    /// Signed difference in means (reference group minus comparison group).
    pub mean_diff: f64,
    /// Standard deviation of a single group.
    pub sd: f64,
    /// Paired-draw differences shown to the participant, for sampled-outcome displays.
    #[serde(default)]
    pub draw_diffs: Option<Vec<f64>>,
}

/// A stimulus record: the cell it belongs to plus the features shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    pub condition: StimulusCondition,
    pub features: StimulusFeatures,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampled_outcome_heuristics_only_for_hops() {
        for vis in VisCondition::ALL {
            let allowed = vis.admits(HeuristicId::OutcomeProportion);
            assert_eq!(allowed, vis == VisCondition::Hops, "{vis}");
            assert_eq!(vis.admits(HeuristicId::MeansFirstDraws), allowed);
            assert!(vis.admits(HeuristicId::RelativeMeanDifference));
        }
        assert!(!VisCondition::Hops.admits(HeuristicId::IntervalOverlap));
        assert_eq!(VisCondition::Intervals.admissible().len(), 5);
        assert_eq!(VisCondition::Hops.admissible().len(), 4);
    }

    #[test]
    fn names_parse_back() {
        for vis in VisCondition::ALL {
            assert_eq!(vis.as_str().parse::<VisCondition>().unwrap(), vis);
        }
        assert_eq!("hops".parse::<VisCondition>().unwrap(), VisCondition::Hops);
        for h in HeuristicId::ALL {
            assert_eq!(h.as_str().parse::<HeuristicId>().unwrap(), h);
        }
        let err = "bars".parse::<VisCondition>().unwrap_err();
        assert!(err.to_string().contains("bars"));
    }
}
