//! # Tiered Tax Schedule
//!
//! Net winnings under a piecewise marginal-rate schedule. The rate attached to
//! boundary `t_i` applies to the part of the gross winnings that falls in
//! `(t_i, t_{i+1}]`, so a rate attached to an infinite boundary covers nothing and
//! a finite last boundary taxes everything above it at its own rate.
//!
//! The schedule is validated once at construction; evaluation is a pure,
//! allocation-free fold over the tiers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A comprehensive error type for tax schedule construction and evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaxError {
    #[error("A tax schedule needs at least one tier boundary.")]
    EmptySchedule,

    #[error("The first tier boundary must be 0, but was {0}.")]
    FirstBoundaryNotZero(f64),

    #[error("Tier boundaries must be strictly ascending: boundary {index} ({value}) does not exceed {previous}.")]
    BoundariesNotAscending {
        index: usize,
        value: f64,
        previous: f64,
    },

    #[error("Expected {boundaries} rates (or one fewer) for {boundaries} tier boundaries, got {rates}.")]
    RateCountMismatch { boundaries: usize, rates: usize },

    #[error("Marginal rate {index} is {value}; rates must lie in [0, 1).")]
    RateOutOfRange { index: usize, value: f64 },

    #[error("Marginal rates must be non-decreasing: rate {index} ({value}) is below {previous}.")]
    RatesDecreasing {
        index: usize,
        value: f64,
        previous: f64,
    },

    #[error("Gross winnings must be finite and non-negative, got {0}.")]
    InvalidWinnings(f64),
}

/// One tier of the schedule: everything above `lower` (up to the next tier) is
/// taxed at `rate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxTier {
    pub lower: f64,
    pub rate: f64,
}

/// A validated, ascending tiered tax schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedule", into = "RawSchedule")]
pub struct TaxSchedule {
    tiers: Vec<TaxTier>,
}

/// The on-disk form: parallel boundary and rate lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSchedule {
    boundaries: Vec<f64>,
    rates: Vec<f64>,
}

impl TryFrom<RawSchedule> for TaxSchedule {
    type Error = TaxError;

    fn try_from(raw: RawSchedule) -> Result<Self, Self::Error> {
        TaxSchedule::from_boundaries(&raw.boundaries, &raw.rates)
    }
}

impl From<TaxSchedule> for RawSchedule {
    fn from(schedule: TaxSchedule) -> Self {
        RawSchedule {
            boundaries: schedule.boundaries(),
            rates: schedule.tiers.iter().map(|t| t.rate).collect(),
        }
    }
}

impl TaxSchedule {
    /// Builds a schedule from ascending boundaries `t_0 = 0 < t_1 < …` and one rate
    /// per boundary.
    ///
    /// `rates` may also have one entry fewer than `boundaries`, in which case the
    /// last boundary must be `∞` and only closes the final tier.
    pub fn from_boundaries(boundaries: &[f64], rates: &[f64]) -> Result<Self, TaxError> {
        let first = *boundaries.first().ok_or(TaxError::EmptySchedule)?;
        if first != 0.0 {
            return Err(TaxError::FirstBoundaryNotZero(first));
        }
        for (index, pair) in boundaries.windows(2).enumerate() {
            // NaN fails this comparison as well
            if !(pair[1] > pair[0]) {
                return Err(TaxError::BoundariesNotAscending {
                    index: index + 1,
                    value: pair[1],
                    previous: pair[0],
                });
            }
        }

        let closes_with_infinity = boundaries.last().is_some_and(|b| b.is_infinite());
        let usable = if rates.len() == boundaries.len() {
            // A rate sitting on an infinite boundary never applies; drop that tier.
            if closes_with_infinity && boundaries.len() > 1 {
                boundaries.len() - 1
            } else {
                boundaries.len()
            }
        } else if rates.len() + 1 == boundaries.len() && closes_with_infinity {
            rates.len()
        } else {
            return Err(TaxError::RateCountMismatch {
                boundaries: boundaries.len(),
                rates: rates.len(),
            });
        };

        for (index, &rate) in rates.iter().enumerate() {
            if !(0.0..1.0).contains(&rate) {
                return Err(TaxError::RateOutOfRange { index, value: rate });
            }
            if index > 0 && rate < rates[index - 1] {
                return Err(TaxError::RatesDecreasing {
                    index,
                    value: rate,
                    previous: rates[index - 1],
                });
            }
        }

        let tiers = boundaries
            .iter()
            .zip(rates)
            .take(usable)
            .map(|(&lower, &rate)| TaxTier { lower, rate })
            .collect();
        Ok(TaxSchedule { tiers })
    }

    /// The schedule used in the wagering experiment: 0% up to 500, then +10% for
    /// every further 500, topping out at 40% above 2000.
    pub fn experiment_default() -> Self {
        TaxSchedule {
            tiers: vec![
                TaxTier { lower: 0.0, rate: 0.0 },
                TaxTier { lower: 500.0, rate: 0.1 },
                TaxTier { lower: 1000.0, rate: 0.2 },
                TaxTier { lower: 1500.0, rate: 0.3 },
                TaxTier { lower: 2000.0, rate: 0.4 },
            ],
        }
    }

    pub fn tiers(&self) -> &[TaxTier] {
        &self.tiers
    }

    /// Tier lower bounds followed by the closing `∞`.
    pub fn boundaries(&self) -> Vec<f64> {
        self.tiers
            .iter()
            .map(|t| t.lower)
            .chain(std::iter::once(f64::INFINITY))
            .collect()
    }

    /// Net winnings after tax. Negative input is treated as zero winnings.
    #[inline]
    pub fn net(&self, gross: f64) -> f64 {
        let w = gross.max(0.0);
        let mut net = 0.0;
        for (i, tier) in self.tiers.iter().enumerate() {
            if w <= tier.lower {
                break;
            }
            let upper = self
                .tiers
                .get(i + 1)
                .map_or(f64::INFINITY, |next| next.lower);
            net += (1.0 - tier.rate) * (w.min(upper) - tier.lower);
        }
        net
    }

    /// Like [`TaxSchedule::net`] but rejects negative or non-finite winnings.
    pub fn try_net(&self, gross: f64) -> Result<f64, TaxError> {
        if !gross.is_finite() || gross < 0.0 {
            return Err(TaxError::InvalidWinnings(gross));
        }
        Ok(self.net(gross))
    }

    /// The marginal rate paid on the next unit of winnings above `gross`.
    pub fn marginal_rate(&self, gross: f64) -> f64 {
        self.tiers
            .iter()
            .take_while(|t| t.lower <= gross.max(0.0))
            .last()
            .map_or(0.0, |t| t.rate)
    }
}

impl Default for TaxSchedule {
    fn default() -> Self {
        TaxSchedule::experiment_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reference() -> TaxSchedule {
        TaxSchedule::from_boundaries(
            &[0.0, 500.0, 1000.0, 1500.0, 2000.0, f64::INFINITY],
            &[0.0, 0.1, 0.2, 0.3, 0.4, 0.5],
        )
        .unwrap()
    }

    #[test]
    fn worked_example_1200() {
        assert_relative_eq!(reference().net(1200.0), 1110.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_winnings_are_untaxed_zero() {
        assert_eq!(reference().net(0.0), 0.0);
        assert_eq!(reference().try_net(0.0).unwrap(), 0.0);
    }

    #[test]
    fn reference_matches_experiment_default() {
        assert_eq!(reference(), TaxSchedule::experiment_default());
    }

    #[test]
    fn rate_count_one_fewer_is_accepted() {
        let s = TaxSchedule::from_boundaries(&[0.0, 100.0, f64::INFINITY], &[0.0, 0.5]).unwrap();
        assert_relative_eq!(s.net(300.0), 100.0 + 0.5 * 200.0);
    }

    #[test]
    fn finite_last_boundary_taxes_everything_above() {
        let s = TaxSchedule::from_boundaries(&[0.0, 100.0], &[0.0, 0.25]).unwrap();
        assert_relative_eq!(s.net(500.0), 100.0 + 0.75 * 400.0);
    }

    #[test]
    fn invalid_schedules_are_rejected() {
        assert_eq!(
            TaxSchedule::from_boundaries(&[], &[]),
            Err(TaxError::EmptySchedule)
        );
        assert!(matches!(
            TaxSchedule::from_boundaries(&[1.0, 2.0], &[0.0, 0.1]),
            Err(TaxError::FirstBoundaryNotZero(_))
        ));
        assert!(matches!(
            TaxSchedule::from_boundaries(&[0.0, 500.0, 500.0], &[0.0, 0.1, 0.2]),
            Err(TaxError::BoundariesNotAscending { index: 2, .. })
        ));
        assert!(matches!(
            TaxSchedule::from_boundaries(&[0.0, 500.0], &[0.0, 1.0]),
            Err(TaxError::RateOutOfRange { index: 1, .. })
        ));
        assert!(matches!(
            TaxSchedule::from_boundaries(&[0.0, 500.0], &[0.2, 0.1]),
            Err(TaxError::RatesDecreasing { index: 1, .. })
        ));
        assert!(matches!(
            TaxSchedule::from_boundaries(&[0.0, 500.0], &[0.2]),
            Err(TaxError::RateCountMismatch { .. })
        ));
        assert!(matches!(
            reference().try_net(-1.0),
            Err(TaxError::InvalidWinnings(_))
        ));
    }

    #[test]
    fn marginal_rate_follows_tiers() {
        let s = reference();
        assert_eq!(s.marginal_rate(0.0), 0.0);
        assert_eq!(s.marginal_rate(499.0), 0.0);
        assert_eq!(s.marginal_rate(750.0), 0.1);
        assert_eq!(s.marginal_rate(1e9), 0.4);
    }

    #[test]
    fn boundaries_close_with_infinity() {
        let b = reference().boundaries();
        assert_eq!(b.len(), 6);
        assert!(b[5].is_infinite());
    }
}
