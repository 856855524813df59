//! # Optimal-Bet Solver
//!
//! Discrete expected-utility maximization over the wager domain
//! `{m, m + s, m + 2s, …} ∩ [m, B]`:
//!
//! ```text
//! U(b) = (1 − L)·(B − b) + p · tax(b / p)
//! ```
//!
//! `b / p` is the gross stake needed to win the net amount `b` at odds `p`, and
//! `(1 − L)` is what survives of the money kept out of the bet. Because the tax
//! schedule is piecewise linear the utility is non-smooth, so the solver simply
//! evaluates every candidate. Candidates are generated by integer index to keep
//! the grid exact regardless of step size.
//!
//! Ties are broken toward the smallest bet.

use crate::tax::TaxSchedule;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stand-in odds for a probability estimate of exactly zero, where the gross
/// stake `b / p` is unbounded.
pub const ZERO_PROBABILITY_EPSILON: f64 = 0.001;

/// Default upper bound on the number of candidate bets a single solve may evaluate.
pub const DEFAULT_MAX_CANDIDATES: usize = 1_000_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BetError {
    #[error("Probability estimate must lie in [0, 1], got {0}.")]
    ProbabilityOutOfRange(f64),

    #[error("Bet step size must be positive and finite, got {0}.")]
    InvalidStep(f64),

    #[error("Budget must be finite, got {0}.")]
    InvalidBudget(f64),

    #[error("Minimum bet must be finite and non-negative, got {0}.")]
    InvalidMinimumBet(f64),

    #[error("Minimum bet ({min_bet}) exceeds the budget ({budget}).")]
    MinimumAboveBudget { min_bet: f64, budget: f64 },

    #[error("Loss rate must lie in [0, 1], got {0}.")]
    InvalidLossRate(f64),

    #[error("Zero-probability substitute must lie in (0, 1], got {0}.")]
    InvalidEpsilon(f64),

    #[error("The bet domain has {candidates} candidates, above the cap of {cap}. Increase the step size.")]
    DomainTooLarge { candidates: usize, cap: usize },
}

/// Wager settings shared by every decision in a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WagerSettings {
    pub budget: f64,
    pub min_bet: f64,
    pub step: f64,
    /// Fraction of the un-bet budget that is lost.
    pub loss_rate: f64,
    pub zero_probability_epsilon: f64,
    pub max_candidates: usize,
}

impl Default for WagerSettings {
    fn default() -> Self {
        WagerSettings {
            budget: 1000.0,
            min_bet: 1.0,
            step: 1.0,
            loss_rate: 0.25,
            zero_probability_epsilon: ZERO_PROBABILITY_EPSILON,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

impl WagerSettings {
    pub fn validate(&self) -> Result<(), BetError> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(BetError::InvalidStep(self.step));
        }
        if !self.budget.is_finite() {
            return Err(BetError::InvalidBudget(self.budget));
        }
        if !(self.min_bet.is_finite() && self.min_bet >= 0.0) {
            return Err(BetError::InvalidMinimumBet(self.min_bet));
        }
        if !(self.min_bet <= self.budget) {
            return Err(BetError::MinimumAboveBudget {
                min_bet: self.min_bet,
                budget: self.budget,
            });
        }
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(BetError::InvalidLossRate(self.loss_rate));
        }
        if !(self.zero_probability_epsilon > 0.0 && self.zero_probability_epsilon <= 1.0) {
            return Err(BetError::InvalidEpsilon(self.zero_probability_epsilon));
        }
        let candidates = self.candidate_count();
        if candidates > self.max_candidates {
            return Err(BetError::DomainTooLarge {
                candidates,
                cap: self.max_candidates,
            });
        }
        Ok(())
    }

    /// Number of grid points `m + k·s` that do not exceed the budget. Saturates at
    /// `usize::MAX` for domains too wide to index.
    pub fn candidate_count(&self) -> usize {
        // 1e-9 of slack absorbs representation error in fractional steps.
        let span = (self.budget - self.min_bet) / self.step;
        ((span + 1e-9).floor() as usize).saturating_add(1)
    }

    #[inline]
    pub fn candidate(&self, index: usize) -> f64 {
        self.min_bet + index as f64 * self.step
    }
}

/// The chosen bet together with the utility it achieves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetDecision {
    pub probability: f64,
    pub bet: f64,
    pub utility: f64,
}

/// Evaluates and maximizes expected utility for one wager configuration.
///
/// The tax schedule is borrowed and must not change while decisions are being made.
#[derive(Debug, Clone, Copy)]
pub struct BetSolver<'a> {
    settings: WagerSettings,
    tax: &'a TaxSchedule,
}

impl<'a> BetSolver<'a> {
    pub fn new(settings: WagerSettings, tax: &'a TaxSchedule) -> Result<Self, BetError> {
        settings.validate()?;
        Ok(BetSolver { settings, tax })
    }

    pub fn settings(&self) -> &WagerSettings {
        &self.settings
    }

    fn odds(&self, probability: f64) -> Result<f64, BetError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(BetError::ProbabilityOutOfRange(probability));
        }
        Ok(if probability == 0.0 {
            self.settings.zero_probability_epsilon
        } else {
            probability
        })
    }

    #[inline]
    fn utility_at(&self, p: f64, bet: f64) -> f64 {
        let kept = (1.0 - self.settings.loss_rate) * (self.settings.budget - bet);
        kept + p * self.tax.net(bet / p)
    }

    /// Expected utility of wagering `bet` with probability estimate `probability`.
    pub fn utility(&self, probability: f64, bet: f64) -> Result<f64, BetError> {
        let p = self.odds(probability)?;
        Ok(self.utility_at(p, bet))
    }

    /// Every candidate bet with its utility, in ascending bet order.
    pub fn utility_curve(&self, probability: f64) -> Result<Vec<(f64, f64)>, BetError> {
        let p = self.odds(probability)?;
        Ok((0..self.settings.candidate_count())
            .map(|k| {
                let bet = self.settings.candidate(k);
                (bet, self.utility_at(p, bet))
            })
            .collect())
    }

    /// Returns the smallest bet that maximizes expected utility.
    pub fn decide(&self, probability: f64) -> Result<BetDecision, BetError> {
        let p = self.odds(probability)?;
        let mut best_bet = self.settings.candidate(0);
        let mut best_utility = self.utility_at(p, best_bet);
        for k in 1..self.settings.candidate_count() {
            let bet = self.settings.candidate(k);
            let utility = self.utility_at(p, bet);
            // Strict comparison keeps the earliest (smallest) maximizer.
            if utility > best_utility {
                best_bet = bet;
                best_utility = utility;
            }
        }
        Ok(BetDecision {
            probability,
            bet: best_bet,
            utility: best_utility,
        })
    }

    /// Shorthand for `decide(p)?.bet`.
    pub fn solve(&self, probability: f64) -> Result<f64, BetError> {
        self.decide(probability).map(|d| d.bet)
    }

    /// Solves many independent probabilities in parallel, preserving input order.
    pub fn solve_many(&self, probabilities: &[f64]) -> Result<Vec<BetDecision>, BetError> {
        probabilities
            .par_iter()
            .map(|&p| self.decide(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn solver(tax: &TaxSchedule) -> BetSolver<'_> {
        BetSolver::new(WagerSettings::default(), tax).unwrap()
    }

    #[test]
    fn bet_tracks_the_first_tier_above_the_loss_rate() {
        // With L = 0.25 betting pays until gross winnings reach the 30% tier at 1500,
        // so the optimum is b = 1500·p (capped by the budget).
        let tax = TaxSchedule::experiment_default();
        let s = solver(&tax);
        assert_relative_eq!(s.solve(0.5).unwrap(), 750.0);
        assert_relative_eq!(s.solve(0.2).unwrap(), 300.0);
        assert_relative_eq!(s.solve(0.9).unwrap(), 1000.0);
    }

    #[test]
    fn zero_probability_uses_epsilon() {
        let tax = TaxSchedule::experiment_default();
        let s = solver(&tax);
        let at_zero = s.decide(0.0).unwrap();
        let at_eps = s.decide(ZERO_PROBABILITY_EPSILON).unwrap();
        assert_eq!(at_zero.bet, at_eps.bet);
        assert_eq!(at_zero.utility, at_eps.utility);
        assert_eq!(at_zero.probability, 0.0);
        assert!(at_zero.utility.is_finite());
    }

    #[test]
    fn smallest_maximizer_wins_ties() {
        // With no tax and no loss, utility is flat in the bet: U = B − b + b = B.
        let tax = TaxSchedule::from_boundaries(&[0.0], &[0.0]).unwrap();
        let settings = WagerSettings {
            loss_rate: 0.0,
            ..WagerSettings::default()
        };
        let s = BetSolver::new(settings, &tax).unwrap();
        assert_eq!(s.solve(0.5).unwrap(), settings.min_bet);
    }

    #[test]
    fn fractional_steps_reach_the_budget() {
        let settings = WagerSettings {
            budget: 1.0,
            min_bet: 0.0,
            step: 0.1,
            ..WagerSettings::default()
        };
        assert_eq!(settings.candidate_count(), 11);
        assert_relative_eq!(settings.candidate(10), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let tax = TaxSchedule::experiment_default();
        let bad_step = WagerSettings {
            step: 0.0,
            ..WagerSettings::default()
        };
        assert_eq!(
            BetSolver::new(bad_step, &tax).unwrap_err(),
            BetError::InvalidStep(0.0)
        );
        let inverted = WagerSettings {
            min_bet: 2000.0,
            ..WagerSettings::default()
        };
        assert!(matches!(
            BetSolver::new(inverted, &tax),
            Err(BetError::MinimumAboveBudget { .. })
        ));
        let capped = WagerSettings {
            max_candidates: 10,
            ..WagerSettings::default()
        };
        assert!(matches!(
            BetSolver::new(capped, &tax),
            Err(BetError::DomainTooLarge { cap: 10, .. })
        ));
        let unbounded = WagerSettings {
            budget: f64::INFINITY,
            ..WagerSettings::default()
        };
        assert_eq!(
            BetSolver::new(unbounded, &tax).unwrap_err(),
            BetError::InvalidBudget(f64::INFINITY)
        );
        assert_eq!(
            solver(&tax).solve(1.5).unwrap_err(),
            BetError::ProbabilityOutOfRange(1.5)
        );
    }

    #[test]
    fn huge_budgets_hit_the_candidate_cap() {
        let tax = TaxSchedule::experiment_default();
        let huge = WagerSettings {
            budget: 1e20,
            ..WagerSettings::default()
        };
        assert_eq!(huge.candidate_count(), usize::MAX);
        assert_eq!(
            BetSolver::new(huge, &tax).unwrap_err(),
            BetError::DomainTooLarge {
                candidates: usize::MAX,
                cap: DEFAULT_MAX_CANDIDATES,
            }
        );
        let uncapped = WagerSettings {
            max_candidates: usize::MAX,
            ..huge
        };
        assert!(uncapped.validate().is_ok());
    }

    #[test]
    fn utility_curve_peaks_at_the_decision() {
        let tax = TaxSchedule::experiment_default();
        let s = solver(&tax);
        let curve = s.utility_curve(0.35).unwrap();
        let decision = s.decide(0.35).unwrap();
        let best = curve
            .iter()
            .fold(f64::NEG_INFINITY, |acc, &(_, u)| acc.max(u));
        assert_eq!(best, decision.utility);
        assert_eq!(curve.len(), 1000);
    }

    #[test]
    fn solve_many_preserves_order() {
        let tax = TaxSchedule::experiment_default();
        let s = solver(&tax);
        let ps = [0.1, 0.6, 0.3];
        let many = s.solve_many(&ps).unwrap();
        for (p, d) in ps.iter().zip(&many) {
            assert_eq!(d.bet, s.solve(*p).unwrap());
        }
    }
}
