//! # Heuristic Mixture Decision Model
//!
//! Forward prediction for the generative account of a trial:
//!
//! 1. A strategy `h` is chosen with probability
//!    `softmax_h(subject[s, h] + condition[vis, h])`, restricted to the heuristics
//!    admissible for the visualization.
//! 2. The reported probability is that heuristic's estimate plus Normal noise whose
//!    log scale is additive in a base, a subject and a condition effect.
//! 3. The reported bet is the optimal bet for the reported probability, shifted by
//!    a subject/condition bias, plus Normal noise with its own log-additive scale.
//!
//! The parameters come from an external fit; this module only predicts, scores
//! observed responses and simulates synthetic ones for posterior-predictive checks.

use crate::bet::{BetError, BetSolver};
use crate::heuristics::{self, HeuristicError, StimulusScale};
use crate::types::{HeuristicId, Stimulus, VisCondition};
use rand::Rng;
use rand::distributions::WeightedIndex;
use rand_distr::{Distribution, Normal as SamplingNormal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};
use std::collections::BTreeMap;
use std::fs;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MixtureError {
    #[error("Heuristic evaluation failed: {0}")]
    Heuristic(#[from] HeuristicError),

    #[error("Bet solver failed: {0}")]
    Bet(#[from] BetError),

    #[error("No heuristic is admissible for visualization condition '{0}'.")]
    NoAdmissibleHeuristics(VisCondition),

    #[error("The {what} scale for subject '{subject}' in condition '{vis}' is {value}; it must be positive and finite.")]
    InvalidScale {
        what: &'static str,
        subject: String,
        vis: VisCondition,
        value: f64,
    },

    #[error("Could not sample a synthetic response: {0}")]
    Sampling(String),

    #[error("Failed to read mixture parameters: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse mixture parameters: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// One logit per heuristic. Heuristics left out of a parameter file default to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicLogits {
    pub relative_mean_difference: f64,
    pub mean_difference_vs_axis: f64,
    pub means_first_interval: f64,
    pub interval_overlap: f64,
    pub interval_overlap_vs_axis: f64,
    pub outcome_proportion: f64,
    pub means_first_draws: f64,
}

impl HeuristicLogits {
    pub fn get(&self, heuristic: HeuristicId) -> f64 {
        match heuristic {
            HeuristicId::RelativeMeanDifference => self.relative_mean_difference,
            HeuristicId::MeanDifferenceVsAxis => self.mean_difference_vs_axis,
            HeuristicId::MeansFirstInterval => self.means_first_interval,
            HeuristicId::IntervalOverlap => self.interval_overlap,
            HeuristicId::IntervalOverlapVsAxis => self.interval_overlap_vs_axis,
            HeuristicId::OutcomeProportion => self.outcome_proportion,
            HeuristicId::MeansFirstDraws => self.means_first_draws,
        }
    }

    pub fn set(&mut self, heuristic: HeuristicId, value: f64) {
        let slot = match heuristic {
            HeuristicId::RelativeMeanDifference => &mut self.relative_mean_difference,
            HeuristicId::MeanDifferenceVsAxis => &mut self.mean_difference_vs_axis,
            HeuristicId::MeansFirstInterval => &mut self.means_first_interval,
            HeuristicId::IntervalOverlap => &mut self.interval_overlap,
            HeuristicId::IntervalOverlapVsAxis => &mut self.interval_overlap_vs_axis,
            HeuristicId::OutcomeProportion => &mut self.outcome_proportion,
            HeuristicId::MeansFirstDraws => &mut self.means_first_draws,
        };
        *slot = value;
    }
}

/// A value per visualization condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerCondition<T> {
    pub intervals: T,
    #[serde(rename = "HOPs")]
    pub hops: T,
    pub densities: T,
    #[serde(rename = "QDPs")]
    pub qdps: T,
}

impl<T> PerCondition<T> {
    pub fn get(&self, vis: VisCondition) -> &T {
        match vis {
            VisCondition::Intervals => &self.intervals,
            VisCondition::Hops => &self.hops,
            VisCondition::Densities => &self.densities,
            VisCondition::Qdps => &self.qdps,
        }
    }

    pub fn get_mut(&mut self, vis: VisCondition) -> &mut T {
        match vis {
            VisCondition::Intervals => &mut self.intervals,
            VisCondition::Hops => &mut self.hops,
            VisCondition::Densities => &mut self.densities,
            VisCondition::Qdps => &mut self.qdps,
        }
    }
}

/// `base + subject[s] + condition[vis]`, with unknown subjects contributing 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdditiveEffects {
    pub base: f64,
    pub subject: BTreeMap<String, f64>,
    pub condition: PerCondition<f64>,
}

impl AdditiveEffects {
    pub fn at(&self, subject: &str, vis: VisCondition) -> f64 {
        self.base + self.subject.get(subject).copied().unwrap_or(0.0) + *self.condition.get(vis)
    }
}

/// Fitted (or hypothesised) parameters of the mixture model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixtureParams {
    pub subject_logits: BTreeMap<String, HeuristicLogits>,
    pub condition_logits: PerCondition<HeuristicLogits>,
    /// Log of the report noise scale (percentage points).
    pub report_log_sigma: AdditiveEffects,
    /// Bet offset added to the optimal bet.
    pub bet_bias: AdditiveEffects,
    /// Log of the bet noise scale.
    pub bet_log_sigma: AdditiveEffects,
}

impl MixtureParams {
    pub fn load(path: &str) -> Result<Self, MixtureError> {
        let toml_string = fs::read_to_string(path)?;
        Ok(toml::from_str(&toml_string)?)
    }
}

/// One strategy's contribution to a predicted report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReportComponent {
    pub heuristic: HeuristicId,
    pub weight: f64,
    /// The heuristic's estimate, in percent.
    pub estimate: f64,
}

/// Predicted distribution of the reported probability: a Normal mixture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPrediction {
    pub components: Vec<ReportComponent>,
    pub sigma: f64,
}

impl ReportPrediction {
    pub fn mean(&self) -> f64 {
        self.components.iter().map(|c| c.weight * c.estimate).sum()
    }

    pub fn log_likelihood(&self, observed: f64) -> f64 {
        mixture_log_density(
            self.components.iter().map(|c| (c.weight, c.estimate)),
            self.sigma,
            observed,
        )
    }
}

/// Predicted bet for a known reported probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BetPrediction {
    pub optimal_bet: f64,
    pub bias: f64,
    pub sigma: f64,
}

impl BetPrediction {
    pub fn center(&self) -> f64 {
        self.optimal_bet + self.bias
    }

    pub fn log_likelihood(&self, observed: f64) -> f64 {
        mixture_log_density(std::iter::once((1.0, self.center())), self.sigma, observed)
    }
}

/// A bet mixture component tied to the strategy that produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BetComponent {
    pub heuristic: HeuristicId,
    pub weight: f64,
    pub center: f64,
}

/// Full forward prediction for one trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialPrediction {
    pub report: ReportPrediction,
    pub bet_components: Vec<BetComponent>,
    pub bet_sigma: f64,
}

impl TrialPrediction {
    pub fn bet_mean(&self) -> f64 {
        self.bet_components.iter().map(|c| c.weight * c.center).sum()
    }

    pub fn bet_log_likelihood(&self, observed: f64) -> f64 {
        mixture_log_density(
            self.bet_components.iter().map(|c| (c.weight, c.center)),
            self.bet_sigma,
            observed,
        )
    }
}

/// A trial to predict: who responded and what they saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub subject: String,
    pub stimulus: Stimulus,
}

/// A synthetic response drawn from the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulatedResponse {
    pub heuristic: HeuristicId,
    pub report: f64,
    pub bet: f64,
}

/// `log Σ_k w_k · N(x | μ_k, σ)`, via log-sum-exp.
fn mixture_log_density(components: impl Iterator<Item = (f64, f64)>, sigma: f64, x: f64) -> f64 {
    let terms: Vec<f64> = components
        .filter(|&(w, _)| w > 0.0)
        .map(|(w, mu)| match Normal::new(mu, sigma) {
            Ok(normal) => w.ln() + normal.ln_pdf(x),
            Err(_) => f64::NEG_INFINITY,
        })
        .collect();
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return f64::NEG_INFINITY;
    }
    max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Forward model tying the parameters to the heuristics and the bet solver.
pub struct MixtureModel<'a> {
    params: &'a MixtureParams,
    scale: StimulusScale,
    solver: BetSolver<'a>,
}

impl<'a> MixtureModel<'a> {
    pub fn new(params: &'a MixtureParams, scale: StimulusScale, solver: BetSolver<'a>) -> Self {
        MixtureModel {
            params,
            scale,
            solver,
        }
    }

    /// Mixture weights over the heuristics admissible for `vis`. Sums to 1.
    pub fn mixture_weights(
        &self,
        subject: &str,
        vis: VisCondition,
    ) -> Result<Vec<(HeuristicId, f64)>, MixtureError> {
        let admissible = vis.admissible();
        if admissible.is_empty() {
            return Err(MixtureError::NoAdmissibleHeuristics(vis));
        }
        let subject_logits = self.params.subject_logits.get(subject);
        let condition_logits = self.params.condition_logits.get(vis);
        let logits: Vec<f64> = admissible
            .iter()
            .map(|&h| subject_logits.map_or(0.0, |l| l.get(h)) + condition_logits.get(h))
            .collect();
        Ok(admissible.into_iter().zip(softmax(&logits)).collect())
    }

    fn scale_for(
        &self,
        effects: &AdditiveEffects,
        what: &'static str,
        subject: &str,
        vis: VisCondition,
    ) -> Result<f64, MixtureError> {
        let sigma = effects.at(subject, vis).exp();
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(MixtureError::InvalidScale {
                what,
                subject: subject.to_string(),
                vis,
                value: sigma,
            });
        }
        Ok(sigma)
    }

    /// Predicted distribution of the reported probability (percent).
    pub fn predict_report(&self, subject: &str, stimulus: &Stimulus) -> Result<ReportPrediction, MixtureError> {
        let vis = stimulus.condition.vis;
        let components = self
            .mixture_weights(subject, vis)?
            .into_iter()
            .map(|(heuristic, weight)| {
                heuristics::estimate(heuristic, &stimulus.features, &self.scale).map(|estimate| {
                    ReportComponent {
                        heuristic,
                        weight,
                        estimate,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let sigma = self.scale_for(&self.params.report_log_sigma, "report", subject, vis)?;
        Ok(ReportPrediction { components, sigma })
    }

    fn optimal_bet_for_report(&self, report: f64) -> Result<f64, MixtureError> {
        let p = (report / 100.0).clamp(0.0, 1.0);
        Ok(self.solver.solve(p)?)
    }

    /// Predicted bet given the probability the participant actually reported.
    pub fn predict_bet_given_report(
        &self,
        subject: &str,
        vis: VisCondition,
        report: f64,
    ) -> Result<BetPrediction, MixtureError> {
        Ok(BetPrediction {
            optimal_bet: self.optimal_bet_for_report(report)?,
            bias: self.params.bet_bias.at(subject, vis),
            sigma: self.scale_for(&self.params.bet_log_sigma, "bet", subject, vis)?,
        })
    }

    /// Report mixture plus the bet mixture it induces (one bet component per strategy).
    pub fn predict_trial(&self, subject: &str, stimulus: &Stimulus) -> Result<TrialPrediction, MixtureError> {
        let vis = stimulus.condition.vis;
        let report = self.predict_report(subject, stimulus)?;
        let bias = self.params.bet_bias.at(subject, vis);
        let bet_components = report
            .components
            .iter()
            .map(|c| {
                self.optimal_bet_for_report(c.estimate).map(|bet| BetComponent {
                    heuristic: c.heuristic,
                    weight: c.weight,
                    center: bet + bias,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let bet_sigma = self.scale_for(&self.params.bet_log_sigma, "bet", subject, vis)?;
        Ok(TrialPrediction {
            report,
            bet_components,
            bet_sigma,
        })
    }

    /// Predicts every trial independently in parallel, preserving input order.
    pub fn predict_trials(&self, trials: &[Trial]) -> Result<Vec<TrialPrediction>, MixtureError> {
        log::debug!("Predicting {} trials", trials.len());
        trials
            .par_iter()
            .map(|t| self.predict_trial(&t.subject, &t.stimulus))
            .collect()
    }

    /// Draws one synthetic `(report, bet)` pair. The report is clamped to [0, 100]
    /// and the bet to [0, budget].
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        subject: &str,
        stimulus: &Stimulus,
        rng: &mut R,
    ) -> Result<SimulatedResponse, MixtureError> {
        let vis = stimulus.condition.vis;
        let report = self.predict_report(subject, stimulus)?;
        let chooser = WeightedIndex::new(report.components.iter().map(|c| c.weight))
            .map_err(|e| MixtureError::Sampling(e.to_string()))?;
        let chosen = report.components[chooser.sample(rng)];

        let report_noise = SamplingNormal::new(0.0, report.sigma)
            .map_err(|e| MixtureError::Sampling(e.to_string()))?;
        let reported = (chosen.estimate + report_noise.sample(rng)).clamp(0.0, 100.0);

        let bet = self.predict_bet_given_report(subject, vis, reported)?;
        let bet_noise =
            SamplingNormal::new(0.0, bet.sigma).map_err(|e| MixtureError::Sampling(e.to_string()))?;
        let budget = self.solver.settings().budget;
        let wagered = (bet.center() + bet_noise.sample(rng)).clamp(0.0, budget);

        Ok(SimulatedResponse {
            heuristic: chosen.heuristic,
            report: reported,
            bet: wagered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bet::WagerSettings;
    use crate::tax::TaxSchedule;
    use crate::types::{StimulusCondition, StimulusFeatures};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn stimulus(vis: VisCondition, mean_diff: f64) -> Stimulus {
        Stimulus {
            condition: StimulusCondition {
                mean_diff_level: "medium".to_string(),
                sd_diff_level: "equal".to_string(),
                vis,
                trial: 1,
                start_means: false,
            },
            features: StimulusFeatures {
                mean_diff,
                sd: 0.5,
                draw_diffs: Some(vec![-0.4, 0.3, -0.2, 0.6, -0.1]),
            },
        }
    }

    fn scale() -> StimulusScale {
        StimulusScale {
            max_abs_mean_diff: 2.0,
            axis_range: 4.0,
            outcome_prefix: None,
        }
    }

    #[test]
    fn softmax_is_a_simplex_and_shift_invariant() {
        let w = softmax(&[1.0, 2.0, 3.0]);
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        let shifted = softmax(&[1001.0, 1002.0, 1003.0]);
        for (a, b) in w.iter().zip(&shifted) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn weights_combine_subject_and_condition_effects() {
        let tax = TaxSchedule::experiment_default();
        let solver = BetSolver::new(WagerSettings::default(), &tax).unwrap();
        let mut params = MixtureParams::default();
        let mut subject = HeuristicLogits::default();
        subject.set(HeuristicId::OutcomeProportion, 1.0);
        params.subject_logits.insert("s1".to_string(), subject);
        params
            .condition_logits
            .get_mut(VisCondition::Hops)
            .set(HeuristicId::OutcomeProportion, 1.0);
        let model = MixtureModel::new(&params, scale(), solver);

        let weights = model.mixture_weights("s1", VisCondition::Hops).unwrap();
        assert_eq!(weights.len(), 4);
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        let e2 = 2f64.exp();
        let outcome = weights
            .iter()
            .find(|(h, _)| *h == HeuristicId::OutcomeProportion)
            .unwrap()
            .1;
        assert_relative_eq!(outcome, e2 / (e2 + 3.0), epsilon = 1e-12);

        // Unknown subjects fall back to condition effects alone.
        let uniform = model.mixture_weights("nobody", VisCondition::Intervals).unwrap();
        for (_, w) in uniform {
            assert_relative_eq!(w, 0.2, epsilon = 1e-12);
        }
    }

    #[test]
    fn trial_prediction_pairs_reports_with_bets() {
        let tax = TaxSchedule::experiment_default();
        let solver = BetSolver::new(WagerSettings::default(), &tax).unwrap();
        let mut params = MixtureParams::default();
        params.bet_bias.base = 10.0;
        let model = MixtureModel::new(&params, scale(), solver);
        let stim = stimulus(VisCondition::Intervals, 1.0);

        let prediction = model.predict_trial("s1", &stim).unwrap();
        assert_eq!(prediction.report.components.len(), prediction.bet_components.len());
        for (r, b) in prediction.report.components.iter().zip(&prediction.bet_components) {
            assert_eq!(r.heuristic, b.heuristic);
            let expected = solver.solve(r.estimate / 100.0).unwrap() + 10.0;
            assert_relative_eq!(b.center, expected);
        }
        assert_relative_eq!(prediction.report.sigma, 1.0);
        assert!(prediction.report.log_likelihood(prediction.report.mean()).is_finite());
        assert!(prediction.bet_log_likelihood(prediction.bet_mean()).is_finite());
    }

    #[test]
    fn bet_given_report_clamps_out_of_range_reports() {
        let tax = TaxSchedule::experiment_default();
        let solver = BetSolver::new(WagerSettings::default(), &tax).unwrap();
        let params = MixtureParams::default();
        let model = MixtureModel::new(&params, scale(), solver);
        let over = model
            .predict_bet_given_report("s1", VisCondition::Qdps, 130.0)
            .unwrap();
        assert_eq!(over.optimal_bet, solver.solve(1.0).unwrap());
        let log_lik = over.log_likelihood(over.center());
        assert_relative_eq!(log_lik, -0.5 * (2.0 * std::f64::consts::PI).ln(), epsilon = 1e-12);
    }

    #[test]
    fn simulation_is_reproducible_and_bounded() {
        let tax = TaxSchedule::experiment_default();
        let solver = BetSolver::new(WagerSettings::default(), &tax).unwrap();
        let mut params = MixtureParams::default();
        params.report_log_sigma.base = 3.0;
        params.bet_log_sigma.base = 5.0;
        let model = MixtureModel::new(&params, scale(), solver);
        let stim = stimulus(VisCondition::Hops, -0.5);

        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let x = model.simulate("s1", &stim, &mut a).unwrap();
            let y = model.simulate("s1", &stim, &mut b).unwrap();
            assert_eq!(x, y);
            assert!((0.0..=100.0).contains(&x.report));
            assert!((0.0..=1000.0).contains(&x.bet));
            assert!(VisCondition::Hops.admits(x.heuristic));
        }
    }

    #[test]
    fn overflowing_scale_is_rejected() {
        let tax = TaxSchedule::experiment_default();
        let solver = BetSolver::new(WagerSettings::default(), &tax).unwrap();
        let mut params = MixtureParams::default();
        params.report_log_sigma.base = 1e6;
        let model = MixtureModel::new(&params, scale(), solver);
        let err = model
            .predict_report("s1", &stimulus(VisCondition::Densities, 0.2))
            .unwrap_err();
        assert!(matches!(err, MixtureError::InvalidScale { what: "report", .. }));
    }
}
