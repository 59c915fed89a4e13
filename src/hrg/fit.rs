//! Fitting loop: burn-in, equilibrium search, then snapshot averaging
//!
//! The engine types only ever take one step or one snapshot; this module
//! decides how many, keeps the best-`L` bookkeeping in a [`FitState`] and
//! emits progress records.

use super::dendrogram::Dendrogram;
use super::equilibrium::{EquilibriumDetector, EquilibriumThreshold};
use super::mcmc::{McmcSampler, StepOutcome};
use super::probability::ProbabilityAccumulator;
use super::progress::{FitPhase, ProgressRecord, ProgressSink};
use crate::error::HrgError;
use crate::storage::CsrGraph;
use log::{debug, info, warn};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Control-loop settings
#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    /// Steps before the equilibrium search starts
    pub burn_in_steps: u64,
    /// Steps per equilibrium burst
    pub burst_steps: u64,
    /// Improvement threshold that ends the equilibrium search
    pub equilibrium: EquilibriumThreshold,
    /// Give up on equilibrium after this many bursts (`None` = no cap)
    pub max_bursts: Option<usize>,
    /// Probability snapshots averaged into the result
    pub num_samples: usize,
    /// Steps taken after each snapshot
    pub sample_interval: u64,
    /// Burn-in steps between progress records (0 disables them)
    pub progress_interval: u64,
    /// Seed for the single random stream driving the whole fit
    pub seed: u64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            burn_in_steps: 100_000,
            burst_steps: 10_000,
            equilibrium: EquilibriumThreshold::default(),
            max_bursts: None,
            num_samples: 10,
            sample_interval: 1_000,
            progress_interval: 4096,
            seed: 42,
        }
    }
}

impl FitConfig {
    /// Reject settings under which the loop could not produce an averaged
    /// matrix or would never leave the equilibrium search
    ///
    /// # Errors
    ///
    /// Returns `HrgError::InvalidConfig` naming the offending setting
    pub fn validate(&self) -> Result<(), HrgError> {
        if self.num_samples == 0 {
            return Err(HrgError::InvalidConfig(
                "num_samples must be at least 1".to_string(),
            ));
        }
        let threshold = match self.equilibrium {
            EquilibriumThreshold::Absolute(t) | EquilibriumThreshold::PerInternalNode(t) => t,
        };
        // Best L never decreases, so a burst can only meet a positive threshold
        let reachable = threshold > 0.0;
        if self.max_bursts.is_none() && !reachable {
            return Err(HrgError::InvalidConfig(format!(
                "equilibrium threshold {threshold} is never met; set max_bursts or use a positive threshold"
            )));
        }
        Ok(())
    }
}

/// Best-`L` bookkeeping owned by the loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitState {
    /// Steps taken
    pub step: u64,
    /// Steps whose move was accepted
    pub accepted: u64,
    /// Best log-likelihood seen, including the initial tree
    pub best_log_likelihood: f64,
    /// Step at which the best was first reached (0 = initial tree)
    pub best_step: u64,
}

impl FitState {
    /// State before any step, starting from the initial tree's `L`
    #[must_use]
    pub const fn new(initial_log_likelihood: f64) -> Self {
        Self {
            step: 0,
            accepted: 0,
            best_log_likelihood: initial_log_likelihood,
            best_step: 0,
        }
    }

    /// Account for one step; returns `true` if it set a new best
    pub fn observe(&mut self, outcome: StepOutcome, log_likelihood: f64) -> bool {
        self.step += 1;
        if outcome.accepted {
            self.accepted += 1;
        }
        if log_likelihood > self.best_log_likelihood {
            self.best_log_likelihood = log_likelihood;
            self.best_step = self.step;
            true
        } else {
            false
        }
    }

    /// Fraction of steps accepted
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn acceptance_rate(&self) -> f64 {
        if self.step == 0 {
            0.0
        } else {
            self.accepted as f64 / self.step as f64
        }
    }
}

/// Outcome of a completed fit
#[derive(Debug, Clone)]
pub struct FitResult<'g> {
    /// Dendrogram as left by the last step
    pub dendrogram: Dendrogram<'g>,
    /// Averaged connection-probability matrix
    pub matrix: Array2<f64>,
    /// Final loop bookkeeping
    pub state: FitState,
    /// Equilibrium bursts run
    pub bursts: usize,
    /// Whether the threshold was met (false only when `max_bursts` cut the search)
    pub reached_equilibrium: bool,
}

/// Drives one Markov chain over a graph
///
/// # Example
///
/// ```
/// use hrg_fit::{CsrGraph, FitConfig, HrgFitter, NoProgress, NodeId};
///
/// let edges = [(0, 1), (1, 2), (2, 0), (2, 3)].map(|(u, v)| (NodeId(u), NodeId(v)));
/// let graph = CsrGraph::from_edge_list(4, &edges).unwrap();
/// let config = FitConfig {
///     burn_in_steps: 500,
///     burst_steps: 200,
///     sample_interval: 50,
///     ..FitConfig::default()
/// };
///
/// let result = HrgFitter::new(&graph, config).run(&mut NoProgress).unwrap();
/// assert_eq!(result.matrix.dim(), (4, 4));
/// assert!(result.state.best_log_likelihood <= 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct HrgFitter<'g> {
    graph: &'g CsrGraph,
    config: FitConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'g> HrgFitter<'g> {
    /// Fitter for `graph` with the given settings
    #[must_use]
    pub const fn new(graph: &'g CsrGraph, config: FitConfig) -> Self {
        Self {
            graph,
            config,
            cancel: None,
        }
    }

    /// Abandon the fit with `HrgError::Cancelled` once `flag` is raised
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Settings in use
    #[must_use]
    pub const fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Run burn-in, equilibrium search and sampling
    ///
    /// # Errors
    ///
    /// Returns `HrgError::InvalidConfig` if [`FitConfig::validate`] fails,
    /// `HrgError::Input` if the graph has fewer than 2 nodes and
    /// `HrgError::Cancelled` if the cancellation flag is raised; no matrix is
    /// produced in any of these cases
    pub fn run<S: ProgressSink + ?Sized>(&self, sink: &mut S) -> Result<FitResult<'g>, HrgError> {
        let config = &self.config;
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut dendrogram = Dendrogram::build(self.graph, &mut rng)?;
        let mut sampler = McmcSampler::from_rng(rng, self.graph.num_nodes());
        let mut state = FitState::new(dendrogram.log_likelihood());
        let mut outcome = StepOutcome {
            accepted: false,
            delta_l: 0.0,
        };

        info!(
            "fitting HRG: {} nodes, {} edges, initial L = {:.3}",
            self.graph.num_nodes(),
            self.graph.num_edges(),
            dendrogram.log_likelihood()
        );

        for _ in 0..config.burn_in_steps {
            outcome = self.advance(&mut sampler, &mut dendrogram, &mut state)?;
            if config.progress_interval > 0 && state.step % config.progress_interval == 0 {
                sink.record(&record(FitPhase::BurnIn, &state, &dendrogram, outcome));
            }
        }
        info!(
            "burn-in done after {} steps: L = {:.3}, best L = {:.3} (step {})",
            state.step,
            dendrogram.log_likelihood(),
            state.best_log_likelihood,
            state.best_step
        );

        let threshold = config.equilibrium.resolve(dendrogram.num_internal());
        let mut detector = EquilibriumDetector::new(threshold, state.best_log_likelihood);
        let mut reached_equilibrium = false;
        loop {
            if config.max_bursts.is_some_and(|max| detector.bursts() >= max) {
                warn!(
                    "no equilibrium after {} bursts (threshold {:.3}); sampling anyway",
                    detector.bursts(),
                    threshold
                );
                break;
            }

            for _ in 0..config.burst_steps {
                outcome = self.advance(&mut sampler, &mut dendrogram, &mut state)?;
            }
            sink.record(&record(FitPhase::Equilibrium, &state, &dendrogram, outcome));

            let done = detector.observe_burst(state.best_log_likelihood);
            debug!(
                "burst {}: best L = {:.3}, improvement {:.3}",
                detector.bursts(),
                state.best_log_likelihood,
                detector.last_improvement().unwrap_or(0.0)
            );
            if done {
                reached_equilibrium = true;
                break;
            }
        }
        info!(
            "equilibrium search finished after {} bursts: best L = {:.3}",
            detector.bursts(),
            state.best_log_likelihood
        );

        let mut accumulator = ProbabilityAccumulator::new(self.graph.num_nodes());
        for sample in 0..config.num_samples {
            accumulator.add_snapshot(&dendrogram);
            sink.record(&record(FitPhase::Sampling, &state, &dendrogram, outcome));
            debug!("snapshot {} of {}", sample + 1, config.num_samples);
            for _ in 0..config.sample_interval {
                outcome = self.advance(&mut sampler, &mut dendrogram, &mut state)?;
            }
        }
        let matrix = accumulator.mean().ok_or_else(|| {
            HrgError::InvalidConfig("no probability snapshots were taken".to_string())
        })?;

        info!(
            "averaged {} snapshots over {} steps, acceptance rate {:.3}",
            accumulator.samples(),
            state.step,
            state.acceptance_rate()
        );

        Ok(FitResult {
            dendrogram,
            matrix,
            state,
            bursts: detector.bursts(),
            reached_equilibrium,
        })
    }

    fn advance(
        &self,
        sampler: &mut McmcSampler,
        dendrogram: &mut Dendrogram<'g>,
        state: &mut FitState,
    ) -> Result<StepOutcome, HrgError> {
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return Err(HrgError::Cancelled { step: state.step });
        }
        let outcome = sampler.step(dendrogram);
        state.observe(outcome, dendrogram.log_likelihood());
        Ok(outcome)
    }
}

fn record(
    phase: FitPhase,
    state: &FitState,
    dendrogram: &Dendrogram<'_>,
    outcome: StepOutcome,
) -> ProgressRecord {
    ProgressRecord {
        phase,
        step: state.step,
        log_likelihood: dendrogram.log_likelihood(),
        best_log_likelihood: state.best_log_likelihood,
        accepted: outcome.accepted,
        delta_l: outcome.delta_l,
    }
}
