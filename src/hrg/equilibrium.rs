//! Burst-based equilibrium heuristic
//!
//! The control loop runs the chain in fixed-size bursts and reports the best
//! `L` seen by the end of each burst. Equilibrium is declared once a burst
//! improves the best `L` by less than the threshold. This is a stopping
//! heuristic, not a convergence diagnostic.

/// Minimum best-`L` improvement per burst below which the chain counts as
/// equilibrated
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EquilibriumThreshold {
    /// Fixed improvement in nats, independent of graph size
    Absolute(f64),
    /// Improvement per internal node, i.e. scaled by `|V| - 1`
    PerInternalNode(f64),
}

impl Default for EquilibriumThreshold {
    fn default() -> Self {
        Self::Absolute(1.0)
    }
}

impl EquilibriumThreshold {
    /// Effective absolute threshold for a dendrogram with `num_internal` nodes
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn resolve(self, num_internal: usize) -> f64 {
        match self {
            Self::Absolute(t) => t,
            Self::PerInternalNode(t) => t * num_internal as f64,
        }
    }
}

/// Compares the best `L` across successive bursts
///
/// # Example
///
/// ```
/// use hrg_fit::EquilibriumDetector;
///
/// let mut detector = EquilibriumDetector::new(1.0, -100.0);
/// assert!(!detector.observe_burst(-60.0)); // improved by 40
/// assert!(!detector.observe_burst(-58.5)); // improved by 1.5
/// assert!(detector.observe_burst(-58.2));  // improved by 0.3
/// assert_eq!(detector.bursts(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EquilibriumDetector {
    threshold: f64,
    previous_best: f64,
    last_improvement: Option<f64>,
    bursts: usize,
}

impl EquilibriumDetector {
    /// Start from the best `L` reached before the first burst
    #[must_use]
    pub const fn new(threshold: f64, initial_best: f64) -> Self {
        Self {
            threshold,
            previous_best: initial_best,
            last_improvement: None,
            bursts: 0,
        }
    }

    /// Record the best `L` at the end of a burst; `true` once equilibrated
    pub fn observe_burst(&mut self, best_l: f64) -> bool {
        let improvement = best_l - self.previous_best;
        self.previous_best = best_l;
        self.last_improvement = Some(improvement);
        self.bursts += 1;
        improvement < self.threshold
    }

    /// Threshold in effect
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Improvement reported by the latest burst
    #[must_use]
    pub const fn last_improvement(&self) -> Option<f64> {
        self.last_improvement
    }

    /// Bursts observed so far
    #[must_use]
    pub const fn bursts(&self) -> usize {
        self.bursts
    }
}
