//! Log-likelihood of a dendrogram
//!
//! Each internal node `r` splits its leaves into a left set of `n_L` and a
//! right set of `n_R` leaves with `e_r` observed edges between them. Its MLE
//! connection probability is `p_r = e_r / (n_L * n_R)` and it contributes
//!
//! ```text
//! L_r = e_r * ln(p_r) + (n_L * n_R - e_r) * ln(1 - p_r)
//! ```
//!
//! with `0 * ln(0) := 0`, so nodes with `p_r` of exactly 0 or 1 contribute 0.
//! The dendrogram's log-likelihood is the sum over all internal nodes.

/// `x * ln(y)` with the convention that a zero coefficient yields 0
///
/// # Example
///
/// ```
/// use hrg_fit::hrg::likelihood::xlogy;
///
/// assert_eq!(xlogy(0.0, 0.0), 0.0);
/// assert!((xlogy(2.0, 0.5) - 2.0 * 0.5_f64.ln()).abs() < 1e-12);
/// ```
#[must_use]
pub fn xlogy(x: f64, y: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x * y.ln()
    }
}

/// Observed connectivity across one internal node's bipartition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bipartition {
    /// Leaves under the left child
    pub n_left: usize,
    /// Leaves under the right child
    pub n_right: usize,
    /// Observed edges with one endpoint on each side
    pub edges: usize,
}

impl Bipartition {
    /// Create a bipartition summary
    ///
    /// # Panics
    ///
    /// Panics if either side is empty or `edges` exceeds the number of
    /// cross pairs; both mean the dendrogram bookkeeping is corrupt
    #[must_use]
    pub fn new(n_left: usize, n_right: usize, edges: usize) -> Self {
        assert!(
            n_left > 0 && n_right > 0,
            "empty side in bipartition ({n_left}, {n_right})"
        );
        assert!(
            edges <= n_left * n_right,
            "edge count {edges} exceeds {n_left} x {n_right} cross pairs"
        );
        Self {
            n_left,
            n_right,
            edges,
        }
    }

    /// Number of leaves under the node
    #[must_use]
    pub const fn num_leaves(&self) -> usize {
        self.n_left + self.n_right
    }

    /// Number of leaf pairs split by the node (`n_L * n_R`)
    #[must_use]
    pub const fn pairs(&self) -> usize {
        self.n_left * self.n_right
    }

    /// MLE connection probability `p_r`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn probability(&self) -> f64 {
        self.edges as f64 / self.pairs() as f64
    }

    /// Contribution `L_r` of this node to the total log-likelihood
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn log_likelihood(&self) -> f64 {
        let p = self.probability();
        let e = self.edges as f64;
        let missing = (self.pairs() - self.edges) as f64;
        xlogy(e, p) + xlogy(missing, 1.0 - p)
    }
}

/// Running total `L` and the delta of the most recent step
///
/// Does not remember the best `L` seen; that belongs to whoever drives
/// the sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LikelihoodTracker {
    total: f64,
    last_delta: f64,
}

impl LikelihoodTracker {
    /// Start tracking from a fully computed total
    #[must_use]
    pub const fn new(total: f64) -> Self {
        Self {
            total,
            last_delta: 0.0,
        }
    }

    /// Current log-likelihood
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.total
    }

    /// `deltaL` of the most recent proposal, accepted or not
    #[must_use]
    pub const fn last_delta(&self) -> f64 {
        self.last_delta
    }

    /// Record a proposal; only accepted ones move the total
    pub fn record(&mut self, delta: f64, accepted: bool) {
        self.last_delta = delta;
        if accepted {
            self.total += delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_degenerate_probabilities_contribute_zero() {
        // p = 0 and p = 1 both contribute exactly zero
        assert_eq!(Bipartition::new(3, 4, 0).log_likelihood(), 0.0);
        assert_eq!(Bipartition::new(3, 4, 12).log_likelihood(), 0.0);
        assert_eq!(Bipartition::new(1, 1, 1).probability(), 1.0);
    }

    #[test]
    fn test_interior_probability() {
        let b = Bipartition::new(2, 2, 1);
        assert_abs_diff_eq!(b.probability(), 0.25);

        let expected = 0.25_f64.ln() + 3.0 * 0.75_f64.ln();
        assert_abs_diff_eq!(b.log_likelihood(), expected, epsilon = 1e-12);
        assert!(b.log_likelihood() < 0.0);
    }

    #[test]
    fn test_bipartition_counts() {
        let b = Bipartition::new(3, 5, 7);
        assert_eq!(b.pairs(), 15);
        assert_eq!(b.num_leaves(), 8);
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn test_too_many_edges_panics() {
        let _ = Bipartition::new(1, 2, 3);
    }

    #[test]
    fn test_tracker_only_accepts_move_total() {
        let mut tracker = LikelihoodTracker::new(-10.0);
        tracker.record(-2.0, false);
        assert_eq!(tracker.value(), -10.0);
        assert_eq!(tracker.last_delta(), -2.0);

        tracker.record(1.5, true);
        assert_eq!(tracker.value(), -8.5);
        assert_eq!(tracker.last_delta(), 1.5);
    }
}
