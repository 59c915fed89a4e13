//! Pairwise connection probabilities implied by a dendrogram
//!
//! Two leaves `u` and `v` connect with the probability `p_r` of their lowest
//! common ancestor `r`. Every internal node is the lowest common ancestor of
//! exactly the pairs it splits (left leaf, right leaf), so one pass over the
//! internal nodes fills the whole matrix.

use super::dendrogram::Dendrogram;
use ndarray::Array2;

/// Symmetric `|V| x |V|` matrix of `p_r` at each pair's point of divergence
///
/// Rows and columns follow graph node order; the diagonal is 0.
///
/// # Example
///
/// ```
/// use hrg_fit::{probability_matrix, CsrGraph, Dendrogram, NodeId};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let graph = CsrGraph::from_edge_list(3, &[(NodeId(0), NodeId(1))]).unwrap();
/// let dendrogram = Dendrogram::build(&graph, &mut StdRng::seed_from_u64(1)).unwrap();
///
/// let m = probability_matrix(&dendrogram);
/// assert_eq!(m.dim(), (3, 3));
/// assert_eq!(m[[0, 1]], m[[1, 0]]);
/// assert_eq!(m[[2, 2]], 0.0);
/// ```
#[must_use]
pub fn probability_matrix(dendrogram: &Dendrogram<'_>) -> Array2<f64> {
    let n = dendrogram.num_leaves();
    let mut matrix = Array2::zeros((n, n));
    let mut left = Vec::new();
    let mut right = Vec::new();

    for node in dendrogram.internal_nodes() {
        let p = node.probability();
        if p == 0.0 {
            continue;
        }
        dendrogram.collect_leaves(node.left(), &mut left);
        dendrogram.collect_leaves(node.right(), &mut right);
        for &u in &left {
            for &v in &right {
                matrix[[u, v]] = p;
                matrix[[v, u]] = p;
            }
        }
    }

    matrix
}

/// Entrywise running sum of probability snapshots
#[derive(Debug, Clone)]
pub struct ProbabilityAccumulator {
    sum: Array2<f64>,
    samples: usize,
}

impl ProbabilityAccumulator {
    /// Empty accumulator for `num_nodes` nodes
    #[must_use]
    pub fn new(num_nodes: usize) -> Self {
        Self {
            sum: Array2::zeros((num_nodes, num_nodes)),
            samples: 0,
        }
    }

    /// Add a snapshot of the dendrogram's current matrix
    ///
    /// # Panics
    ///
    /// Panics if the dendrogram's node count differs from the accumulator's
    pub fn add_snapshot(&mut self, dendrogram: &Dendrogram<'_>) {
        self.add_matrix(&probability_matrix(dendrogram));
    }

    /// Add an already computed snapshot
    ///
    /// # Panics
    ///
    /// Panics if `matrix` does not have the accumulator's shape
    pub fn add_matrix(&mut self, matrix: &Array2<f64>) {
        assert_eq!(matrix.dim(), self.sum.dim(), "snapshot shape mismatch");
        self.sum += matrix;
        self.samples += 1;
    }

    /// Snapshots added so far
    #[must_use]
    pub const fn samples(&self) -> usize {
        self.samples
    }

    /// Entrywise mean of all snapshots (`None` before the first one)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<Array2<f64>> {
        if self.samples == 0 {
            return None;
        }
        Some(&self.sum / self.samples as f64)
    }
}
