//! Metropolis sampler over dendrogram topologies
//!
//! One step picks a non-root internal node `r` with parent `s`. Writing
//! `r = (A, B)` and `C` for the sibling of `r`, the current arrangement is
//! `s = ((A, B), C)`. The step proposes one of the two other nestings,
//! `((C, B), A)` or `((A, C), B)`, uniformly, by exchanging one child of `r`
//! with `C`. Only `r` and `s` change their bipartition, so `deltaL` is
//! computed from those two nodes alone.
//!
//! The proposal is symmetric (the same node and exchange undo it), so the
//! chain targets a stationary distribution proportional to `exp(L)` when
//! moves are accepted with probability `min(1, exp(deltaL))`.
//!
//! A proposal is staged as a [`ProposedMove`] without touching the tree;
//! rejection simply drops it.

use super::dendrogram::{Dendrogram, LeafScratch, TreeNode};
use super::likelihood::Bipartition;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A staged rearrangement of one internal node and its parent
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedMove {
    pub(crate) child: usize,
    pub(crate) parent: usize,
    pub(crate) moved_out: TreeNode,
    pub(crate) moved_in: TreeNode,
    pub(crate) child_split: Bipartition,
    pub(crate) parent_split: Bipartition,
    pub(crate) delta_l: f64,
}

impl ProposedMove {
    /// Internal node `r` whose child is exchanged
    #[must_use]
    pub const fn child(&self) -> usize {
        self.child
    }

    /// Parent `s` of `r`
    #[must_use]
    pub const fn parent(&self) -> usize {
        self.parent
    }

    /// Child of `r` that moves up to become a child of `s`
    #[must_use]
    pub const fn moved_out(&self) -> TreeNode {
        self.moved_out
    }

    /// Former sibling of `r` that moves down under `r`
    #[must_use]
    pub const fn moved_in(&self) -> TreeNode {
        self.moved_in
    }

    /// Bipartitions `r` and `s` would have after the move
    #[must_use]
    pub const fn staged_splits(&self) -> (Bipartition, Bipartition) {
        (self.child_split, self.parent_split)
    }

    /// Proposed `L` minus current `L`
    #[must_use]
    pub const fn delta_l(&self) -> f64 {
        self.delta_l
    }
}

/// Result of one MCMC step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// Whether the proposal was committed
    pub accepted: bool,
    /// `deltaL` of the proposal, reported even when rejected
    pub delta_l: f64,
}

/// Metropolis rule: accept with probability `min(1, exp(delta_l))`
///
/// Non-negative deltas are accepted without consuming randomness.
///
/// # Example
///
/// ```
/// use hrg_fit::metropolis_accept;
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mut rng = StdRng::seed_from_u64(0);
/// assert!(metropolis_accept(0.0, &mut rng));
/// assert!(metropolis_accept(3.5, &mut rng));
/// assert!(!metropolis_accept(f64::NEG_INFINITY, &mut rng));
/// ```
pub fn metropolis_accept<R: Rng>(delta_l: f64, rng: &mut R) -> bool {
    if delta_l >= 0.0 {
        return true;
    }
    rng.random::<f64>() < delta_l.exp()
}

/// Single-chain Metropolis sampler
///
/// Owns the chain's random source, so a fixed seed gives a fixed sequence
/// of proposals and acceptance draws.
#[derive(Debug)]
pub struct McmcSampler {
    rng: StdRng,
    scratch: LeafScratch,
    steps: u64,
    accepted: u64,
}

impl McmcSampler {
    /// Sampler seeded from `seed`, sized for `num_leaves` leaves
    #[must_use]
    pub fn new(seed: u64, num_leaves: usize) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed), num_leaves)
    }

    /// Sampler continuing an existing random stream
    #[must_use]
    pub fn from_rng(rng: StdRng, num_leaves: usize) -> Self {
        Self {
            rng,
            scratch: LeafScratch::new(num_leaves),
            steps: 0,
            accepted: 0,
        }
    }

    /// Steps taken so far
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Accepted steps so far
    #[must_use]
    pub const fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Fraction of steps accepted (0 before the first step)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn acceptance_rate(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            self.accepted as f64 / self.steps as f64
        }
    }

    /// Stage a random rearrangement without modifying the dendrogram
    ///
    /// Returns `None` when the tree has no non-root internal node (two leaves).
    ///
    /// # Panics
    ///
    /// Panics if `dendrogram` has more leaves than this sampler was sized for
    pub fn propose(&mut self, dendrogram: &Dendrogram<'_>) -> Option<ProposedMove> {
        let m = dendrogram.num_internal();
        if m < 2 {
            return None;
        }

        let root = dendrogram.root();
        let mut child = self.rng.random_range(0..m - 1);
        if child >= root {
            child += 1;
        }
        let r = dendrogram.internal(child);
        let parent = r.parent()?;
        let s = dendrogram.internal(parent);

        let moved_in = if s.left() == TreeNode::Internal(child) {
            s.right()
        } else {
            s.left()
        };
        let moved_out = if self.rng.random::<bool>() {
            r.left()
        } else {
            r.right()
        };

        // e(X, C) splits s's cross edges into the part that stays at s and
        // the part that moves down to r
        let e_out_in = dendrogram.count_edges_between(moved_out, moved_in, &mut self.scratch);
        let e_r = r.split().edges;
        let e_s = s.split().edges;
        assert!(
            e_out_in <= e_s,
            "subtree edge count {e_out_in} exceeds parent count {e_s} at node {parent}"
        );

        let (child_split, parent_split) = dendrogram.staged_splits(
            child,
            parent,
            moved_out,
            moved_in,
            e_s - e_out_in,
            e_r + e_out_in,
        );
        let delta_l = child_split.log_likelihood() + parent_split.log_likelihood()
            - r.log_likelihood()
            - s.log_likelihood();

        Some(ProposedMove {
            child,
            parent,
            moved_out,
            moved_in,
            child_split,
            parent_split,
            delta_l,
        })
    }

    /// Propose, then commit or discard by the Metropolis rule
    pub fn step(&mut self, dendrogram: &mut Dendrogram<'_>) -> StepOutcome {
        self.steps += 1;

        let Some(mv) = self.propose(dendrogram) else {
            dendrogram.reject(0.0);
            return StepOutcome {
                accepted: false,
                delta_l: 0.0,
            };
        };

        let accepted = metropolis_accept(mv.delta_l, &mut self.rng);
        if accepted {
            dendrogram.commit(&mv);
            self.accepted += 1;
        } else {
            dendrogram.reject(mv.delta_l);
        }

        StepOutcome {
            accepted,
            delta_l: mv.delta_l,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CsrGraph, NodeId};
    use approx::assert_abs_diff_eq;

    fn two_triangles() -> CsrGraph {
        let edges = [(0, 1), (0, 2), (1, 2), (3, 4), (3, 5), (4, 5), (2, 3)]
            .map(|(u, v)| (NodeId(u), NodeId(v)));
        CsrGraph::from_edge_list(6, &edges).unwrap()
    }

    #[test]
    fn test_propose_does_not_mutate() {
        let graph = two_triangles();
        let mut sampler = McmcSampler::new(9, graph.num_nodes());
        let d = Dendrogram::build(&graph, &mut StdRng::seed_from_u64(9)).unwrap();
        let before = d.to_newick();
        let l_before = d.log_likelihood();

        for _ in 0..50 {
            let mv = sampler.propose(&d).unwrap();
            assert_ne!(mv.child(), d.root());
            assert_eq!(d.internal(mv.child()).parent(), Some(mv.parent()));
        }

        assert_eq!(d.to_newick(), before);
        assert_eq!(d.log_likelihood(), l_before);
        d.verify().unwrap();
    }

    #[test]
    fn test_delta_matches_committed_change() {
        let graph = two_triangles();
        let mut sampler = McmcSampler::new(4, graph.num_nodes());
        let mut d = Dendrogram::build(&graph, &mut StdRng::seed_from_u64(4)).unwrap();

        for _ in 0..200 {
            let mv = sampler.propose(&d).unwrap();
            let before = d.recompute_log_likelihood();
            d.commit(&mv);
            d.verify().unwrap();
            let after = d.recompute_log_likelihood();
            assert_abs_diff_eq!(after - before, mv.delta_l(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_move_is_self_inverse() {
        // Exchanging the moved-in subtree back restores the original topology
        let graph = two_triangles();
        let mut sampler = McmcSampler::new(21, graph.num_nodes());
        let mut d = Dendrogram::build(&graph, &mut StdRng::seed_from_u64(21)).unwrap();
        let original = d.to_newick();

        let mv = sampler.propose(&d).unwrap();
        d.commit(&mv);

        let e_back = d.count_edges_between(mv.moved_in(), mv.moved_out(), &mut sampler.scratch);
        let (child_split, parent_split) = d.staged_splits(
            mv.child(),
            mv.parent(),
            mv.moved_in(),
            mv.moved_out(),
            d.internal(mv.parent()).split().edges - e_back,
            d.internal(mv.child()).split().edges + e_back,
        );

        let undo = ProposedMove {
            child: mv.child(),
            parent: mv.parent(),
            moved_out: mv.moved_in(),
            moved_in: mv.moved_out(),
            child_split,
            parent_split,
            delta_l: -mv.delta_l(),
        };
        d.commit(&undo);

        assert_eq!(d.to_newick(), original);
        d.verify().unwrap();
    }

    #[test]
    fn test_two_leaves_has_no_move() {
        let graph = CsrGraph::from_edge_list(2, &[(NodeId(0), NodeId(1))]).unwrap();
        let mut d = Dendrogram::build(&graph, &mut StdRng::seed_from_u64(0)).unwrap();
        let mut sampler = McmcSampler::new(0, 2);

        assert!(sampler.propose(&d).is_none());
        let outcome = sampler.step(&mut d);
        assert!(!outcome.accepted);
        assert_eq!(outcome.delta_l, 0.0);
        assert_eq!(sampler.steps(), 1);
    }

    #[test]
    fn test_step_rejection_leaves_tree_untouched() {
        let graph = two_triangles();
        let mut d = Dendrogram::build(&graph, &mut StdRng::seed_from_u64(8)).unwrap();
        let mut sampler = McmcSampler::new(8, graph.num_nodes());

        for _ in 0..500 {
            let before = d.to_newick();
            let l_before = d.log_likelihood();
            let outcome = sampler.step(&mut d);
            assert_eq!(d.last_delta(), outcome.delta_l);
            if outcome.accepted {
                assert_abs_diff_eq!(d.log_likelihood(), l_before + outcome.delta_l);
            } else {
                assert_eq!(d.to_newick(), before);
                assert_eq!(d.log_likelihood(), l_before);
            }
        }
        d.verify().unwrap();
        assert_eq!(sampler.steps(), 500);
        assert!(sampler.accepted() > 0);
        assert!(sampler.acceptance_rate() <= 1.0);
    }

    #[test]
    fn test_non_negative_delta_always_accepted() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..1000 {
            assert!(metropolis_accept(0.0, &mut rng));
            assert!(metropolis_accept(1e-12, &mut rng));
        }
    }

    #[test]
    fn test_acceptance_frequency_matches_exp_delta() {
        let mut rng = StdRng::seed_from_u64(2024);
        let trials = 40_000;
        for delta in [-0.1_f64, -0.7, -2.0] {
            let hits = (0..trials)
                .filter(|_| metropolis_accept(delta, &mut rng))
                .count();
            #[allow(clippy::cast_precision_loss)]
            let freq = hits as f64 / f64::from(trials);
            // 5 standard errors of a Bernoulli(exp(delta)) mean
            let p = delta.exp();
            let tol = 5.0 * (p * (1.0 - p) / f64::from(trials)).sqrt();
            assert!(
                (freq - p).abs() < tol,
                "delta {delta}: frequency {freq}, expected {p}"
            );
        }
    }
}
