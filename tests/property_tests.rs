//! Property-based tests for hrg-fit
//!
//! Verifies dendrogram and likelihood invariants hold for arbitrary simple
//! graphs and arbitrary chain lengths

use approx::assert_abs_diff_eq;
use hrg_fit::{probability_matrix, CsrGraph, Dendrogram, McmcSampler, NodeId};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;

// Property: the arena stays a full binary tree over all nodes after any
// sequence of steps
proptest! {
    #[test]
    fn prop_structure_preserved(graph in prop_simple_graph(2..30usize, 0..80usize),
                                seed in any::<u64>(),
                                steps in 0..300usize) {
        let mut dendrogram = Dendrogram::build(&graph, &mut StdRng::seed_from_u64(seed)).unwrap();
        let mut sampler = McmcSampler::new(seed, graph.num_nodes());

        for _ in 0..steps {
            sampler.step(&mut dendrogram);
        }

        prop_assert_eq!(dendrogram.num_internal(), graph.num_nodes() - 1);
        prop_assert!(dendrogram.internal(dendrogram.root()).parent().is_none());
        prop_assert_eq!(
            dendrogram.internal(dendrogram.root()).split().num_leaves(),
            graph.num_nodes()
        );
        prop_assert!(dendrogram.verify().is_ok(), "{:?}", dendrogram.verify());
    }
}

// Property: the incrementally maintained L equals a from-scratch recount
proptest! {
    #[test]
    fn prop_incremental_likelihood_exact(graph in prop_simple_graph(2..25usize, 0..60usize),
                                         seed in any::<u64>(),
                                         steps in 1..300usize) {
        let mut dendrogram = Dendrogram::build(&graph, &mut StdRng::seed_from_u64(seed)).unwrap();
        let mut sampler = McmcSampler::new(seed.wrapping_add(1), graph.num_nodes());

        for _ in 0..steps {
            let outcome = sampler.step(&mut dendrogram);
            prop_assert!(outcome.delta_l.is_finite());
        }

        assert_abs_diff_eq!(
            dendrogram.log_likelihood(),
            dendrogram.recompute_log_likelihood(),
            epsilon = 1e-6
        );
        prop_assert!(dendrogram.log_likelihood() <= 1e-9);
    }
}

// Property: edge counts partition the graph's edges over internal nodes
proptest! {
    #[test]
    fn prop_edge_counts_sum_to_num_edges(graph in prop_simple_graph(2..30usize, 0..80usize),
                                         seed in any::<u64>()) {
        let mut dendrogram = Dendrogram::build(&graph, &mut StdRng::seed_from_u64(seed)).unwrap();
        let mut sampler = McmcSampler::new(seed, graph.num_nodes());
        for _ in 0..100 {
            sampler.step(&mut dendrogram);
        }

        let total: usize = dendrogram
            .internal_nodes()
            .iter()
            .map(|node| node.split().edges)
            .sum();
        prop_assert_eq!(total, graph.num_edges());
    }
}

// Property: the probability matrix is symmetric, in [0, 1], zero on the
// diagonal and positive on every edge
proptest! {
    #[test]
    fn prop_probability_matrix_well_formed(graph in prop_simple_graph(2..20usize, 0..50usize),
                                           seed in any::<u64>()) {
        let mut dendrogram = Dendrogram::build(&graph, &mut StdRng::seed_from_u64(seed)).unwrap();
        let mut sampler = McmcSampler::new(seed, graph.num_nodes());
        for _ in 0..50 {
            sampler.step(&mut dendrogram);
        }

        let m = probability_matrix(&dendrogram);
        let n = graph.num_nodes();
        prop_assert_eq!(m.dim(), (n, n));
        for u in 0..n {
            prop_assert_eq!(m[[u, u]], 0.0);
            for v in 0..n {
                prop_assert!((0.0..=1.0).contains(&m[[u, v]]));
                prop_assert_eq!(m[[u, v]], m[[v, u]]);
            }
        }
        for (u, v) in graph.iter_edges() {
            prop_assert!(m[[u.index(), v.index()]] > 0.0);
        }
    }
}

// Property: same seed, same graph => identical outcomes and final tree
proptest! {
    #[test]
    fn prop_deterministic_given_seed(graph in prop_simple_graph(2..20usize, 0..40usize),
                                     seed in any::<u64>()) {
        let run = || {
            let mut dendrogram =
                Dendrogram::build(&graph, &mut StdRng::seed_from_u64(seed)).unwrap();
            let mut sampler = McmcSampler::new(seed, graph.num_nodes());
            let outcomes: Vec<_> = (0..200).map(|_| sampler.step(&mut dendrogram)).collect();
            (outcomes, dendrogram.to_newick(), probability_matrix(&dendrogram))
        };

        let (outcomes_a, newick_a, matrix_a) = run();
        let (outcomes_b, newick_b, matrix_b) = run();
        prop_assert_eq!(outcomes_a, outcomes_b);
        prop_assert_eq!(newick_a, newick_b);
        prop_assert_eq!(matrix_a, matrix_b);
    }
}

/// Strategy for simple undirected graphs: no self-loops, no duplicates
fn prop_simple_graph(
    num_nodes: impl Strategy<Value = usize>,
    num_edges: impl Strategy<Value = usize>,
) -> impl Strategy<Value = CsrGraph> {
    (num_nodes, num_edges).prop_flat_map(|(n, m)| {
        #[allow(clippy::cast_possible_truncation)]
        let max_node = n as u32;
        prop::collection::vec((0..max_node, 0..max_node), 0..=m).prop_map(move |pairs| {
            let unique: BTreeSet<(u32, u32)> = pairs
                .into_iter()
                .filter(|(u, v)| u != v)
                .map(|(u, v)| (u.min(v), u.max(v)))
                .collect();
            let edges: Vec<_> = unique.into_iter().map(|(u, v)| (NodeId(u), NodeId(v))).collect();
            CsrGraph::from_edge_list(n, &edges).unwrap()
        })
    })
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_two_leaf_tree_never_moves() {
        let graph = CsrGraph::from_edge_list(2, &[(NodeId(0), NodeId(1))]).unwrap();
        let mut dendrogram = Dendrogram::build(&graph, &mut StdRng::seed_from_u64(0)).unwrap();
        let mut sampler = McmcSampler::new(0, 2);

        for _ in 0..10 {
            let outcome = sampler.step(&mut dendrogram);
            assert!(!outcome.accepted);
            assert_eq!(outcome.delta_l, 0.0);
        }
        assert_eq!(dendrogram.num_internal(), 1);
        assert_eq!(dendrogram.log_likelihood(), 0.0);
    }
}
