//! Dendrogram arena
//!
//! A full binary tree over the graph's nodes. Leaves are the graph nodes
//! themselves (leaf `i` is `NodeId(i)`), internal nodes live in one `Vec`
//! and refer to children and parents by index. Internal indices never
//! change after construction; MCMC moves only rewire links, and the root
//! keeps its index for the lifetime of the tree.
//!
//! Every internal node caches the [`Bipartition`] its children induce and
//! that bipartition's log-likelihood contribution.

use super::likelihood::{Bipartition, LikelihoodTracker};
use super::mcmc::ProposedMove;
use crate::error::InputError;
use crate::storage::{CsrGraph, NodeId};
use log::debug;
use rand::Rng;
use std::fmt::Write;

/// Position in the dendrogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeNode {
    /// Graph node index
    Leaf(usize),
    /// Index into the internal node table
    Internal(usize),
}

/// Internal dendrogram node
#[derive(Debug, Clone)]
pub struct InternalNode {
    left: TreeNode,
    right: TreeNode,
    parent: Option<usize>,
    split: Bipartition,
    log_likelihood: f64,
}

impl InternalNode {
    fn new(left: TreeNode, right: TreeNode, split: Bipartition) -> Self {
        Self {
            left,
            right,
            parent: None,
            split,
            log_likelihood: split.log_likelihood(),
        }
    }

    fn set_split(&mut self, split: Bipartition) {
        self.split = split;
        self.log_likelihood = split.log_likelihood();
    }

    /// Left child
    #[must_use]
    pub const fn left(&self) -> TreeNode {
        self.left
    }

    /// Right child
    #[must_use]
    pub const fn right(&self) -> TreeNode {
        self.right
    }

    /// Parent index (`None` for the root)
    #[must_use]
    pub const fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Cached `(n_L, n_R, e_r)`
    #[must_use]
    pub const fn split(&self) -> Bipartition {
        self.split
    }

    /// MLE connection probability `p_r`
    #[must_use]
    pub fn probability(&self) -> f64 {
        self.split.probability()
    }

    /// Cached contribution to the total log-likelihood
    #[must_use]
    pub const fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }
}

/// Reusable buffers for counting edges between two subtrees
#[derive(Debug, Default)]
pub(crate) struct LeafScratch {
    marks: Vec<u32>,
    stamp: u32,
    small: Vec<usize>,
    large: Vec<usize>,
    stack: Vec<TreeNode>,
}

impl LeafScratch {
    pub(crate) fn new(num_leaves: usize) -> Self {
        Self {
            marks: vec![0; num_leaves],
            ..Self::default()
        }
    }

    fn next_stamp(&mut self) -> u32 {
        self.stamp = self.stamp.wrapping_add(1);
        if self.stamp == 0 {
            self.marks.fill(0);
            self.stamp = 1;
        }
        self.stamp
    }
}

/// Hierarchical random graph: dendrogram plus its likelihood bookkeeping
///
/// # Example
///
/// ```
/// use hrg_fit::{CsrGraph, Dendrogram, NodeId};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let graph = CsrGraph::from_edge_list(3, &[(NodeId(0), NodeId(1))]).unwrap();
/// let mut rng = StdRng::seed_from_u64(7);
/// let dendrogram = Dendrogram::build(&graph, &mut rng).unwrap();
///
/// assert_eq!(dendrogram.num_leaves(), 3);
/// assert_eq!(dendrogram.num_internal(), 2);
/// assert!(dendrogram.verify().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Dendrogram<'g> {
    graph: &'g CsrGraph,
    internals: Vec<InternalNode>,
    leaf_parent: Vec<usize>,
    root: usize,
    likelihood: LikelihoodTracker,
}

impl<'g> Dendrogram<'g> {
    /// Build a random initial dendrogram by repeatedly merging two randomly
    /// chosen subtrees until one remains
    ///
    /// # Errors
    ///
    /// Returns `InputError::DegenerateInput` if the graph has fewer than 2 nodes
    pub fn build<R: Rng>(graph: &'g CsrGraph, rng: &mut R) -> Result<Self, InputError> {
        let n = graph.num_nodes();
        if n < 2 {
            return Err(InputError::DegenerateInput { num_nodes: n });
        }

        let mut internals: Vec<InternalNode> = Vec::with_capacity(n - 1);
        let mut leaf_parent = vec![usize::MAX; n];

        // group[leaf] names the pending subtree holding it; members[g] lists
        // that subtree's leaves. Smaller groups are folded into larger ones.
        let mut group: Vec<usize> = (0..n).collect();
        let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
        let mut pool: Vec<(TreeNode, usize)> = (0..n).map(|i| (TreeNode::Leaf(i), i)).collect();

        while pool.len() > 1 {
            let (a, group_a) = pool.swap_remove(rng.random_range(0..pool.len()));
            let (b, group_b) = pool.swap_remove(rng.random_range(0..pool.len()));

            let (small, large) = if members[group_a].len() <= members[group_b].len() {
                (group_a, group_b)
            } else {
                (group_b, group_a)
            };
            let edges: usize = members[small]
                .iter()
                .map(|&u| {
                    graph
                        .neighbor_slice(u)
                        .iter()
                        .filter(|&&v| group[v as usize] == large)
                        .count()
                })
                .sum();

            let split = Bipartition::new(members[group_a].len(), members[group_b].len(), edges);
            let idx = internals.len();
            internals.push(InternalNode::new(a, b, split));
            for child in [a, b] {
                match child {
                    TreeNode::Leaf(leaf) => leaf_parent[leaf] = idx,
                    TreeNode::Internal(i) => internals[i].parent = Some(idx),
                }
            }

            let moved = std::mem::take(&mut members[small]);
            for &leaf in &moved {
                group[leaf] = large;
            }
            members[large].extend(moved);
            pool.push((TreeNode::Internal(idx), large));
        }

        let total: f64 = internals.iter().map(InternalNode::log_likelihood).sum();
        let root = internals.len() - 1;
        debug!(
            "built dendrogram: {} leaves, {} internal nodes, L = {:.3}",
            n,
            internals.len(),
            total
        );

        Ok(Self {
            graph,
            internals,
            leaf_parent,
            root,
            likelihood: LikelihoodTracker::new(total),
        })
    }

    /// Graph the dendrogram was built from
    #[must_use]
    pub const fn graph(&self) -> &'g CsrGraph {
        self.graph
    }

    /// Number of leaves (= graph nodes)
    #[must_use]
    pub fn num_leaves(&self) -> usize {
        self.leaf_parent.len()
    }

    /// Number of internal nodes (= leaves - 1)
    #[must_use]
    pub fn num_internal(&self) -> usize {
        self.internals.len()
    }

    /// Index of the root internal node
    #[must_use]
    pub const fn root(&self) -> usize {
        self.root
    }

    /// Internal node by index
    ///
    /// # Panics
    ///
    /// Panics if `idx >= num_internal()`
    #[must_use]
    pub fn internal(&self, idx: usize) -> &InternalNode {
        &self.internals[idx]
    }

    /// All internal nodes, indexed as in [`TreeNode::Internal`]
    #[must_use]
    pub fn internal_nodes(&self) -> &[InternalNode] {
        &self.internals
    }

    /// Parent of any tree position (`None` for the root)
    #[must_use]
    pub fn parent_of(&self, node: TreeNode) -> Option<usize> {
        match node {
            TreeNode::Leaf(leaf) => self.leaf_parent.get(leaf).copied(),
            TreeNode::Internal(i) => self.internals[i].parent,
        }
    }

    /// Number of leaves under a tree position
    #[must_use]
    pub fn subtree_size(&self, node: TreeNode) -> usize {
        match node {
            TreeNode::Leaf(_) => 1,
            TreeNode::Internal(i) => self.internals[i].split.num_leaves(),
        }
    }

    /// Incrementally maintained log-likelihood `L`
    #[must_use]
    pub const fn log_likelihood(&self) -> f64 {
        self.likelihood.value()
    }

    /// `deltaL` of the most recent MCMC proposal
    #[must_use]
    pub const fn last_delta(&self) -> f64 {
        self.likelihood.last_delta()
    }

    /// Leaves under `node`, appended to `out` after clearing it
    pub fn collect_leaves(&self, node: TreeNode, out: &mut Vec<usize>) {
        let mut stack = Vec::new();
        self.gather_leaves(node, out, &mut stack);
    }

    fn gather_leaves(&self, node: TreeNode, out: &mut Vec<usize>, stack: &mut Vec<TreeNode>) {
        out.clear();
        stack.clear();
        stack.push(node);
        while let Some(current) = stack.pop() {
            match current {
                TreeNode::Leaf(leaf) => out.push(leaf),
                TreeNode::Internal(i) => {
                    stack.push(self.internals[i].right);
                    stack.push(self.internals[i].left);
                }
            }
        }
    }

    /// Count observed edges with one endpoint under `a` and the other under `b`
    /// (`a` and `b` must be disjoint subtrees)
    pub(crate) fn count_edges_between(
        &self,
        a: TreeNode,
        b: TreeNode,
        scratch: &mut LeafScratch,
    ) -> usize {
        let (small_root, large_root) = if self.subtree_size(a) <= self.subtree_size(b) {
            (a, b)
        } else {
            (b, a)
        };

        let stamp = scratch.next_stamp();
        let LeafScratch {
            marks,
            small,
            large,
            stack,
            ..
        } = scratch;

        self.gather_leaves(large_root, large, stack);
        for &leaf in large.iter() {
            marks[leaf] = stamp;
        }

        self.gather_leaves(small_root, small, stack);
        small
            .iter()
            .map(|&u| {
                self.graph
                    .neighbor_slice(u)
                    .iter()
                    .filter(|&&v| marks[v as usize] == stamp)
                    .count()
            })
            .sum()
    }

    /// Bipartitions of `child` and its parent after swapping `moved_out`
    /// (a child of `child`) with `moved_in` (the sibling of `child`), keeping
    /// each slot's left/right orientation
    pub(crate) fn staged_splits(
        &self,
        child: usize,
        parent: usize,
        moved_out: TreeNode,
        moved_in: TreeNode,
        child_edges: usize,
        parent_edges: usize,
    ) -> (Bipartition, Bipartition) {
        let r = &self.internals[child];
        let out_is_left = r.left == moved_out;
        let kept = if out_is_left { r.right } else { r.left };

        let n_kept = self.subtree_size(kept);
        let n_in = self.subtree_size(moved_in);
        let n_out = self.subtree_size(moved_out);

        let child_split = if out_is_left {
            Bipartition::new(n_in, n_kept, child_edges)
        } else {
            Bipartition::new(n_kept, n_in, child_edges)
        };

        let parent_split = if self.internals[parent].left == moved_in {
            Bipartition::new(n_out, n_kept + n_in, parent_edges)
        } else {
            Bipartition::new(n_kept + n_in, n_out, parent_edges)
        };

        (child_split, parent_split)
    }

    /// Apply an accepted proposal
    pub(crate) fn commit(&mut self, mv: &ProposedMove) {
        let r = &mut self.internals[mv.child];
        if r.left == mv.moved_out {
            r.left = mv.moved_in;
        } else {
            assert_eq!(r.right, mv.moved_out, "stale proposal for node {}", mv.child);
            r.right = mv.moved_in;
        }
        r.set_split(mv.child_split);

        let s = &mut self.internals[mv.parent];
        if s.left == mv.moved_in {
            s.left = mv.moved_out;
        } else {
            assert_eq!(s.right, mv.moved_in, "stale proposal for node {}", mv.parent);
            s.right = mv.moved_out;
        }
        s.set_split(mv.parent_split);

        self.set_parent(mv.moved_out, mv.parent);
        self.set_parent(mv.moved_in, mv.child);
        self.likelihood.record(mv.delta_l, true);
    }

    /// Note a rejected (or impossible) proposal's delta
    pub(crate) fn reject(&mut self, delta_l: f64) {
        self.likelihood.record(delta_l, false);
    }

    fn set_parent(&mut self, node: TreeNode, parent: usize) {
        match node {
            TreeNode::Leaf(leaf) => self.leaf_parent[leaf] = parent,
            TreeNode::Internal(i) => self.internals[i].parent = Some(parent),
        }
    }

    fn internal_depth(&self, mut idx: usize) -> usize {
        let mut depth = 0;
        while let Some(parent) = self.internals[idx].parent {
            idx = parent;
            depth += 1;
        }
        depth
    }

    /// Index of the lowest internal node whose subtree holds both leaves
    ///
    /// Returns `None` when `u == v` or either node is out of range.
    #[must_use]
    pub fn lowest_common_ancestor(&self, u: NodeId, v: NodeId) -> Option<usize> {
        if u == v || u.index() >= self.num_leaves() || v.index() >= self.num_leaves() {
            return None;
        }
        let mut a = self.leaf_parent[u.index()];
        let mut b = self.leaf_parent[v.index()];
        let mut depth_a = self.internal_depth(a);
        let mut depth_b = self.internal_depth(b);

        // The root is its own parent here, so both walks stop there at worst
        let up = |i: usize| self.internals[i].parent.unwrap_or(self.root);
        while depth_a > depth_b {
            a = up(a);
            depth_a -= 1;
        }
        while depth_b > depth_a {
            b = up(b);
            depth_b -= 1;
        }
        while a != b {
            a = up(a);
            b = up(b);
        }
        Some(a)
    }

    /// `p_r` at the point where `u` and `v` diverge (0 on the diagonal)
    #[must_use]
    pub fn connection_probability(&self, u: NodeId, v: NodeId) -> f64 {
        self.lowest_common_ancestor(u, v)
            .map_or(0.0, |r| self.internals[r].probability())
    }

    /// Bipartitions recounted from the tree links and the graph, ignoring caches
    fn fresh_bipartitions(&self) -> Vec<Bipartition> {
        let mut leaves_under = vec![0_usize; self.internals.len()];
        for &parent in &self.leaf_parent {
            let mut idx = parent;
            loop {
                leaves_under[idx] += 1;
                match self.internals[idx].parent {
                    Some(p) => idx = p,
                    None => break,
                }
            }
        }

        let mut edges = vec![0_usize; self.internals.len()];
        for (u, v) in self.graph.iter_edges() {
            if let Some(r) = self.lowest_common_ancestor(u, v) {
                edges[r] += 1;
            }
        }

        let size = |node: TreeNode| match node {
            TreeNode::Leaf(_) => 1,
            TreeNode::Internal(i) => leaves_under[i],
        };
        self.internals
            .iter()
            .zip(edges)
            .map(|(node, e)| Bipartition::new(size(node.left), size(node.right), e))
            .collect()
    }

    /// Log-likelihood recomputed from scratch (no cached values used)
    #[must_use]
    pub fn recompute_log_likelihood(&self) -> f64 {
        self.fresh_bipartitions()
            .iter()
            .map(Bipartition::log_likelihood)
            .sum()
    }

    /// Audit every structural and cache invariant
    ///
    /// Checks that internal nodes number leaves - 1, parent and child links
    /// agree, the root reaches every leaf and internal node exactly once, and
    /// every cached bipartition matches a fresh recount.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation found
    pub fn verify(&self) -> Result<(), String> {
        let n = self.num_leaves();
        if self.internals.len() + 1 != n {
            return Err(format!(
                "{} internal nodes for {} leaves",
                self.internals.len(),
                n
            ));
        }
        if self.internals[self.root].parent.is_some() {
            return Err(format!("root {} has a parent", self.root));
        }

        let mut seen_leaves = vec![false; n];
        let mut seen_internal = vec![false; self.internals.len()];
        let mut stack = vec![TreeNode::Internal(self.root)];
        while let Some(node) = stack.pop() {
            match node {
                TreeNode::Leaf(leaf) => {
                    if std::mem::replace(&mut seen_leaves[leaf], true) {
                        return Err(format!("leaf {leaf} reached twice"));
                    }
                }
                TreeNode::Internal(i) => {
                    if std::mem::replace(&mut seen_internal[i], true) {
                        return Err(format!("internal node {i} reached twice"));
                    }
                    let node = &self.internals[i];
                    for child in [node.left, node.right] {
                        if self.parent_of(child) != Some(i) {
                            return Err(format!("{child:?} does not point back to parent {i}"));
                        }
                        stack.push(child);
                    }
                }
            }
        }
        if let Some(leaf) = seen_leaves.iter().position(|seen| !seen) {
            return Err(format!("leaf {leaf} unreachable from root"));
        }
        if let Some(i) = seen_internal.iter().position(|seen| !seen) {
            return Err(format!("internal node {i} unreachable from root"));
        }

        for (i, (node, fresh)) in self
            .internals
            .iter()
            .zip(self.fresh_bipartitions())
            .enumerate()
        {
            if node.split != fresh {
                return Err(format!(
                    "internal node {i}: cached {:?}, recounted {:?}",
                    node.split, fresh
                ));
            }
            if node.log_likelihood.to_bits() != fresh.log_likelihood().to_bits() {
                return Err(format!("internal node {i}: stale log-likelihood"));
            }
        }

        Ok(())
    }

    /// Newick rendering with graph node names at the leaves and `p_r`
    /// (six decimals) as each internal node's label
    #[must_use]
    pub fn to_newick(&self) -> String {
        enum Visit {
            Enter(TreeNode),
            Comma,
            Close(usize),
        }

        let mut out = String::new();
        let mut stack = vec![Visit::Enter(TreeNode::Internal(self.root))];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(TreeNode::Leaf(leaf)) => {
                    let name = self.graph.node_names()[leaf].as_str();
                    out.push_str(&newick_label(name));
                }
                Visit::Enter(TreeNode::Internal(i)) => {
                    out.push('(');
                    stack.push(Visit::Close(i));
                    stack.push(Visit::Enter(self.internals[i].right));
                    stack.push(Visit::Comma);
                    stack.push(Visit::Enter(self.internals[i].left));
                }
                Visit::Comma => out.push(','),
                Visit::Close(i) => {
                    let _ = write!(out, "){:.6}", self.internals[i].probability());
                }
            }
        }
        out.push(';');
        out
    }
}

fn newick_label(name: &str) -> String {
    if name
        .chars()
        .any(|c| c.is_whitespace() || "(),:;'[]".contains(c))
    {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}
