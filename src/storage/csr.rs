//! CSR (Compressed Sparse Row) representation of a simple undirected graph
//!
//! Every undirected edge `u -- v` is stored twice, once in each endpoint's
//! row, and every row is kept sorted so membership tests are a binary search.
//!
//! # CSR Format
//!
//! ```text
//! Graph: 0 -- 1, 0 -- 2, 1 -- 2
//!
//! CSR:
//!   row_offsets: [0, 2, 4, 6]        // Node 0: [0..2), Node 1: [2..4), Node 2: [4..6)
//!   col_indices: [1, 2, 0, 2, 0, 1]
//! ```

use crate::error::InputError;
use std::collections::{HashMap, HashSet};

/// Node identifier (zero-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position of the node in rows, columns and leaf tables
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Immutable simple undirected graph
///
/// Optimized for:
/// - O(1) access to a node's neighbor slice
/// - O(log d) edge membership tests
/// - Stable node order (rows of the probability matrix follow it)
///
/// # Example
///
/// ```
/// use hrg_fit::{CsrGraph, NodeId};
///
/// let graph = CsrGraph::from_edge_list(3, &[(NodeId(0), NodeId(1)), (NodeId(1), NodeId(2))]).unwrap();
///
/// assert!(graph.has_edge(NodeId(1), NodeId(0)));
/// assert!(!graph.has_edge(NodeId(0), NodeId(2)));
/// assert_eq!(graph.neighbors(NodeId(1)).unwrap(), &[0, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct CsrGraph {
    /// node i's neighbors live in `col_indices[row_offsets[i]..row_offsets[i + 1]]`
    /// Length: `num_nodes` + 1
    row_offsets: Vec<u32>,

    /// Neighbor indices, sorted within each row
    /// Length: 2 * `num_edges`
    col_indices: Vec<u32>,

    /// External identifiers (integer or string labels from the input)
    node_names: Vec<String>,

    num_edges: usize,
}

impl CsrGraph {
    /// Create graph with nodes `0..num_nodes` from an undirected edge list
    ///
    /// Node names default to the decimal index.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if an endpoint is out of bounds, an edge is a
    /// self-loop, or the same undirected edge appears twice
    pub fn from_edge_list(num_nodes: usize, edges: &[(NodeId, NodeId)]) -> Result<Self, InputError> {
        let names = (0..num_nodes).map(|i| i.to_string()).collect();
        Self::from_named_edge_list(names, edges)
    }

    /// Create graph whose node `i` is called `node_names[i]`
    ///
    /// # Errors
    ///
    /// Same policy as [`CsrGraph::from_edge_list`]
    pub fn from_named_edge_list(
        node_names: Vec<String>,
        edges: &[(NodeId, NodeId)],
    ) -> Result<Self, InputError> {
        let num_nodes = node_names.len();
        let mut pairs = Vec::with_capacity(edges.len());

        for &(u, v) in edges {
            for node in [u, v] {
                if node.index() >= num_nodes {
                    return Err(InputError::NodeOutOfBounds {
                        node: node.0,
                        num_nodes,
                    });
                }
            }
            if u == v {
                return Err(InputError::SelfLoop(node_names[u.index()].clone()));
            }
            pairs.push((u.0, v.0));
        }

        Self::from_validated(node_names, pairs)
    }

    /// Build CSR arrays; endpoints must already be in bounds and distinct
    fn from_validated(node_names: Vec<String>, mut pairs: Vec<(u32, u32)>) -> Result<Self, InputError> {
        let num_nodes = node_names.len();

        for pair in &mut pairs {
            if pair.0 > pair.1 {
                *pair = (pair.1, pair.0);
            }
        }
        pairs.sort_unstable();
        if let Some(window) = pairs.windows(2).find(|w| w[0] == w[1]) {
            let (u, v) = window[0];
            return Err(InputError::DuplicateEdge(
                node_names[u as usize].clone(),
                node_names[v as usize].clone(),
            ));
        }

        let mut adj_list: Vec<Vec<u32>> = vec![Vec::new(); num_nodes];
        for &(u, v) in &pairs {
            adj_list[u as usize].push(v);
            adj_list[v as usize].push(u);
        }

        let mut row_offsets = Vec::with_capacity(num_nodes + 1);
        let mut col_indices = Vec::with_capacity(2 * pairs.len());

        let mut offset = 0_u32;
        row_offsets.push(offset);

        for mut neighbors in adj_list {
            neighbors.sort_unstable();
            #[allow(clippy::cast_possible_truncation)] // Graphs >4B nodes not supported
            let len_u32 = neighbors.len() as u32;
            offset += len_u32;
            row_offsets.push(offset);
            col_indices.extend(neighbors);
        }

        Ok(Self {
            row_offsets,
            col_indices,
            node_names,
            num_edges: pairs.len(),
        })
    }

    /// Get neighbors of a node (sorted ascending)
    ///
    /// # Errors
    ///
    /// Returns error if node ID is out of bounds
    pub fn neighbors(&self, node: NodeId) -> Result<&[u32], InputError> {
        if node.index() >= self.num_nodes() {
            return Err(InputError::NodeOutOfBounds {
                node: node.0,
                num_nodes: self.num_nodes(),
            });
        }
        Ok(self.neighbor_slice(node.index()))
    }

    /// Unchecked neighbor lookup for the sampler's inner loops
    pub(crate) fn neighbor_slice(&self, idx: usize) -> &[u32] {
        let start = self.row_offsets[idx] as usize;
        let end = self.row_offsets[idx + 1] as usize;
        &self.col_indices[start..end]
    }

    /// Edge membership test (symmetric, false for out-of-bounds nodes)
    #[must_use]
    pub fn has_edge(&self, u: NodeId, v: NodeId) -> bool {
        if u.index() >= self.num_nodes() || v.index() >= self.num_nodes() {
            return false;
        }
        self.neighbor_slice(u.index()).binary_search(&v.0).is_ok()
    }

    /// Degree of a node (0 for out-of-bounds nodes)
    #[must_use]
    pub fn degree(&self, node: NodeId) -> usize {
        self.neighbors(node).map_or(0, <[u32]>::len)
    }

    /// Get node name
    #[must_use]
    pub fn get_node_name(&self, node: NodeId) -> Option<&str> {
        self.node_names.get(node.index()).map(String::as_str)
    }

    /// All node names in node order
    #[must_use]
    pub fn node_names(&self) -> &[String] {
        &self.node_names
    }

    /// Look up a node by its external identifier
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.node_names
            .iter()
            .position(|n| n == name)
            .map(|i| NodeId(i as u32))
    }

    /// Get number of nodes
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.node_names.len()
    }

    /// Get number of undirected edges
    #[must_use]
    pub const fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// Iterate each undirected edge once as `(u, v)` with `u < v`
    pub fn iter_edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        (0..self.num_nodes()).flat_map(move |u| {
            #[allow(clippy::cast_possible_truncation)]
            let u32_id = u as u32;
            self.neighbor_slice(u)
                .iter()
                .filter(move |&&v| v > u32_id)
                .map(move |&v| (NodeId(u32_id), NodeId(v)))
        })
    }

    /// Get CSR components `(row_offsets, col_indices)`
    #[must_use]
    pub fn csr_components(&self) -> (&[u32], &[u32]) {
        (&self.row_offsets, &self.col_indices)
    }
}

/// Incremental builder for graphs keyed by external node identifiers
///
/// Nodes are numbered in order of first appearance.
///
/// # Example
///
/// ```
/// use hrg_fit::GraphBuilder;
///
/// let mut builder = GraphBuilder::new();
/// builder.add_edge("alice", "bob").unwrap();
/// builder.add_edge("bob", "carol").unwrap();
/// builder.add_node("dave"); // isolated
///
/// let graph = builder.build().unwrap();
/// assert_eq!(graph.num_nodes(), 4);
/// assert_eq!(graph.num_edges(), 2);
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    index: HashMap<String, NodeId>,
    names: Vec<String>,
    edges: Vec<(u32, u32)>,
    seen: HashSet<(u32, u32)>,
}

impl GraphBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a node, returning its id (existing id if already known)
    pub fn add_node(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        #[allow(clippy::cast_possible_truncation)] // Graphs >4B nodes not supported
        let id = NodeId(self.names.len() as u32);
        self.index.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    /// Add an undirected edge, interning both endpoints
    ///
    /// # Errors
    ///
    /// Returns `InputError::SelfLoop` if both endpoints are the same node and
    /// `InputError::DuplicateEdge` if the undirected edge was already added
    pub fn add_edge(&mut self, a: &str, b: &str) -> Result<(), InputError> {
        if a == b {
            return Err(InputError::SelfLoop(a.to_string()));
        }
        let u = self.add_node(a).0;
        let v = self.add_node(b).0;
        let key = (u.min(v), u.max(v));
        if !self.seen.insert(key) {
            return Err(InputError::DuplicateEdge(
                self.names[key.0 as usize].clone(),
                self.names[key.1 as usize].clone(),
            ));
        }
        self.edges.push((u, v));
        Ok(())
    }

    /// Number of distinct nodes seen so far
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.names.len()
    }

    /// Finish the graph
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the collected edges fail CSR validation
    pub fn build(self) -> Result<CsrGraph, InputError> {
        CsrGraph::from_validated(self.names, self.edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> CsrGraph {
        CsrGraph::from_edge_list(
            3,
            &[
                (NodeId(0), NodeId(1)),
                (NodeId(2), NodeId(0)),
                (NodeId(1), NodeId(2)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_graph() {
        let graph = CsrGraph::from_edge_list(0, &[]).unwrap();
        assert_eq!(graph.num_nodes(), 0);
        assert_eq!(graph.num_edges(), 0);
        assert_eq!(graph.csr_components().0, &[0]);
    }

    #[test]
    fn test_from_edge_list_simple() {
        let graph = triangle();

        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.num_edges(), 3);

        // Each undirected edge appears in both rows, rows sorted
        let (row_offsets, col_indices) = graph.csr_components();
        assert_eq!(row_offsets, &[0, 2, 4, 6]);
        assert_eq!(col_indices, &[1, 2, 0, 2, 0, 1]);
    }

    #[test]
    fn test_isolated_nodes_kept() {
        let graph = CsrGraph::from_edge_list(5, &[(NodeId(0), NodeId(1))]).unwrap();
        assert_eq!(graph.num_nodes(), 5);
        assert_eq!(graph.degree(NodeId(4)), 0);
        let empty: &[u32] = &[];
        assert_eq!(graph.neighbors(NodeId(3)).unwrap(), empty);
    }

    #[test]
    fn test_has_edge_symmetric() {
        let graph = CsrGraph::from_edge_list(4, &[(NodeId(3), NodeId(1))]).unwrap();
        assert!(graph.has_edge(NodeId(1), NodeId(3)));
        assert!(graph.has_edge(NodeId(3), NodeId(1)));
        assert!(!graph.has_edge(NodeId(0), NodeId(1)));
        assert!(!graph.has_edge(NodeId(0), NodeId(99)));
    }

    #[test]
    fn test_self_loop_rejected() {
        let err = CsrGraph::from_edge_list(2, &[(NodeId(1), NodeId(1))]).unwrap_err();
        assert_eq!(err, InputError::SelfLoop("1".to_string()));
    }

    #[test]
    fn test_duplicate_edge_rejected_either_orientation() {
        let err = CsrGraph::from_edge_list(3, &[(NodeId(0), NodeId(2)), (NodeId(2), NodeId(0))])
            .unwrap_err();
        assert_eq!(err, InputError::DuplicateEdge("0".to_string(), "2".to_string()));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let err = CsrGraph::from_edge_list(2, &[(NodeId(0), NodeId(2))]).unwrap_err();
        assert!(matches!(err, InputError::NodeOutOfBounds { node: 2, num_nodes: 2 }));
        assert!(triangle().neighbors(NodeId(3)).is_err());
    }

    #[test]
    fn test_iter_edges_once_each() {
        let edges: Vec<_> = triangle().iter_edges().collect();
        assert_eq!(
            edges,
            vec![
                (NodeId(0), NodeId(1)),
                (NodeId(0), NodeId(2)),
                (NodeId(1), NodeId(2)),
            ]
        );
    }

    #[test]
    fn test_builder_interns_names() {
        let mut builder = GraphBuilder::new();
        builder.add_edge("x", "y").unwrap();
        builder.add_edge("y", "z").unwrap();
        assert_eq!(builder.add_node("x"), NodeId(0));
        assert_eq!(builder.num_nodes(), 3);

        let graph = builder.build().unwrap();
        assert_eq!(graph.node_names(), &["x", "y", "z"]);
        assert_eq!(graph.get_node_name(NodeId(2)), Some("z"));
        assert_eq!(graph.find_node("y"), Some(NodeId(1)));
        assert!(graph.has_edge(NodeId(0), NodeId(1)));
    }

    #[test]
    fn test_builder_rejects_self_loop_and_duplicates() {
        let mut builder = GraphBuilder::new();
        assert_eq!(
            builder.add_edge("a", "a").unwrap_err(),
            InputError::SelfLoop("a".to_string())
        );

        builder.add_edge("a", "b").unwrap();
        assert_eq!(
            builder.add_edge("b", "a").unwrap_err(),
            InputError::DuplicateEdge("a".to_string(), "b".to_string())
        );
        assert_eq!(
            builder.add_edge("a", "b").unwrap_err(),
            InputError::DuplicateEdge("a".to_string(), "b".to_string())
        );

        // Rejected edges leave the builder usable
        builder.add_edge("b", "c").unwrap();
        let graph = builder.build().unwrap();
        assert_eq!(graph.num_edges(), 2);
    }
}
