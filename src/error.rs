//! Error types for graph input validation and the fitting loop
//!
//! Input problems are recoverable and reported as [`InputError`]. Broken
//! dendrogram invariants are programming errors and panic instead.

use thiserror::Error;

/// Rejected input graph
///
/// Self-loops and duplicate edges are never silently dropped: the graph
/// model is simple and undirected, so either one is reported here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Fewer than two nodes, so no internal dendrogram node can exist
    #[error("graph has {num_nodes} node(s); at least 2 are required to build a dendrogram")]
    DegenerateInput {
        /// Number of nodes in the rejected graph
        num_nodes: usize,
    },

    /// Edge whose endpoints coincide
    #[error("self-loop on node {0:?}")]
    SelfLoop(String),

    /// The same undirected edge was supplied twice
    #[error("duplicate edge {0:?} -- {1:?}")]
    DuplicateEdge(String, String),

    /// Node index outside `0..num_nodes`
    #[error("node {node} out of bounds for a graph with {num_nodes} node(s)")]
    NodeOutOfBounds {
        /// Offending node index
        node: u32,
        /// Declared node count
        num_nodes: usize,
    },

    /// Node table lists the same identifier more than once
    #[error("node {0:?} declared twice")]
    DuplicateNode(String),

    /// Node identifier that does not parse as an integer
    #[error("invalid node identifier {0:?}: expected an integer")]
    InvalidNodeId(String),
}

/// Errors surfaced by the HRG engine and control loop
#[derive(Debug, Error)]
pub enum HrgError {
    /// Input graph rejected
    #[error(transparent)]
    Input(#[from] InputError),

    /// Control-loop settings that cannot produce a result
    #[error("invalid fit configuration: {0}")]
    InvalidConfig(String),

    /// Fit abandoned through the cancellation flag
    #[error("fit cancelled at step {step}")]
    Cancelled {
        /// Number of MCMC steps completed before cancellation
        step: u64,
    },
}
