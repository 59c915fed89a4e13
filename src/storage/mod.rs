//! Graph storage and file collaborators
//!
//! Provides the CSR graph representation, graph loaders (plain-text edge
//! lists and Parquet) and the probability-matrix writer.

pub mod csr;
pub mod edgelist;
pub mod matrix;
#[cfg(feature = "storage")]
pub mod parquet;

pub use csr::{CsrGraph, GraphBuilder, NodeId};
pub use edgelist::{parse_edge_list, read_edge_list, NodeType};
pub use matrix::{format_prob_matrix, save_prob_matrix, write_prob_matrix};
