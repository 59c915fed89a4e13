//! hrg-fit: hierarchical random graph fitting
//!
//! # Overview
//!
//! Fits a hierarchical random graph (HRG) to an observed simple undirected
//! graph. A Markov chain over binary dendrograms whose leaves are the graph's
//! nodes searches for trees with high log-likelihood; snapshots taken at
//! equilibrium are averaged into a matrix of pairwise connection
//! probabilities, usable for missing-link prediction and for reading off
//! community structure.
//!
//! # Quick Start
//!
//! ```no_run
//! use hrg_fit::{read_edge_list, save_prob_matrix, FitConfig, HrgFitter, LogProgress, NodeType};
//!
//! # fn example() -> anyhow::Result<()> {
//! let graph = read_edge_list("karate.txt", NodeType::Int)?;
//!
//! let result = HrgFitter::new(&graph, FitConfig::default()).run(&mut LogProgress)?;
//! println!("best L = {:.3}", result.state.best_log_likelihood);
//!
//! save_prob_matrix(&result.matrix, "probabilities.txt")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Storage**: CSR graph, edge-list and Parquet loaders, matrix writer
//! - **Model**: index-based dendrogram arena with cached bipartition counts
//! - **Sampling**: single-chain Metropolis over local subtree exchanges,
//!   incremental log-likelihood updates, seedable for exact reproducibility

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod hrg;
pub mod storage;

// Re-export core types
pub use error::{HrgError, InputError};
pub use hrg::{
    metropolis_accept, probability_matrix, Dendrogram, EquilibriumDetector, EquilibriumThreshold,
    FitConfig, FitPhase, FitResult, FitState, HrgFitter, LogProgress, McmcSampler, NoProgress,
    ProbabilityAccumulator, ProgressRecord, ProgressSink, StepOutcome, TreeNode,
};
pub use storage::{
    format_prob_matrix, parse_edge_list, read_edge_list, save_prob_matrix, CsrGraph, GraphBuilder,
    NodeId, NodeType,
};

// Error type for file-level operations
pub use anyhow::{Error, Result};
