//! Hierarchical random graph model and its MCMC fitting engine
//!
//! - `dendrogram`: index-based tree over the graph's nodes with cached bipartitions
//! - `likelihood`: per-node log-likelihood terms and the running total
//! - `mcmc`: staged subtree exchanges under the Metropolis rule
//! - `equilibrium`: burst-based stopping heuristic
//! - `probability`: connection-probability matrices and their average
//! - `fit`: the control loop tying the above together
//! - `progress`: diagnostic records emitted by the loop

pub mod dendrogram;
pub mod equilibrium;
pub mod fit;
pub mod likelihood;
pub mod mcmc;
pub mod probability;
pub mod progress;

pub use dendrogram::{Dendrogram, InternalNode, TreeNode};
pub use equilibrium::{EquilibriumDetector, EquilibriumThreshold};
pub use fit::{FitConfig, FitResult, FitState, HrgFitter};
pub use likelihood::{xlogy, Bipartition, LikelihoodTracker};
pub use mcmc::{metropolis_accept, McmcSampler, ProposedMove, StepOutcome};
pub use probability::{probability_matrix, ProbabilityAccumulator};
pub use progress::{FitPhase, LogProgress, NoProgress, ProgressRecord, ProgressSink};
