//! Plain-text edge lists
//!
//! One edge per line as two whitespace-separated node identifiers. Blank
//! lines and `#` comments are skipped, a line with a single identifier
//! declares an isolated node, and columns after the second are ignored
//! (edge data in the usual `u v weight` layout).

use super::{CsrGraph, GraphBuilder};
use crate::error::InputError;
use anyhow::{Context, Result};
use std::path::Path;

/// How node identifiers in the input are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeType {
    /// Identifiers must parse as integers; `007` and `7` name the same node
    #[default]
    Int,
    /// Identifiers are opaque strings
    Str,
}

impl NodeType {
    fn canonical(self, token: &str) -> Result<String, InputError> {
        match self {
            Self::Int => token
                .parse::<i64>()
                .map(|id| id.to_string())
                .map_err(|_| InputError::InvalidNodeId(token.to_string())),
            Self::Str => Ok(token.to_string()),
        }
    }
}

/// Parse an edge list held in memory
///
/// Nodes are numbered in order of first appearance.
///
/// # Errors
///
/// Returns error (with the offending line number) on a malformed
/// identifier, a self-loop or a duplicate edge
///
/// # Example
///
/// ```
/// use hrg_fit::{parse_edge_list, NodeType};
///
/// let graph = parse_edge_list("# triangle\n1 2\n2 3\n3 1\n", NodeType::Int).unwrap();
/// assert_eq!(graph.num_nodes(), 3);
/// assert_eq!(graph.num_edges(), 3);
/// ```
pub fn parse_edge_list(text: &str, node_type: NodeType) -> Result<CsrGraph> {
    let mut builder = GraphBuilder::new();

    for (line_no, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or("");
        let mut tokens = content.split_whitespace();

        let Some(first) = tokens.next() else {
            continue;
        };
        let u = node_type
            .canonical(first)
            .with_context(|| format!("line {}", line_no + 1))?;

        match tokens.next() {
            Some(second) => {
                let v = node_type
                    .canonical(second)
                    .with_context(|| format!("line {}", line_no + 1))?;
                builder
                    .add_edge(&u, &v)
                    .with_context(|| format!("line {}", line_no + 1))?;
            }
            None => {
                builder.add_node(&u);
            }
        }
    }

    Ok(builder.build()?)
}

/// Read an edge list file
///
/// # Errors
///
/// Returns error if the file cannot be read or fails [`parse_edge_list`]
pub fn read_edge_list<P: AsRef<Path>>(path: P, node_type: NodeType) -> Result<CsrGraph> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_edge_list(&text, node_type).with_context(|| format!("Invalid graph in {}", path.display()))
}
