//! Parquet I/O for input graphs
//!
//! Based on `DuckDB` (Raasveldt et al., SIGMOD 2019) columnar storage patterns.
//!
//! # Format
//!
//! Graphs are stored as two Parquet files:
//! - `{path}_edges.parquet`: (source, target), each undirected edge once
//! - `{path}_nodes.parquet`: (`node_id`, name)

use super::{CsrGraph, GraphBuilder, NodeId};
use crate::error::InputError;
use anyhow::{Context, Result};
use arrow::array::{StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

impl CsrGraph {
    /// Write graph to Parquet files
    ///
    /// Creates two files:
    /// - `{path}_edges.parquet`: Edge list (source, target)
    /// - `{path}_nodes.parquet`: Node metadata (`node_id`, name)
    ///
    /// # Errors
    ///
    /// Returns error if file I/O fails or Arrow conversion fails
    #[allow(clippy::unused_async)] // Async API for future I/O operations
    pub async fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let base_path = path.as_ref();

        self.write_edges_parquet(base_path)?;
        self.write_nodes_parquet(base_path)?;

        Ok(())
    }

    /// Read graph from Parquet files
    ///
    /// When `{path}_nodes.parquet` exists it declares the node set: nodes are
    /// numbered in file order and every edge endpoint must be a declared
    /// `node_id`. Without it, edge endpoints are raw identifiers numbered in
    /// order of first appearance and named by their decimal value, so sparse
    /// ids never produce phantom nodes. The same self-loop and duplicate-edge
    /// policy as [`CsrGraph::from_edge_list`] applies.
    ///
    /// # Errors
    ///
    /// Returns error if the edge file doesn't exist, Arrow conversion fails,
    /// an edge names an undeclared node, a node is declared twice, or the
    /// graph violates the input policy
    #[allow(clippy::unused_async)] // Async API for future I/O operations
    pub async fn read_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref();

        let edges = Self::read_edges_parquet(base_path)?;
        let graph = if Path::new(&nodes_file(base_path)).exists() {
            let declared = Self::read_nodes_parquet(base_path)?;
            Self::from_declared_nodes(declared, &edges)
        } else {
            Self::from_raw_ids(&edges)
        };

        graph.with_context(|| format!("Invalid graph in {}", base_path.display()))
    }

    /// Remap declared `node_id`s to dense indices in declaration order
    fn from_declared_nodes(
        declared: Vec<(NodeId, String)>,
        edges: &[(NodeId, NodeId)],
    ) -> Result<Self, InputError> {
        let num_nodes = declared.len();
        let mut dense: HashMap<u32, NodeId> = HashMap::with_capacity(num_nodes);
        let mut names = Vec::with_capacity(num_nodes);

        for (node_id, name) in declared {
            #[allow(clippy::cast_possible_truncation)] // Graphs >4B nodes not supported
            let idx = NodeId(names.len() as u32);
            if dense.insert(node_id.0, idx).is_some() {
                return Err(InputError::DuplicateNode(node_id.0.to_string()));
            }
            names.push(name);
        }

        let lookup = |id: NodeId| {
            dense
                .get(&id.0)
                .copied()
                .ok_or(InputError::NodeOutOfBounds {
                    node: id.0,
                    num_nodes,
                })
        };
        let remapped = edges
            .iter()
            .map(|&(u, v)| Ok((lookup(u)?, lookup(v)?)))
            .collect::<Result<Vec<_>, InputError>>()?;

        Self::from_named_edge_list(names, &remapped)
    }

    /// Number raw edge endpoints by first appearance
    fn from_raw_ids(edges: &[(NodeId, NodeId)]) -> Result<Self, InputError> {
        let mut builder = GraphBuilder::new();
        for (u, v) in edges {
            builder.add_edge(&u.0.to_string(), &v.0.to_string())?;
        }
        builder.build()
    }

    fn write_edges_parquet(&self, base_path: &Path) -> Result<()> {
        let edges_path = format!("{}_edges.parquet", base_path.display());

        let (sources, targets): (Vec<u32>, Vec<u32>) =
            self.iter_edges().map(|(u, v)| (u.0, v.0)).unzip();

        let schema = Arc::new(Schema::new(vec![
            Field::new("source", DataType::UInt32, false),
            Field::new("target", DataType::UInt32, false),
        ]));

        let source_array = Arc::new(UInt32Array::from(sources));
        let target_array = Arc::new(UInt32Array::from(targets));

        let batch = RecordBatch::try_new(schema.clone(), vec![source_array, target_array])
            .context("Failed to create RecordBatch")?;

        let file =
            File::create(&edges_path).with_context(|| format!("Failed to create {edges_path}"))?;

        let props = WriterProperties::builder()
            .set_compression(parquet::basic::Compression::ZSTD(
                parquet::basic::ZstdLevel::try_new(3)?,
            ))
            .build();

        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
        writer.write(&batch)?;
        writer.close()?;

        Ok(())
    }

    fn write_nodes_parquet(&self, base_path: &Path) -> Result<()> {
        let nodes_path = nodes_file(base_path);

        #[allow(clippy::cast_possible_truncation)] // Graphs >4B nodes not supported
        let node_ids: Vec<u32> = (0..self.num_nodes()).map(|i| i as u32).collect();
        let names: Vec<&str> = self.node_names().iter().map(String::as_str).collect();

        let schema = Arc::new(Schema::new(vec![
            Field::new("node_id", DataType::UInt32, false),
            Field::new("name", DataType::Utf8, false),
        ]));

        let node_id_array = Arc::new(UInt32Array::from(node_ids));
        let name_array = Arc::new(StringArray::from(names));

        let batch = RecordBatch::try_new(schema.clone(), vec![node_id_array, name_array])
            .context("Failed to create nodes RecordBatch")?;

        let file =
            File::create(&nodes_path).with_context(|| format!("Failed to create {nodes_path}"))?;

        let props = WriterProperties::builder()
            .set_compression(parquet::basic::Compression::ZSTD(
                parquet::basic::ZstdLevel::try_new(3)?,
            ))
            .build();

        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
        writer.write(&batch)?;
        writer.close()?;

        Ok(())
    }

    fn read_edges_parquet(base_path: &Path) -> Result<Vec<(NodeId, NodeId)>> {
        let edges_path = format!("{}_edges.parquet", base_path.display());

        let file =
            File::open(&edges_path).with_context(|| format!("Failed to open {edges_path}"))?;

        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut edges = Vec::new();

        for batch_result in reader {
            let batch: RecordBatch = batch_result?;

            let sources = batch
                .column(0)
                .as_any()
                .downcast_ref::<UInt32Array>()
                .context("Invalid source column type")?;

            let targets = batch
                .column(1)
                .as_any()
                .downcast_ref::<UInt32Array>()
                .context("Invalid target column type")?;

            for i in 0..batch.num_rows() {
                edges.push((NodeId(sources.value(i)), NodeId(targets.value(i))));
            }
        }

        Ok(edges)
    }

    fn read_nodes_parquet(base_path: &Path) -> Result<Vec<(NodeId, String)>> {
        let nodes_path = nodes_file(base_path);

        let file =
            File::open(&nodes_path).with_context(|| format!("Failed to open {nodes_path}"))?;

        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut nodes = Vec::new();

        for batch_result in reader {
            let batch: RecordBatch = batch_result?;

            let node_ids = batch
                .column(0)
                .as_any()
                .downcast_ref::<UInt32Array>()
                .context("Invalid node_id column type")?;

            let names = batch
                .column(1)
                .as_any()
                .downcast_ref::<StringArray>()
                .context("Invalid name column type")?;

            for i in 0..batch.num_rows() {
                nodes.push((NodeId(node_ids.value(i)), names.value(i).to_string()));
            }
        }

        Ok(nodes)
    }
}

fn nodes_file(base_path: &Path) -> String {
    format!("{}_nodes.parquet", base_path.display())
}
