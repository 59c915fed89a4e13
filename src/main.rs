use anyhow::{Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, ValueEnum};
use hrg_fit::{
    read_edge_list, save_prob_matrix, CsrGraph, EquilibriumThreshold, FitConfig, HrgFitter,
    LogProgress, NodeType,
};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
enum NodeTypeArg {
    Int,
    Str,
}

impl From<NodeTypeArg> for NodeType {
    fn from(arg: NodeTypeArg) -> Self {
        match arg {
            NodeTypeArg::Int => Self::Int,
            NodeTypeArg::Str => Self::Str,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
enum InputFormat {
    /// Whitespace-separated `u v` pairs, one edge per line
    Edgelist,
    /// `{path}_edges.parquet` and `{path}_nodes.parquet`
    Parquet,
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
///
/// Fit a hierarchical random graph (HRG) to a network by MCMC over
/// dendrograms, then average connection-probability matrices sampled at
/// equilibrium and save them as plain text.
///
struct FitArgs {
    /// Input graph (edge-list file, or Parquet base path with `--format parquet`)
    graph: PathBuf,

    /// Input format
    #[arg(long, short, value_enum, default_value_t = InputFormat::Edgelist)]
    format: InputFormat,

    /// How node identifiers are interpreted
    #[arg(long = "node-type", short = 't', value_enum, default_value_t = NodeTypeArg::Int)]
    node_type: NodeTypeArg,

    /// Number of burn-in MCMC steps
    #[arg(long = "num-steps", short = 's', default_value_t = 100_000)]
    num_steps: u64,

    /// Steps per equilibrium burst
    #[arg(long, default_value_t = 10_000)]
    burst_steps: u64,

    /// Best-L improvement per burst below which the chain is at equilibrium
    #[arg(long, default_value_t = 1.0)]
    threshold: f64,

    /// Multiply the threshold by the number of internal nodes
    #[arg(long)]
    scale_threshold: bool,

    /// Stop searching for equilibrium after this many bursts
    #[arg(long)]
    max_bursts: Option<usize>,

    /// Number of probability snapshots to average (at least 1)
    #[arg(long, default_value_t = 10,
          value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    samples: usize,

    /// Steps between snapshots
    #[arg(long, default_value_t = 1_000)]
    sample_interval: u64,

    /// Burn-in steps between progress lines (0 disables them)
    #[arg(long, default_value_t = 4096)]
    progress_interval: u64,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output file for the averaged probability matrix
    #[arg(long, short, default_value = "test.txt")]
    output: PathBuf,

    /// Also write the final dendrogram in Newick format
    #[arg(long)]
    dendrogram: Option<PathBuf>,
}

impl FitArgs {
    fn fit_config(&self) -> FitConfig {
        let equilibrium = if self.scale_threshold {
            EquilibriumThreshold::PerInternalNode(self.threshold)
        } else {
            EquilibriumThreshold::Absolute(self.threshold)
        };
        FitConfig {
            burn_in_steps: self.num_steps,
            burst_steps: self.burst_steps,
            equilibrium,
            max_bursts: self.max_bursts,
            num_samples: self.samples,
            sample_interval: self.sample_interval,
            progress_interval: self.progress_interval,
            seed: self.seed,
        }
    }
}

async fn load_graph(args: &FitArgs) -> Result<CsrGraph> {
    match args.format {
        InputFormat::Edgelist => read_edge_list(&args.graph, args.node_type.into()),
        #[cfg(feature = "storage")]
        InputFormat::Parquet => CsrGraph::read_parquet(&args.graph).await,
        #[cfg(not(feature = "storage"))]
        InputFormat::Parquet => anyhow::bail!("built without Parquet support (feature `storage`)"),
    }
}

/// Fit, then write the matrix (and optional dendrogram) only on success
fn fit_and_save(graph: &CsrGraph, args: &FitArgs, cancel: Arc<AtomicBool>) -> Result<()> {
    let result = HrgFitter::new(graph, args.fit_config())
        .with_cancel_flag(cancel)
        .run(&mut LogProgress)
        .context("HRG fit failed")?;

    info!(
        "best L = {:.3} at step {}, final L = {:.3}",
        result.state.best_log_likelihood,
        result.state.best_step,
        result.dendrogram.log_likelihood()
    );

    save_prob_matrix(&result.matrix, &args.output)?;
    info!("wrote probability matrix to {}", args.output.display());

    if let Some(path) = &args.dendrogram {
        std::fs::write(path, result.dendrogram.to_newick() + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("wrote dendrogram to {}", path.display());
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = FitArgs::parse();

    let graph = load_graph(&args).await?;
    info!(
        "loaded {}: {} nodes, {} edges",
        args.graph.display(),
        graph.num_nodes(),
        graph.num_edges()
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            warn!("interrupt received; abandoning the fit without writing output");
            cancel.store(true, Ordering::SeqCst);
        })
        .context("Failed to install interrupt handler")?;
    }

    fit_and_save(&graph, &args, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args_for(output: &std::path::Path, extra: &[&str]) -> FitArgs {
        let mut argv = vec!["hrg-fit", "graph.txt", "--output"];
        argv.push(output.to_str().unwrap());
        argv.extend_from_slice(extra);
        FitArgs::try_parse_from(argv).unwrap()
    }

    fn square() -> CsrGraph {
        hrg_fit::parse_edge_list("1 2\n2 3\n3 4\n4 1\n", NodeType::Int).unwrap()
    }

    #[test]
    fn test_defaults_map_onto_fit_config() {
        let dir = tempdir().unwrap();
        let args = args_for(&dir.path().join("out.txt"), &[]);
        assert_eq!(args.fit_config(), FitConfig::default());

        let scaled = args_for(
            &dir.path().join("out.txt"),
            &["--scale-threshold", "--threshold", "0.5", "-s", "10"],
        );
        let config = scaled.fit_config();
        assert_eq!(config.equilibrium, EquilibriumThreshold::PerInternalNode(0.5));
        assert_eq!(config.burn_in_steps, 10);
    }

    #[test]
    fn test_zero_samples_rejected_by_parser() {
        let err = FitArgs::try_parse_from(["hrg-fit", "graph.txt", "--samples", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_interrupted_fit_writes_nothing() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.txt");
        let newick = dir.path().join("tree.nwk");
        let args = args_for(
            &output,
            &["--dendrogram", newick.to_str().unwrap(), "-s", "100"],
        );

        let raised = Arc::new(AtomicBool::new(true));
        let err = fit_and_save(&square(), &args, raised).unwrap_err();
        assert!(format!("{err:#}").contains("cancelled"));
        assert!(!output.exists());
        assert!(!newick.exists());

        let args = args_for(
            &output,
            &[
                "--dendrogram",
                newick.to_str().unwrap(),
                "-s",
                "100",
                "--burst-steps",
                "50",
                "--samples",
                "2",
                "--sample-interval",
                "10",
            ],
        );
        fit_and_save(&square(), &args, Arc::new(AtomicBool::new(false))).unwrap();
        assert!(output.exists());
        assert!(std::fs::read_to_string(&newick).unwrap().ends_with(";\n"));
    }
}
