//! mesh-label: Command-line interface for mesh topology checks, operators
//! and face labels.
//!
//! Thin front end over the `mesh-label` library, suitable for scripting
//! segmentation pipelines.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=mesh_label=info` - Basic operation logging
//! - `RUST_LOG=mesh_label=debug` - Detailed progress logging
//! - `RUST_LOG=mesh_label::timing=debug` - Performance timing
//! - `RUST_LOG=debug` - All debug output
//!
//! # Example
//!
//! ```bash
//! # Report isolated faces with the k-d tree search
//! RUST_LOG=mesh_label=info mesh-label isolated scan.ply --kd-tree
//!
//! # Face Laplacian summary as JSON
//! mesh-label --format json operators scan.ply --kind face-laplacian --sigma-a 0.5
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use mesh_label::LabelingConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{info, isolated, labels, operators};

/// mesh-label - Inspect triangle meshes, build their operators and manage
/// per-face labels.
#[derive(Parser)]
#[command(name = "mesh-label")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// TOML file with load, operator and label settings
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh statistics and topology diagnostics
    Info {
        /// Input mesh file
        input: PathBuf,
    },

    /// Report isolated faces and optionally weld them back
    Isolated {
        /// Input mesh file
        input: PathBuf,

        /// Near-duplicate distance threshold
        #[arg(long)]
        threshold: Option<f64>,

        /// Use the k-d tree search instead of the brute-force scan
        #[arg(long)]
        kd_tree: bool,

        /// Require every vertex of a face to have a near-duplicate
        #[arg(long)]
        all_vertices: bool,

        /// Rebuild candidate faces and save the result
        #[arg(long, requires = "output")]
        rebuild: bool,

        /// Output mesh path for --rebuild
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a face label file and report the label histogram
    Labels {
        /// Input mesh file
        input: PathBuf,

        /// Whitespace-separated label file (.dat)
        labels: PathBuf,

        /// Truncate or pad on count mismatch instead of failing
        #[arg(long)]
        lenient: bool,

        /// Write the imported labels back out
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a sparse operator and summarize it
    Operators {
        /// Input mesh file
        input: PathBuf,

        /// Operator to build
        #[arg(long, default_value = "face-laplacian")]
        kind: OperatorKind,

        /// Uniform weight of the face Laplacian
        #[arg(long)]
        w_u: Option<f64>,

        /// Affinity weight of the face Laplacian
        #[arg(long)]
        w_a: Option<f64>,

        /// Kernel width of the face Laplacian affinity term
        #[arg(long)]
        sigma_a: Option<f64>,

        /// Kernel width of the face affinity matrix
        #[arg(long)]
        sigma: Option<f64>,

        /// Face dissimilarity: area, centroid or normal
        #[arg(long)]
        dissimilarity: Option<mesh_label::Dissimilarity>,

        /// Write the operator entries as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OperatorKind {
    /// Combinatorial vertex Laplacian (V x V)
    VertexLaplacian,
    /// Weighted face Laplacian (F x F)
    FaceLaplacian,
    /// Gaussian face affinity matrix (F x F)
    FaceAffinity,
    /// Face area vector (F)
    FaceAreas,
    /// Face adjacency index table (F x 3)
    FaceAdjacency,
}

impl Cli {
    /// Settings from `--config`, or the defaults.
    pub fn labeling_config(&self) -> Result<LabelingConfig> {
        match &self.config {
            Some(path) => LabelingConfig::from_toml_file(path)
                .with_context(|| format!("Failed to read config from {:?}", path)),
            None => Ok(LabelingConfig::default()),
        }
    }
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "mesh_label=info",
            2 => "mesh_label=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Info { input } => info::run(input, &cli),
        Commands::Isolated {
            input,
            threshold,
            kd_tree,
            all_vertices,
            rebuild,
            output,
        } => isolated::run(
            input,
            isolated::Options {
                threshold: *threshold,
                kd_tree: *kd_tree,
                all_vertices: *all_vertices,
                rebuild: *rebuild,
                output: output.as_deref(),
            },
            &cli,
        ),
        Commands::Labels {
            input,
            labels,
            lenient,
            output,
        } => labels::run(input, labels, *lenient, output.as_deref(), &cli),
        Commands::Operators {
            input,
            kind,
            w_u,
            w_a,
            sigma_a,
            sigma,
            dissimilarity,
            output,
        } => operators::run(
            input,
            operators::Options {
                kind: *kind,
                uniform_weight: *w_u,
                affinity_weight: *w_a,
                affinity_sigma: *sigma_a,
                sigma: *sigma,
                dissimilarity: *dissimilarity,
                output: output.as_deref(),
            },
            &cli,
        ),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(mesh_err) = e.downcast_ref::<mesh_label::MeshError>() {
                eprintln!("{}: {}", "Error".red().bold(), mesh_err);
                eprintln!("  {}: {}", "Code".cyan(), mesh_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    mesh_err.recovery_suggestion()
                );
                if let Some(location) = mesh_err.location() {
                    eprintln!("  {}: {}", "Location".yellow(), location);
                }
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
