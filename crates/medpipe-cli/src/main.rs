//! Pipeline runner CLI.
//!
//! Provides the `medpipe` binary. `run` builds a pipeline from a JSON
//! manifest, refreshes one sink and prints a JSON summary; `dot` prints the
//! graph in Graphviz format.

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

use medpipe_cli::{run, BuiltPipeline, Manifest, ManifestError, RunError, RunOptions};
use medpipe_core::EngineConfig;
use medpipe_nodes::NodeRegistry;

/// Dataflow pipeline runner.
#[derive(Parser)]
#[command(name = "medpipe", about = "Build and refresh image-processing pipelines")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh a sink and print a JSON summary.
    Run {
        /// Path to the pipeline manifest.
        #[arg(short, long)]
        manifest: PathBuf,

        /// Name of the node to refresh.
        #[arg(short, long)]
        sink: String,

        /// Number of refreshes, at least one.
        #[arg(long, default_value_t = 1)]
        refresh: usize,

        /// Node to touch before every refresh after the first. Repeatable.
        #[arg(long)]
        touch: Vec<String>,

        /// Record and print the execution trace (also `MEDPIPE_TRACE=1`).
        #[arg(long)]
        trace: bool,

        /// Nodes release their outputs after use unless the manifest says
        /// otherwise.
        #[arg(long)]
        no_cache: bool,
    },

    /// Print the pipeline graph in Graphviz dot format.
    Dot {
        /// Path to the pipeline manifest.
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Run {
            manifest,
            sink,
            refresh,
            touch,
            trace,
            no_cache,
        } => {
            let config = EngineConfig::default()
                .with_trace(trace || trace_from_env())
                .with_cache_outputs(!no_cache);
            let options = RunOptions {
                sink,
                refreshes: refresh,
                touch,
            };
            run_sink(&manifest, config, &options)
        }
        Commands::Dot { manifest } => print_dot(&manifest),
    };
    process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn trace_from_env() -> bool {
    std::env::var("MEDPIPE_TRACE").is_ok_and(|v| v == "1")
}

fn build(path: &Path, config: EngineConfig) -> Result<BuiltPipeline, ManifestError> {
    Manifest::load(path)?.build(&NodeRegistry::with_builtins(), config)
}

/// Exit code for a manifest problem: 3 for I/O, 2 otherwise.
fn manifest_exit_code(err: &ManifestError) -> i32 {
    match err {
        ManifestError::Io { .. } => 3,
        _ => 2,
    }
}

/// Execute the run subcommand.
///
/// Returns exit code: 0 = success, 1 = execution error,
/// 2 = invalid manifest or options, 3 = I/O error.
fn run_sink(path: &Path, config: EngineConfig, options: &RunOptions) -> i32 {
    let mut built = match build(path, config) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: {}", e);
            return manifest_exit_code(&e);
        }
    };

    match run(&mut built, options) {
        Ok(summary) => {
            let json = serde_json::to_string_pretty(&summary).unwrap_or_else(|e| {
                format!("{{\"error\": \"failed to serialize summary: {}\"}}", e)
            });
            println!("{}", json);
            0
        }
        Err(RunError::Manifest(e)) => {
            eprintln!("Error: {}", e);
            manifest_exit_code(&e)
        }
        Err(e @ RunError::NoRefreshes) => {
            eprintln!("Error: {}", e);
            2
        }
        Err(e) => {
            eprintln!("Execution failed: {}", e);
            1
        }
    }
}

fn print_dot(path: &Path) -> i32 {
    match build(path, EngineConfig::default()) {
        Ok(built) => {
            println!("{}", built.pipeline.to_dot());
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            manifest_exit_code(&e)
        }
    }
}
