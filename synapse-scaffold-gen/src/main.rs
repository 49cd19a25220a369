//! synapse-scaffold-gen: Synthesize and update backend layers from entity definitions
//!
//! Reads a `synapse.toml` project description and brings the target crate's
//! domain models, repositories, wire conversions, use cases and capability
//! traits in line with it. Safe to re-run: existing code is only ever added to.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use synapse_scaffold::{ProjectConfig, sync_project};

#[derive(Parser, Debug)]
#[command(name = "synapse-scaffold-gen")]
#[command(about = "Synthesize and update backend layers from entity definitions")]
struct Args {
    /// Project description
    #[arg(default_value = "synapse.toml")]
    config: PathBuf,

    /// Target crate root (defaults to `project.root`, then the config's directory)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Log every merged container
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "scaffolding aborted");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every artifact was synthesized
fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let config = ProjectConfig::load(&args.config)?;

    let base = args
        .config
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();
    let root = match (&args.root, &config.project.root) {
        (Some(root), _) => root.clone(),
        (None, Some(root)) => base.join(root),
        (None, None) => base,
    };

    let report = sync_project(&root, &config)?;
    for path in report.written() {
        tracing::info!(path = %path.display(), "updated");
    }
    for failure in &report.failures {
        tracing::error!(
            entity = failure.entity.as_deref().unwrap_or("-"),
            artifact = failure.artifact,
            error = %failure.error,
            "not synthesized"
        );
    }
    Ok(report.is_success())
}
