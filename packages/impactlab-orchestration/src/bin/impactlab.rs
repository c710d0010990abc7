//! impactlab CLI
//!
//! Inspect the superindices and variables of a registry configuration.
//!
//! # Usage
//!
//! ```bash
//! # Enumerate rcp × ssp combinations, one JSON object per line
//! impactlab indices --superindex 'rcp*ssp'
//!
//! # Restrict to one scenario
//! impactlab indices --config registry.yaml --superindex 'rcp*ssp' --slice rcp=rcp85
//!
//! # List declared variables
//! impactlab variables --config registry.yaml
//! ```

use clap::{Parser, Subcommand};
use impactlab_orchestration::{parse_key, Indices, Registry, RegistryConfig};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "impactlab")]
#[command(about = "Index-aware scenario pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enumerate the combinations of a superindex expression
    Indices {
        /// Registry configuration (defaults to the built-in rcp × ssp setup)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Superindex expression, e.g. `rcp*ssp`
        #[arg(short, long)]
        superindex: String,

        /// Restrict a dimension, e.g. `rcp=rcp85` (repeatable)
        #[arg(long)]
        slice: Vec<String>,
    },

    /// List declared variables with their dimensions and sizes
    Variables {
        /// Registry configuration (defaults to the built-in rcp × ssp setup)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Indices {
            config,
            superindex,
            slice,
        } => list_indices(config, &superindex, &slice)?,
        Commands::Variables { config } => list_variables(config)?,
    }

    Ok(())
}

fn load_registry(config: Option<PathBuf>) -> anyhow::Result<Registry> {
    let registry = match config {
        Some(path) => {
            debug!("loading registry from {}", path.display());
            Registry::from_config(&RegistryConfig::from_yaml(&path)?)?
        }
        None => Registry::impactlab_default()?,
    };
    Ok(registry)
}

fn list_indices(config: Option<PathBuf>, expr: &str, slices: &[String]) -> anyhow::Result<()> {
    let registry = load_registry(config)?;
    let mut index = registry.parse_superindex(expr)?;

    let mut key = Indices::new();
    for slice in slices {
        key.extend(parse_key(slice)?);
    }
    if !key.is_empty() {
        index = index.restrict(&key);
    }

    for element in &index {
        println!("{}", serde_json::to_string(&element)?);
    }
    Ok(())
}

fn list_variables(config: Option<PathBuf>) -> anyhow::Result<()> {
    let registry = load_registry(config)?;

    for variable in registry.variables() {
        let index = variable.superindex();
        println!(
            "{}\t{}\t{}",
            variable.name(),
            index.dimensions().join(","),
            index.len()
        );
    }
    Ok(())
}
