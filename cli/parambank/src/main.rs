//! parambank CLI: inspect planned layouts and build parameter stores from a
//! `parambank.toml` system manifest.

mod commands;
mod manifest;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "parambank", version, about = "Typed parameter storage for simulation systems")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan the buffer layout of a manifest and print it
    Layout {
        /// Path to the system manifest
        manifest: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,
    },
    /// Build a parameter store and print its buffers and values
    Build {
        /// Path to the system manifest
        manifest: PathBuf,
        /// Override a binding (name=value, value as JSON or bare text)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,
    },
    /// Resolve a name to its locator
    Lookup {
        /// Path to the system manifest
        manifest: PathBuf,
        /// Value name, alias, or element (e.g. `p[2]`)
        name: String,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "parambank=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Layout { manifest, format } => commands::layout::run(&manifest, format),
        Commands::Build {
            manifest,
            overrides,
            format,
        } => commands::build::run(&manifest, &overrides, format),
        Commands::Lookup {
            manifest,
            name,
            format,
        } => commands::lookup::run(&manifest, &name, format),
    }
}
