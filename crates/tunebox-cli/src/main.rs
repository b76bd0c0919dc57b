//! Tunebox CLI - command line front end for the model catalog.
//!
//! Builds the catalog from a sample-output root and/or a checkpoint root and
//! prints it, resolves image paths, materialises the image tree, or keeps an
//! exported catalog file up to date.

mod commands;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use tunebox_core::GrammarConfig;

#[derive(Parser, Debug)]
#[command(name = "tunebox")]
#[command(about = "Catalog of fine-tuned models, checkpoints and sample images")]
struct Args {
    /// Root of the generated sample output
    #[arg(long, global = true)]
    samples: Option<PathBuf>,

    /// Root of the training checkpoints
    #[arg(long, global = true)]
    checkpoints: Option<PathBuf>,

    /// Grammar configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the catalog as JSON
    Catalog {
        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
    /// Write the bytes of the image at a catalog path
    Resolve {
        /// Image path as it appears in the catalog
        path: String,

        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Link every image into DEST under its catalog path
    FillImageDir {
        dest: PathBuf,
    },
    /// Rebuild periodically and write the catalog JSON atomically
    Watch {
        /// Output file
        #[arg(long)]
        out: PathBuf,

        /// Seconds between rebuilds [default: 300]
        #[arg(long)]
        interval: Option<u64>,

        /// Build and write once, then exit
        #[arg(long)]
        once: bool,
    },
}

/// Where the catalog is built from.
struct Roots {
    samples: Option<PathBuf>,
    checkpoints: Option<PathBuf>,
    config: GrammarConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries command output. RUST_LOG overrides --debug.
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_ascii_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    if args.samples.is_none() && args.checkpoints.is_none() {
        bail!("at least one of --samples or --checkpoints is required");
    }

    let config = match &args.config {
        Some(path) => GrammarConfig::load(path)?,
        None => GrammarConfig::default(),
    };
    debug!("Grammar configuration: {:?}", config);

    let roots = Roots {
        samples: args.samples,
        checkpoints: args.checkpoints,
        config,
    };

    match args.command {
        Command::Catalog { pretty } => commands::catalog(&roots, pretty),
        Command::Resolve { path, out } => commands::resolve(&roots, &path, out.as_deref()),
        Command::FillImageDir { dest } => commands::fill_image_dir(&roots, &dest),
        Command::Watch {
            out,
            interval,
            once,
        } => commands::watch(roots, &out, interval, once).await,
    }
}
