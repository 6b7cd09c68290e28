// SPDX-License-Identifier: MIT OR Apache-2.0
//! `nodeclip` - command-line tool for node clipboard documents.
//!
//! Subcommands:
//! - `inspect`: print versions, trees and the external ledger of a document
//! - `compress` / `decompress`: convert between plain JSON and clipboard text
//! - `demo`: copy a sample library and paste it into a fresh one
//!
//! Logging goes through `tracing`; `RUST_LOG` overrides the default filter.

mod commands;
mod demo;

use anyhow::Result;
use clap::{Parser, Subcommand};
use nodeclip_engine::ClipSettings;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "nodeclip", version, about = "Copy and paste node trees as text")]
struct Cli {
    /// Log engine activity at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a document and print its contents.
    Inspect {
        /// Document file, plain or compressed.
        file: PathBuf,
    },

    /// Write a document in the compressed clipboard form.
    Compress {
        /// Input document.
        input: PathBuf,
        /// Output file.
        output: PathBuf,
    },

    /// Write a document as plain JSON.
    Decompress {
        /// Input document.
        input: PathBuf,
        /// Output file.
        output: PathBuf,
        /// Indentation width; zero writes compact JSON.
        #[arg(long, default_value = "2")]
        indent: usize,
    },

    /// Copy a sample library and paste it into a fresh one.
    Demo {
        /// Use the compressed form for the round trip.
        #[arg(long)]
        compress: bool,
        /// Settings file (RON).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Also write the copied document here.
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "nodeclip=debug" } else { "nodeclip=info" };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    tracing::debug!("nodeclip v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Inspect { file } => commands::inspect(&file),
        Commands::Compress { input, output } => commands::convert(&input, &output, true, 0),
        Commands::Decompress { input, output, indent } => commands::convert(&input, &output, false, indent),
        Commands::Demo { compress, config, save } => {
            let mut settings = match config {
                Some(path) => ClipSettings::load(&path)?,
                None => ClipSettings::default(),
            };
            if compress {
                settings.export.compress = true;
            }
            demo::run(&settings, save.as_deref())
        }
    }
}
