//! partline CLI
//!
//! Command-line demo of ordered messaging against an in-process broker.
//!
//! ## Overview
//!
//! `partline` exercises every send mode and both consumption modes:
//! - **Produce**: sync, async, one-way, ordered and delayed sends
//! - **Consume**: concurrent, orderly (tag-filtered) and delayed consumption
//! - **Demo**: ordered produce and consume end to end, with an order check
//!
//! The broker lives inside the process, so each invocation starts empty and
//! a consume command publishes the messages it reads.
//!
//! ## Quick Start
//!
//! ```bash
//! partline produce orderly
//! partline consume orderly
//! partline demo orderly
//!
//! # Producer/consumer settings and topic names from a file
//! PARTLINE_CONFIG=partline.toml partline consume delay --level 2
//! ```
//!
//! ## Logging
//!
//! Uses `RUST_LOG` (default `info`), e.g. `RUST_LOG=partline_client=debug`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{ConsumeCommands, DemoCommands, ProduceCommands};
use config::Config;

#[derive(Parser)]
#[command(name = "partline")]
#[command(about = "Ordered messaging demo against an in-process broker", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "PARTLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Print Prometheus metrics when the command finishes
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send messages in one of the send modes
    Produce {
        #[command(subcommand)]
        command: ProduceCommands,
    },
    /// Publish sample messages and consume them
    Consume {
        #[command(subcommand)]
        command: ConsumeCommands,
    },
    /// Run an end-to-end scenario
    Demo {
        #[command(subcommand)]
        command: DemoCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    partline_observability::init();

    match cli.command {
        Commands::Produce { command } => {
            commands::produce::handle_produce_command(command, &config).await?
        }
        Commands::Consume { command } => {
            commands::consume::handle_consume_command(command, &config).await?
        }
        Commands::Demo { command } => commands::demo::handle_demo_command(command, &config).await?,
    }

    if cli.metrics {
        print!("{}", partline_observability::gather_text());
    }

    Ok(())
}
