// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use live_preview::constants::app_info;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "live-preview")]
#[command(about = "Live camera preview through a GPU filter chain")]
#[command(version = app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras and their preview sizes
    List {
        /// Include the synthetic test pattern camera
        #[arg(long)]
        test_pattern: bool,
    },

    /// Run the preview pipeline into an offscreen surface
    Preview {
        /// Requested preview width (overrides the config file)
        #[arg(long)]
        width: Option<u32>,

        /// Requested preview height (overrides the config file)
        #[arg(long)]
        height: Option<u32>,

        /// Display rotation in degrees clockwise: 0, 90, 180 or 270
        #[arg(long, value_parser = ["0", "90", "180", "270"])]
        rotation: Option<String>,

        /// How long to preview, in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,

        /// Use the synthetic test pattern instead of a camera
        #[arg(long)]
        test_pattern: bool,

        /// Config file (default: ~/.config/live-preview/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=live_preview=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { test_pattern } => cli::list_cameras(test_pattern),
        Commands::Preview {
            width,
            height,
            rotation,
            seconds,
            test_pattern,
            config,
        } => cli::run_preview(cli::PreviewOptions {
            width,
            height,
            rotation: rotation.and_then(|r| r.parse().ok()),
            seconds,
            test_pattern,
            config,
        }),
    }
}
