// SPDX-License-Identifier: GPL-3.0-only

use camera_effects::config::Config;
use camera_effects::constants::app_info;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

mod cli;

#[derive(Parser)]
#[command(name = "camera-effects")]
#[command(about = "Live effect pipeline for camera and screen frames")]
#[command(version = app_info::version())]
struct Cli {
    /// Config file (default: ~/.config/camera-effects/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic camera through the effect chain
    Run {
        /// Effect to append to the configured chain (repeatable, see 'effects')
        #[arg(short, long = "effect")]
        effects: Vec<String>,

        /// Frame width
        #[arg(long, default_value = "1280")]
        width: u32,

        /// Frame height
        #[arg(long, default_value = "720")]
        height: u32,

        /// Stop after this many frames
        #[arg(short, long)]
        frames: Option<u64>,

        /// Skip the GPU renderer
        #[arg(long)]
        software: bool,
    },

    /// Run a synthetic screen capture into the encoder
    Screen {
        /// Screen width
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Screen height
        #[arg(long, default_value = "1080")]
        height: u32,

        /// Stop after this many frames
        #[arg(short, long)]
        frames: Option<u64>,

        /// Halve the screen size at this frame
        #[arg(long)]
        resize_at: Option<u64>,
    },

    /// List available effects
    Effects,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_effects=trace, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    info!(version = app_info::version(), "Starting camera-effects");

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    match cli.command {
        Commands::Effects => cli::list_effects(),
        Commands::Run {
            effects,
            width,
            height,
            frames,
            software,
        } => cli::run_camera(
            config,
            &effects,
            software,
            cli::RunOptions {
                width,
                height,
                frames,
            },
        ),
        Commands::Screen {
            width,
            height,
            frames,
            resize_at,
        } => cli::run_screen(
            config,
            resize_at,
            cli::RunOptions {
                width,
                height,
                frames,
            },
        ),
    }
}
