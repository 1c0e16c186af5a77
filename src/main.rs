// SPDX-License-Identifier: GPL-3.0-only

use camera_session::backends::camera::CameraPosition;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-session")]
#[command(about = "Drive a camera session from the command line")]
#[command(version = camera_session::constants::app_version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Take a photo
    Photo {
        /// Camera side to use (front or back)
        #[arg(short, long, default_value = "back")]
        position: CameraPosition,

        /// JPEG quality (0-100, default from settings)
        #[arg(short, long)]
        quality: Option<u8>,

        /// Output file path (default: ~/Pictures/camera-session/IMG_TIMESTAMP.jpg)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record a video
    Video {
        /// Camera side to use (front or back)
        #[arg(short, long, default_value = "back")]
        position: CameraPosition,

        /// Recording duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Output file path (default: ~/Videos/camera-session/VID_TIMESTAMP.mjpeg)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Enable audio recording
        #[arg(short, long)]
        audio: bool,
    },

    /// Scan for barcodes and print them as JSON lines
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Image to stream instead of the test pattern
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_session=debug, RUST_LOG=info
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
        Commands::List => cli::list_cameras(),
        Commands::Photo {
            position,
            quality,
            output,
        } => cli::take_photo(position, quality, output).await,
        Commands::Video {
            position,
            duration,
            output,
            audio,
        } => cli::record_video(position, duration, output, audio).await,
        Commands::Scan { duration, image } => cli::scan_barcodes(duration, image).await,
    }
}
