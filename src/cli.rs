use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelplay")]
#[command(author, version, about = "SMK and CINE video decoder and player")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show container information
    Info {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play a file in real time without output devices
    Play {
        /// File to play
        #[arg(required = true)]
        file: PathBuf,

        /// Disable audio decoding
        #[arg(long)]
        no_audio: bool,
    },

    /// Decode a file to PNG frames and WAV audio
    Extract {
        /// File to decode
        #[arg(required = true)]
        file: PathBuf,

        /// Output directory (defaults to export.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write every Nth frame (overrides export.frame_stride)
        #[arg(long)]
        stride: Option<u32>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
