use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "discrip")]
#[command(author, version, about = "Extract video titles from optical discs")]
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
    /// List the titles on a disc
    Scan {
        /// Disc device (defaults to rip.device from config)
        #[arg(short, long)]
        device: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rip one title to a Matroska file
    Rip {
        /// Title number to rip
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        title: u32,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Disc device (defaults to rip.device from config)
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
