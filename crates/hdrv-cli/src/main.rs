//! hdrv - HDR image inspection from the command line
//!
//! Loads images through the viewer core and prints what the viewer would
//! show: image layout, canvas statistics, or the displayed pixels as files.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hdrv_canvas::{Metric, Tonemap};
use hdrv_task::ThreadPool;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "hdrv")]
#[command(author, version, about = "HDR image viewer core: inspect, compare, export")]
#[command(long_about = "
Inspect and compare high dynamic range images (OpenEXR, Radiance HDR, PNG).

Examples:
  hdrv info render.exr                          # Layers, channels, resolution
  hdrv stats render.exr --group diffuse         # Mean/min/max and histogram
  hdrv stats new.exr --reference old.exr -m RSE # Statistics of the error
  hdrv export render.exr -o out.png -e 1.5 -t FC
  hdrv export render.exr -o out.hdr --exposure -1
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Number of worker threads (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Display image layout
    #[command(visible_alias = "i")]
    Info(InfoArgs),

    /// Compute canvas statistics
    #[command(visible_alias = "s")]
    Stats(StatsArgs),

    /// Write the displayed image as PNG or Radiance HDR
    #[command(visible_alias = "e")]
    Export(ExportArgs),
}

#[derive(Args)]
struct InfoArgs {
    /// Input image(s)
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Only load channels whose name contains one of these comma-separated terms
    #[arg(short, long, default_value = "")]
    channels: String,
}

/// What the canvas shows: image, optional reference, group and metric.
#[derive(Args)]
struct ViewArgs {
    /// Input image
    input: PathBuf,

    /// Reference image to compare against
    #[arg(short, long)]
    reference: Option<PathBuf>,

    /// Channel group (layer) to display; defaults to the first group
    #[arg(short, long, default_value = "")]
    group: String,

    /// Comparison metric: E, AE, SE, RAE, RSE
    #[arg(short, long, default_value = "E")]
    metric: Metric,

    /// Only load channels whose name contains one of these comma-separated terms
    #[arg(short, long, default_value = "")]
    channels: String,
}

#[derive(Args)]
struct StatsArgs {
    #[command(flatten)]
    view: ViewArgs,

    /// Number of histogram rows to print (0 disables the histogram)
    #[arg(long, default_value = "20")]
    histogram_rows: usize,
}

#[derive(Args)]
struct ExportArgs {
    #[command(flatten)]
    view: ViewArgs,

    /// Output file (.png or .hdr)
    #[arg(short, long)]
    output: PathBuf,

    /// Exposure in stops
    #[arg(short, long, default_value = "0.0", allow_negative_numbers = true)]
    exposure: f32,

    /// Offset added after exposure
    #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
    offset: f32,

    /// Gamma of the GAMMA tonemap
    #[arg(long, default_value = "2.2")]
    gamma: f32,

    /// Tonemap: SRGB, GAMMA, FC (false color), PN (positive/negative)
    #[arg(short, long, default_value = "SRGB")]
    tonemap: Tonemap,

    /// Clamp values to [0, 1]
    #[arg(long)]
    clip: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let pool = if cli.threads > 0 {
        ThreadPool::new(cli.threads).context("Failed to start worker threads")?
    } else {
        ThreadPool::with_default_threads().context("Failed to start worker threads")?
    };

    match cli.command {
        Commands::Info(args) => commands::info::run(args, &pool, cli.verbose),
        Commands::Stats(args) => commands::stats::run(args, &pool, cli.verbose),
        Commands::Export(args) => commands::export::run(args, &pool, cli.verbose),
    }
}
