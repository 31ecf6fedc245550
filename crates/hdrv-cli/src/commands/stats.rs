//! Canvas statistics command.

use anyhow::{Context, Result};
use hdrv_canvas::stats::NUM_BUCKETS;
use hdrv_canvas::CanvasStatistics;
use hdrv_task::ThreadPool;

use crate::StatsArgs;

const BAR_WIDTH: usize = 50;

/// Runs the stats command.
pub fn run(args: StatsArgs, pool: &ThreadPool, verbose: bool) -> Result<()> {
    let mut canvas = super::open_canvas(pool, &args.view)?;
    let cell = canvas
        .canvas_statistics(0)
        .context("No image to compute statistics for")?;
    let stats = cell.compute(0).wait().context("Statistics computation failed")?;

    println!("Image:    {}", args.view.input.display());
    if let Some(reference) = &args.view.reference {
        println!("Reference: {} ({})", reference.display(), args.view.metric.label());
    }
    println!("Group:    {}", super::group_label(&canvas));
    println!("Channels: {}", stats.num_channels);
    println!("Samples:  {}", stats.finite_count);
    println!("Mean:     {:.6}", stats.mean);
    println!("Min:      {:.6}", stats.min);
    println!("Max:      {:.6}", stats.max);

    if args.histogram_rows > 0 && stats.finite_count > 0 {
        println!();
        print_histogram(&stats, args.histogram_rows.min(NUM_BUCKETS));
    }
    if verbose {
        println!("Zero bucket: {}", stats.histogram_zero);
    }
    Ok(())
}

/// Prints the histogram folded into `rows` rows of equal bucket count.
fn print_histogram(stats: &CanvasStatistics, rows: usize) {
    let per_row = NUM_BUCKETS.div_ceil(rows);
    let counts: Vec<(usize, u64)> = stats
        .histogram
        .chunks(per_row)
        .enumerate()
        .map(|(row, chunk)| (row * per_row, chunk.iter().sum()))
        .collect();
    let peak = counts.iter().map(|&(_, n)| n).max().unwrap_or(0).max(1);

    for (first, count) in counts {
        let last = (first + per_row).min(NUM_BUCKETS) - 1;
        let (start, _) = stats.bucket_range(first);
        let (_, end) = stats.bucket_range(last);
        let bar = (count as f64 / peak as f64 * BAR_WIDTH as f64).round() as usize;
        println!("{start:>12.4} .. {end:<12.4} {:<BAR_WIDTH$} {count}", "#".repeat(bar));
    }
}
