//! Image info command.
//!
//! Prints resolution, file size and the channel groups of each image.

use anyhow::Result;
use hdrv_task::ThreadPool;
use std::fs;

use crate::InfoArgs;

/// Runs the info command.
pub fn run(args: InfoArgs, pool: &ThreadPool, verbose: bool) -> Result<()> {
    for (i, path) in args.input.iter().enumerate() {
        if i > 0 {
            println!();
        }
        let file_size = fs::metadata(path)?.len();
        let image = super::load(pool, path, &args.channels)?;

        println!("{image}");
        println!("File size: {}", super::format_size(file_size));
        println!("Premultiplied: {}", image.has_premultiplied_alpha());
        if verbose {
            for group in image.channel_groups() {
                println!("  group '{}': {}", group.name, group.display_name());
            }
        }
    }
    Ok(())
}
