//! Export command: writes the displayed image.
//!
//! PNG receives the tonemapped 8-bit display, Radiance HDR the linear values
//! after exposure and offset.

use anyhow::{Context, Result};
use hdrv_io::save::{save_hdr, save_ldr, ExportFormat};
use hdrv_task::ThreadPool;
use tracing::info;

use crate::ExportArgs;

/// Runs the export command.
pub fn run(args: ExportArgs, pool: &ThreadPool, verbose: bool) -> Result<()> {
    let format = ExportFormat::from_path(&args.output)?;
    let mut canvas = super::open_canvas(pool, &args.view)?;
    canvas.set_exposure(args.exposure);
    canvas.set_offset(args.offset);
    canvas.set_gamma(args.gamma)?;
    canvas.set_tonemap(args.tonemap);
    canvas.set_clip_to_ldr(args.clip);

    let (width, height) = canvas.image().map(|i| i.size()).unwrap_or_default();
    let saved = match format {
        ExportFormat::Png => {
            let rgba = canvas.get_ldr_image_data(true, 0).wait().context("Tonemapping failed")?;
            save_ldr(&args.output, width, height, &rgba)
        }
        ExportFormat::Hdr => {
            let rgba = canvas.get_hdr_image_data(true, 0).wait().context("Compositing failed")?;
            save_hdr(&args.output, width, height, &rgba)
        }
    };
    saved.with_context(|| format!("Failed to save: {}", args.output.display()))?;

    info!(output = %args.output.display(), ?format, "exported image");
    if verbose {
        println!(
            "Wrote {} ({width}x{height}, group {})",
            args.output.display(),
            super::group_label(&canvas)
        );
    }
    Ok(())
}
