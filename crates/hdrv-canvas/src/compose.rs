//! Channel compositor.
//!
//! Builds the channels the canvas actually shows: the requested group of the
//! primary image, either raw or compared pointwise against a reference image
//! with a [`Metric`].
//!
//! # Reference matching
//!
//! The reference group is found by, in order:
//!
//! 1. the same group name
//! 2. the same channel tails (`R,G,B` matches `beauty.R,beauty.G,beauty.B`)
//! 3. the same number of channels
//!
//! and otherwise fails with `ChannelMismatch`. Colour channels pair up by
//! position; a colour channel without a partner is compared against zero.
//! Alpha is never fed through the metric: the output alpha is the average of
//! both alphas.
//!
//! Images of different sizes are aligned by their centres. Reference samples
//! falling outside the reference read as zero.

use std::sync::Arc;

use hdrv_core::{Channel, ChannelGroup, Error, Image, Result};
use hdrv_task::{Task, ThreadPool};
use tracing::debug;

use crate::metric::Metric;

/// Picks the group shown for `requested`: the group itself when present,
/// the image's first group otherwise.
pub fn resolve_group<'a>(image: &'a Image, requested: &str) -> Option<&'a ChannelGroup> {
    image.group(requested).or_else(|| image.channel_groups().first())
}

/// Finds the reference group best matching `group`.
pub fn match_reference_group<'a>(reference: &'a Image, group: &ChannelGroup) -> Result<&'a ChannelGroup> {
    let tails = |g: &ChannelGroup| g.channels.iter().map(|n| Channel::tail(n).to_string()).collect::<Vec<_>>();
    let wanted = tails(group);

    reference
        .group(&group.name)
        .or_else(|| reference.channel_groups().iter().find(|g| tails(g) == wanted))
        .or_else(|| {
            reference
                .channel_groups()
                .iter()
                .find(|g| g.channels.len() == group.channels.len())
        })
        .ok_or_else(|| {
            Error::channel_mismatch(format!(
                "reference {} has no group comparable to '{}'",
                reference.name(),
                group.display_name()
            ))
        })
}

/// How one output channel is derived.
#[derive(Debug, Clone, Copy)]
enum Source {
    /// Copy of a primary channel.
    Raw,
    /// Metric against a reference channel, or against zero.
    Compare(Option<usize>),
    /// Mean of the primary and the reference alpha.
    AverageAlpha(usize),
}

#[derive(Debug, Clone)]
struct Output {
    name: String,
    channel: usize,
    source: Source,
}

/// Resolved recipe for the composited channels of one image pair.
#[derive(Debug, Clone)]
pub(crate) struct Composition {
    outputs: Vec<Output>,
    metric: Metric,
    offset: (i64, i64),
    width: usize,
}

impl Composition {
    pub(crate) fn new(image: &Image, reference: Option<&Image>, requested_group: &str, metric: Metric) -> Result<Self> {
        let group = resolve_group(image, requested_group)
            .ok_or_else(|| Error::invalid_image(format!("{} has no channels", image.name())))?;
        let index_in = |img: &Image, name: &str| {
            img.channel_index(name)
                .ok_or_else(|| Error::computation(format!("channel '{name}' vanished from {}", img.name())))
        };

        let mut outputs = Vec::with_capacity(group.channels.len());
        let mut offset = (0, 0);
        match reference {
            None => {
                for name in &group.channels {
                    outputs.push(Output {
                        name: Channel::tail(name).to_uppercase(),
                        channel: index_in(image, name.as_str())?,
                        source: Source::Raw,
                    });
                }
            }
            Some(reference) => {
                let ref_group = match_reference_group(reference, group)?;
                let mut ref_colours = ref_group.channels.iter().filter(|n| !Channel::is_alpha(n));
                let ref_alpha = ref_group.channels.iter().find(|n| Channel::is_alpha(n));

                for name in &group.channels {
                    let source = if Channel::is_alpha(name) {
                        match ref_alpha {
                            Some(alpha) => Source::AverageAlpha(index_in(reference, alpha.as_str())?),
                            None => Source::Raw,
                        }
                    } else {
                        let partner = ref_colours.next().map(|n| index_in(reference, n.as_str())).transpose()?;
                        Source::Compare(partner)
                    };
                    outputs.push(Output {
                        name: Channel::tail(name).to_uppercase(),
                        channel: index_in(image, name.as_str())?,
                        source,
                    });
                }

                let (w, h) = image.size();
                let (rw, rh) = reference.size();
                offset = ((rw as i64 - w as i64) / 2, (rh as i64 - h as i64) / 2);
            }
        }

        Ok(Self {
            outputs,
            metric,
            offset,
            width: image.width(),
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.outputs.len()
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|o| o.name.as_str())
    }

    /// Value of output `k` at linear pixel `index` of the primary image.
    #[inline]
    pub(crate) fn sample(&self, image: &Image, reference: Option<&Image>, k: usize, index: usize) -> f32 {
        let output = &self.outputs[k];
        let value = image.channels()[output.channel].eval(index);
        let ref_value = |c: usize| match reference {
            Some(reference) => {
                let x = (index % self.width) as i64 + self.offset.0;
                let y = (index / self.width) as i64 + self.offset.1;
                reference.channels()[c].eval_at(x, y)
            }
            None => 0.0,
        };
        match output.source {
            Source::Raw => value,
            Source::Compare(partner) => self.metric.apply(value, partner.map_or(0.0, ref_value)),
            Source::AverageAlpha(alpha) => 0.5 * (value + ref_value(alpha)),
        }
    }
}

/// Composites the displayed channels of `image` (optionally against
/// `reference`) on the pool.
///
/// Output channels are named by the upper-cased tail of their source
/// channel and have the primary image's size.
pub fn channels_from_images(
    pool: &ThreadPool,
    image: Arc<Image>,
    reference: Option<Arc<Image>>,
    requested_group: &str,
    metric: Metric,
    priority: i32,
) -> Task<Vec<Channel>> {
    let composition = match Composition::new(&image, reference.as_deref(), requested_group, metric) {
        Ok(c) => Arc::new(c),
        Err(e) => return Task::failed(e),
    };
    debug!(
        image = image.name(),
        reference = reference.as_ref().map(|r| r.name()),
        group = requested_group,
        outputs = composition.len(),
        "compositing channels"
    );

    let (width, height) = image.size();
    let planes: Vec<Task<Vec<Vec<f32>>>> = (0..composition.len())
        .map(|k| {
            let composition = Arc::clone(&composition);
            let image = Arc::clone(&image);
            let reference = reference.clone();
            pool.map_chunks(width * height, priority, move |range| {
                range
                    .map(|i| composition.sample(&image, reference.as_deref(), k, i))
                    .collect::<Vec<f32>>()
            })
        })
        .collect();

    pool.spawn(priority, async move {
        let mut channels = Vec::with_capacity(planes.len());
        for (plane, name) in planes.into_iter().zip(composition.names()) {
            let data: Vec<f32> = plane.await?.concat();
            let channel = Channel::from_data(name, width, height, data)
                .ok_or_else(|| Error::computation("composited channel has the wrong size"))?;
            channels.push(channel);
        }
        Ok(channels)
    })
}

/// Composited values of every output channel at pixel `(x, y)`.
///
/// Returns an empty vector outside the image.
pub fn composite_pixel(
    image: &Image,
    reference: Option<&Image>,
    requested_group: &str,
    metric: Metric,
    x: usize,
    y: usize,
) -> Result<Vec<(String, f32)>> {
    let (width, height) = image.size();
    if x >= width || y >= height {
        return Ok(Vec::new());
    }
    let composition = Composition::new(image, reference, requested_group, metric)?;
    let index = y * width + x;
    Ok(composition
        .names()
        .enumerate()
        .map(|(k, name)| (name.to_string(), composition.sample(image, reference, k, index)))
        .collect())
}
