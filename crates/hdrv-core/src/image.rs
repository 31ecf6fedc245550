//! Decoded images and their channel groups.
//!
//! Loaders produce an [`ImageData`]: a bag of equally sized [`Channel`]s plus
//! an alpha convention flag. Once validated it is wrapped into an immutable
//! [`Image`], which is shared between the interactive thread and background
//! tasks through `Arc<Image>` and never mutated afterwards.
//!
//! # Groups
//!
//! Every channel belongs to exactly one [`ChannelGroup`]: the group named
//! after its layer (`"diffuse.R"` belongs to `"diffuse"`, `"R"` to `""`).
//! Members are listed in canonical display order, colour triplets first and
//! alpha last:
//!
//! ```rust
//! use hdrv_core::{Channel, Image, ImageData};
//!
//! let channels = ["A", "B", "G", "R", "diffuse.R"]
//!     .iter()
//!     .map(|n| Channel::new(*n, 4, 4))
//!     .collect();
//! let image = Image::from_data("test.exr", ImageData::new(channels, true), "").unwrap();
//!
//! assert_eq!(image.channels_in_group(""), ["R", "G", "B", "A"]);
//! assert_eq!(image.channels_in_group("diffuse"), ["diffuse.R"]);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use crate::channel::Channel;
use crate::error::{Error, Result};

/// Channel tails that form a group's leading block, tried in order.
const CANONICAL_ORDER: [&[&str]; 8] = [
    &["R", "G", "B"],
    &["r", "g", "b"],
    &["X", "Y", "Z"],
    &["x", "y", "z"],
    &["U", "V"],
    &["u", "v"],
    &["Z"],
    &["z"],
];

static NEXT_IMAGE_ID: AtomicUsize = AtomicUsize::new(0);

// =============================================================================
// ImageData
// =============================================================================

/// Transient decode result, exclusively owned by the decoding task.
#[derive(Debug, Clone, Default)]
pub struct ImageData {
    /// Decoded planes in the order the loader produced them.
    pub channels: Vec<Channel>,
    /// Whether colour channels are already multiplied by alpha.
    pub has_premultiplied_alpha: bool,
}

impl ImageData {
    /// Creates image data from decoded channels.
    pub fn new(channels: Vec<Channel>, has_premultiplied_alpha: bool) -> Self {
        Self {
            channels,
            has_premultiplied_alpha,
        }
    }

    /// Size of the first channel, `(0, 0)` when empty.
    pub fn size(&self) -> (usize, usize) {
        self.channels.first().map(Channel::size).unwrap_or((0, 0))
    }

    /// Looks up a channel by full name.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name() == name)
    }

    /// Looks up a channel by full name for mutation.
    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.name() == name)
    }

    /// Whether a channel with this full name exists.
    pub fn has_channel(&self, name: &str) -> bool {
        self.channel(name).is_some()
    }

    /// Layer names in order of first appearance. The root layer is `""`.
    pub fn layers(&self) -> Vec<String> {
        let mut layers: Vec<String> = Vec::new();
        for c in &self.channels {
            let head = Channel::head(c.name());
            if !layers.iter().any(|l| l == head) {
                layers.push(head.to_string());
            }
        }
        layers
    }

    /// Full names of the channels directly inside `layer`.
    pub fn channels_in_layer(&self, layer: &str) -> Vec<String> {
        self.channels
            .iter()
            .filter(|c| Channel::head(c.name()) == layer)
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Checks the invariants an [`Image`] relies on.
    ///
    /// Requires at least one channel, unique channel names and identical
    /// sizes across all channels.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(Error::invalid_image("images must have at least one channel"));
        }

        let (width, height) = self.size();
        for (i, c) in self.channels.iter().enumerate() {
            if c.size() != (width, height) {
                return Err(Error::invalid_image(format!(
                    "all channels must have the same size as their image ({}: {}x{} != {}x{})",
                    c.name(),
                    c.width(),
                    c.height(),
                    width,
                    height
                )));
            }
            if self.channels[..i].iter().any(|other| other.name() == c.name()) {
                return Err(Error::invalid_image(format!("duplicate channel '{}'", c.name())));
            }
        }

        Ok(())
    }

    /// Multiplies every colour channel by its layer's alpha.
    pub fn multiply_alpha(&mut self) {
        self.alpha_operation(|value, alpha| value * alpha);
        self.has_premultiplied_alpha = true;
    }

    /// Divides every colour channel by its layer's alpha.
    ///
    /// Samples with zero alpha become zero.
    pub fn unmultiply_alpha(&mut self) {
        self.alpha_operation(|value, alpha| if alpha == 0.0 { 0.0 } else { value / alpha });
        self.has_premultiplied_alpha = false;
    }

    fn alpha_operation(&mut self, op: impl Fn(f32, f32) -> f32) {
        for layer in self.layers() {
            let prefix = if layer.is_empty() { String::new() } else { format!("{layer}.") };
            let alpha_name = format!("{prefix}A");
            let Some(alpha) = self.channel(&alpha_name).map(|c| c.data().to_vec()) else {
                continue;
            };

            for name in self.channels_in_layer(&layer) {
                if name == alpha_name {
                    continue;
                }
                if let Some(target) = self.channel_mut(&name) {
                    for (v, &a) in target.data_mut().iter_mut().zip(&alpha) {
                        *v = op(*v, a);
                    }
                }
            }
        }
    }
}

// =============================================================================
// ChannelGroup
// =============================================================================

/// An ordered set of channel names sharing one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroup {
    /// Group (layer) name, `""` for root channels.
    pub name: String,
    /// Full channel names in display order.
    pub channels: Vec<String>,
}

impl ChannelGroup {
    /// Builds the group for `layer` from its members in insertion order.
    pub fn from_layer(layer: &str, members: Vec<String>) -> Self {
        let mut remaining = members;
        let mut ordered = Vec::with_capacity(remaining.len());

        let alpha_pos = remaining.iter().position(|n| Channel::is_alpha(n));
        let alpha = alpha_pos.map(|pos| remaining.remove(pos));

        for pattern in CANONICAL_ORDER {
            for tail in pattern {
                if let Some(pos) = remaining.iter().position(|n| Channel::tail(n) == *tail) {
                    ordered.push(remaining.remove(pos));
                }
            }
        }
        ordered.append(&mut remaining);
        ordered.extend(alpha);

        Self {
            name: layer.to_string(),
            channels: ordered,
        }
    }

    /// Label for menus: `R,G,B,A`, `diffuse.R` or `diffuse.(R,G,B)`.
    pub fn display_name(&self) -> String {
        let tails: Vec<&str> = self.channels.iter().map(|n| Channel::tail(n)).collect();
        let joined = tails.join(",");
        if self.name.is_empty() {
            joined
        } else if tails.len() == 1 {
            format!("{}.{}", self.name, joined)
        } else {
            format!("{}.({})", self.name, joined)
        }
    }

    /// Position of the group's alpha channel, if any.
    pub fn alpha_index(&self) -> Option<usize> {
        self.channels.iter().position(|n| Channel::is_alpha(n))
    }
}

// =============================================================================
// Image
// =============================================================================

/// An immutable, fully decoded image.
pub struct Image {
    id: usize,
    path: PathBuf,
    channel_selector: String,
    name: String,
    loaded_at: SystemTime,
    data: ImageData,
    groups: Vec<ChannelGroup>,
    lookup: HashMap<String, usize>,
}

impl Image {
    /// Draws a fresh process-unique image id.
    pub fn draw_id() -> usize {
        NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Wraps validated image data under an explicit id.
    pub fn new(id: usize, path: impl Into<PathBuf>, data: ImageData, channel_selector: &str) -> Result<Self> {
        data.ensure_valid()?;

        let path = path.into();
        let name = if channel_selector.is_empty() {
            path.display().to_string()
        } else {
            format!("{}:{}", path.display(), channel_selector)
        };

        let groups = data
            .layers()
            .iter()
            .map(|layer| ChannelGroup::from_layer(layer, data.channels_in_layer(layer)))
            .collect();

        let lookup = data
            .channels
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name().to_string(), i))
            .collect();

        Ok(Self {
            id,
            path,
            channel_selector: channel_selector.to_string(),
            name,
            loaded_at: SystemTime::now(),
            data,
            groups,
            lookup,
        })
    }

    /// Wraps validated image data under a freshly drawn id.
    pub fn from_data(path: impl Into<PathBuf>, data: ImageData, channel_selector: &str) -> Result<Self> {
        Self::new(Self::draw_id(), path, data, channel_selector)
    }

    /// Process-unique id.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Source path.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Selector the image was loaded with.
    #[inline]
    pub fn channel_selector(&self) -> &str {
        &self.channel_selector
    }

    /// `path` or `path:selector`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name without directories or selector.
    pub fn short_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Wall-clock time the image was constructed.
    #[inline]
    pub fn loaded_at(&self) -> SystemTime {
        self.loaded_at
    }

    /// `(width, height)`.
    #[inline]
    pub fn size(&self) -> (usize, usize) {
        self.data.size()
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.size().0
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.size().1
    }

    /// Pixel count.
    #[inline]
    pub fn count(&self) -> usize {
        let (w, h) = self.size();
        w * h
    }

    /// Whether colour channels are premultiplied by alpha.
    #[inline]
    pub fn has_premultiplied_alpha(&self) -> bool {
        self.data.has_premultiplied_alpha
    }

    /// Looks up a channel by full name.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.lookup.get(name).map(|&i| &self.data.channels[i])
    }

    /// Whether a channel with this full name exists.
    pub fn has_channel(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    /// Position of a channel in [`Image::channels`].
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    /// All channels in insertion order.
    pub fn channels(&self) -> &[Channel] {
        &self.data.channels
    }

    /// Layer names in order of first appearance.
    pub fn layers(&self) -> Vec<String> {
        self.data.layers()
    }

    /// All channel groups, one per layer.
    pub fn channel_groups(&self) -> &[ChannelGroup] {
        &self.groups
    }

    /// Looks up a group by name.
    pub fn group(&self, name: &str) -> Option<&ChannelGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Member names of a group; empty when the group does not exist.
    pub fn channels_in_group(&self, name: &str) -> Vec<String> {
        self.group(name).map(|g| g.channels.clone()).unwrap_or_default()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size())
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.size();
        writeln!(f, "Path: {}", self.name)?;
        writeln!(f, "Resolution: ({w}, {h})")?;
        write!(f, "Channels:")?;
        for group in &self.groups {
            let layer = if group.name.is_empty() { "<root>" } else { &group.name };
            let tails: Vec<&str> = group.channels.iter().map(|n| Channel::tail(n)).collect();
            write!(f, "\n  {}: {}", layer, tails.join(","))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn data_with(names: &[&str], width: usize, height: usize) -> ImageData {
        ImageData::new(names.iter().map(|n| Channel::new(*n, width, height)).collect(), true)
    }

    #[test]
    fn every_channel_in_exactly_one_group() {
        let data = data_with(&["R", "G", "B", "A", "diffuse.R", "diffuse.G", "depth.Z", "a.b.X"], 2, 2);
        let image = Image::from_data("x.exr", data, "").unwrap();

        let mut seen: Vec<&str> = image
            .channel_groups()
            .iter()
            .flat_map(|g| g.channels.iter().map(String::as_str))
            .collect();
        seen.sort_unstable();
        let mut all: Vec<&str> = image.channels().iter().map(Channel::name).collect();
        all.sort_unstable();
        assert_eq!(seen, all);

        let names: Vec<&str> = image.channel_groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["", "diffuse", "depth", "a.b"]);
    }

    #[test]
    fn channel_index_follows_insertion_order() {
        let image = Image::from_data("x.exr", data_with(&["diffuse.R", "R", "A"], 1, 1), "").unwrap();
        assert_eq!(image.channel_index("diffuse.R"), Some(0));
        assert_eq!(image.channel_index("A"), Some(2));
        assert_eq!(image.channel_index("G"), None);
        assert_eq!(image.channels()[image.channel_index("R").unwrap()].name(), "R");
    }

    #[test]
    fn canonical_order_puts_alpha_last() {
        let group = ChannelGroup::from_layer(
            "beauty",
            vec!["beauty.A".into(), "beauty.extra".into(), "beauty.B".into(), "beauty.R".into(), "beauty.G".into()],
        );
        assert_eq!(group.channels, ["beauty.R", "beauty.G", "beauty.B", "beauty.extra", "beauty.A"]);
        assert_eq!(group.alpha_index(), Some(4));
        assert_eq!(group.display_name(), "beauty.(R,G,B,extra,A)");
    }

    #[test]
    fn display_names() {
        let root = ChannelGroup::from_layer("", vec!["G".into(), "R".into(), "B".into()]);
        assert_eq!(root.display_name(), "R,G,B");
        let single = ChannelGroup::from_layer("depth", vec!["depth.Z".into()]);
        assert_eq!(single.display_name(), "depth.Z");
    }

    #[test]
    fn mismatched_sizes_are_invalid() {
        let data = ImageData::new(vec![Channel::new("R", 2, 2), Channel::new("G", 3, 2)], true);
        assert!(data.ensure_valid().is_err());
        assert!(Image::from_data("x", data, "").is_err());
    }

    #[test]
    fn empty_and_duplicate_are_invalid() {
        assert!(ImageData::default().ensure_valid().is_err());
        let dup = data_with(&["R", "R"], 1, 1);
        assert!(dup.ensure_valid().is_err());
    }

    #[test]
    fn premultiply_roundtrip() {
        let mut data = ImageData::new(
            vec![
                Channel::from_data("R", 2, 1, vec![0.8, 0.4]).unwrap(),
                Channel::from_data("A", 2, 1, vec![0.5, 0.0]).unwrap(),
            ],
            false,
        );
        data.multiply_alpha();
        assert!(data.has_premultiplied_alpha);
        assert_relative_eq!(data.channel("R").unwrap().data()[0], 0.4);
        assert_relative_eq!(data.channel("A").unwrap().data()[0], 0.5);

        data.unmultiply_alpha();
        assert_relative_eq!(data.channel("R").unwrap().data()[0], 0.8);
        assert_eq!(data.channel("R").unwrap().data()[1], 0.0);
    }

    #[test]
    fn ids_are_unique_and_names_include_selector() {
        let a = Image::from_data("/tmp/a.exr", data_with(&["R"], 1, 1), "").unwrap();
        let b = Image::from_data("/tmp/a.exr", data_with(&["R"], 1, 1), "diffuse").unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(b.name(), "/tmp/a.exr:diffuse");
        assert_eq!(b.short_name(), "a.exr");
        assert!(a.to_string().contains("<root>: R"));
    }

    #[test]
    fn missing_group_is_empty() {
        let image = Image::from_data("x", data_with(&["R"], 1, 1), "").unwrap();
        assert!(image.channels_in_group("nope").is_empty());
    }
}
