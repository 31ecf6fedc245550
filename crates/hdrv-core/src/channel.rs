//! Named planes of 32-bit float samples.
//!
//! A [`Channel`] is one dense row-major plane. Its name may carry a dotted
//! layer path (`"diffuse.R"`, `"beauty.specular.G"`); the part after the last
//! dot is the channel's *tail*, the part before it is its *layer*.

use std::fmt;

/// A single named 2D plane of `f32` samples.
#[derive(Clone, PartialEq)]
pub struct Channel {
    name: String,
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Channel {
    /// Creates a zero-filled channel.
    pub fn new(name: impl Into<String>, width: usize, height: usize) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    /// Creates a channel from existing samples.
    ///
    /// Returns `None` if `data.len() != width * height`.
    pub fn from_data(name: impl Into<String>, width: usize, height: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Self {
            name: name.into(),
            width,
            height,
            data,
        })
    }

    /// Full channel name including its layer path.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the channel.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// `(width, height)`.
    #[inline]
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Number of samples.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Sample storage.
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable sample storage.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consumes the channel, returning its samples.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Sample at linear index. Out of range reads as 0.
    #[inline]
    pub fn eval(&self, index: usize) -> f32 {
        self.data.get(index).copied().unwrap_or(0.0)
    }

    /// Sample at `(x, y)`. Coordinates outside the plane read as 0.
    #[inline]
    pub fn eval_at(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0.0;
        }
        self.data[y as usize * self.width + x as usize]
    }

    /// Layer part of `name` (`"a.b.R"` -> `"a.b"`, `"R"` -> `""`).
    pub fn head(name: &str) -> &str {
        match name.rfind('.') {
            Some(pos) => &name[..pos],
            None => "",
        }
    }

    /// Channel part of `name` (`"a.b.R"` -> `"R"`).
    pub fn tail(name: &str) -> &str {
        match name.rfind('.') {
            Some(pos) => &name[pos + 1..],
            None => name,
        }
    }

    /// Whether `name` designates an alpha channel.
    pub fn is_alpha(name: &str) -> bool {
        Self::tail(name).eq_ignore_ascii_case("a")
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Checks a channel name against a loader channel selector.
///
/// The selector is a comma-separated list of terms. An empty selector keeps
/// every channel; otherwise a channel is kept when its full name contains
/// any non-empty term.
///
/// ```rust
/// use hdrv_core::matches_channel_selector;
///
/// assert!(matches_channel_selector("diffuse.R", ""));
/// assert!(matches_channel_selector("diffuse.R", "specular,diffuse"));
/// assert!(!matches_channel_selector("normal.X", "diffuse"));
/// ```
pub fn matches_channel_selector(name: &str, selector: &str) -> bool {
    let mut terms = selector.split(',').map(str::trim).filter(|t| !t.is_empty()).peekable();
    if terms.peek().is_none() {
        return true;
    }
    terms.any(|term| name.contains(term))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_and_tail() {
        assert_eq!(Channel::head("diffuse.R"), "diffuse");
        assert_eq!(Channel::tail("diffuse.R"), "R");
        assert_eq!(Channel::head("a.b.G"), "a.b");
        assert_eq!(Channel::tail("a.b.G"), "G");
        assert_eq!(Channel::head("Z"), "");
        assert_eq!(Channel::tail("Z"), "Z");
    }

    #[test]
    fn alpha_detection() {
        assert!(Channel::is_alpha("A"));
        assert!(Channel::is_alpha("beauty.a"));
        assert!(!Channel::is_alpha("AO"));
        assert!(!Channel::is_alpha("alpha.R"));
    }

    #[test]
    fn eval_out_of_bounds_is_zero() {
        let chan = Channel::from_data("R", 2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(chan.eval_at(1, 1), 4.0);
        assert_eq!(chan.eval_at(-1, 0), 0.0);
        assert_eq!(chan.eval_at(2, 0), 0.0);
        assert_eq!(chan.eval(17), 0.0);
    }

    #[test]
    fn from_data_rejects_bad_length() {
        assert!(Channel::from_data("R", 3, 3, vec![0.0; 8]).is_none());
    }

    #[test]
    fn selector_terms() {
        assert!(matches_channel_selector("R", " , "));
        assert!(matches_channel_selector("depth.Z", "Z"));
        assert!(!matches_channel_selector("R", "G,B"));
    }
}
