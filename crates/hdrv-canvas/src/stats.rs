//! Canvas statistics.
//!
//! Mean, min, max and a histogram of the composited channels, computed in two
//! parallel passes over the pool: a min/max/sum reduction, then the bucket
//! counts.
//!
//! The histogram has [`NUM_BUCKETS`] buckets spanning `[min, max]` on a
//! symmetric log axis, `slog(v) = sign(v) * (ln(|v| + 0.001) - ln(0.001))`,
//! which resolves detail near zero and still covers large HDR values.
//!
//! Alpha is left out unless it is the only channel. Non-finite samples are
//! skipped; they stay visible in the channels themselves.

use std::sync::Arc;
use std::time::Instant;

use hdrv_core::{Channel, Image};
use hdrv_task::{Task, ThreadPool};
use tracing::debug;

use crate::compose::channels_from_images;
use crate::metric::Metric;

/// Number of histogram buckets.
pub const NUM_BUCKETS: usize = 400;

const SLOG_EPSILON: f32 = 0.001;

/// Symmetric logarithm used for the histogram axis.
#[inline]
pub fn slog(v: f32) -> f32 {
    v.signum() * ((v.abs() + SLOG_EPSILON).ln() - SLOG_EPSILON.ln())
}

/// Inverse of [`slog`].
#[inline]
pub fn islog(s: f32) -> f32 {
    s.signum() * ((s.abs() + SLOG_EPSILON.ln()).exp() - SLOG_EPSILON)
}

/// Aggregate statistics of the displayed channels.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasStatistics {
    /// Mean of all finite samples.
    pub mean: f32,
    /// Smallest finite sample.
    pub min: f32,
    /// Largest finite sample.
    pub max: f32,
    /// Sample count per bucket.
    pub histogram: Vec<u64>,
    /// Number of channels that contributed.
    pub num_channels: usize,
    /// Bucket holding the value zero.
    pub histogram_zero: usize,
    /// Number of finite samples.
    pub finite_count: u64,
}

impl CanvasStatistics {
    /// Statistics of a channel set without finite samples.
    pub fn empty(num_channels: usize) -> Self {
        Self {
            mean: 0.0,
            min: 0.0,
            max: 0.0,
            histogram: vec![0; NUM_BUCKETS],
            num_channels,
            histogram_zero: 0,
            finite_count: 0,
        }
    }

    /// Bucket that `value` falls into.
    pub fn bucket_of(&self, value: f32) -> usize {
        Axis::new(self.min, self.max).bucket(value)
    }

    /// Value range `[start, end)` covered by `bucket`.
    pub fn bucket_range(&self, bucket: usize) -> (f32, f32) {
        let axis = Axis::new(self.min, self.max);
        (axis.edge(bucket), axis.edge(bucket + 1))
    }

    /// Bucket densities scaled for drawing.
    ///
    /// Each count is divided by its bucket's width in value space, then the
    /// result is normalised by the 10th-largest density so a few spikes do
    /// not flatten the rest. Values are clamped to `[0, 1]`.
    pub fn display_histogram(&self) -> Vec<f32> {
        let axis = Axis::new(self.min, self.max);
        let densities: Vec<f32> = self
            .histogram
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let width = axis.edge(i + 1) - axis.edge(i);
                if width > 0.0 { count as f32 / width } else { count as f32 }
            })
            .collect();

        let mut sorted = densities.clone();
        sorted.sort_unstable_by(|a, b| b.total_cmp(a));
        let norm = match sorted.get(9) {
            Some(&tenth) if tenth > 0.0 => tenth,
            _ => sorted.first().copied().unwrap_or(0.0),
        };
        if norm <= 0.0 {
            return vec![0.0; densities.len()];
        }
        densities.into_iter().map(|d| (d / norm).min(1.0)).collect()
    }
}

/// Maps values to buckets on the slog axis between `min` and `max`.
#[derive(Debug, Clone, Copy)]
struct Axis {
    lo: f32,
    span: f32,
}

impl Axis {
    fn new(min: f32, max: f32) -> Self {
        let lo = slog(min);
        Self { lo, span: slog(max) - lo }
    }

    #[inline]
    fn bucket(&self, value: f32) -> usize {
        if !(self.span > 0.0) {
            return 0;
        }
        let pos = (NUM_BUCKETS as f32 * (slog(value) - self.lo) / self.span).floor();
        pos.clamp(0.0, (NUM_BUCKETS - 1) as f32) as usize
    }

    fn edge(&self, bucket: usize) -> f32 {
        islog(self.lo + self.span * bucket as f32 / NUM_BUCKETS as f32)
    }
}

#[derive(Debug, Clone, Copy)]
struct Partial {
    sum: f64,
    min: f32,
    max: f32,
    count: u64,
}

impl Partial {
    const EMPTY: Partial = Partial {
        sum: 0.0,
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
        count: 0,
    };

    fn merge(self, other: Partial) -> Partial {
        Partial {
            sum: self.sum + other.sum,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            count: self.count + other.count,
        }
    }
}

/// Channels that count towards the statistics.
fn selected_channels(channels: Vec<Channel>) -> Vec<Channel> {
    let (alpha, colour): (Vec<Channel>, Vec<Channel>) = channels.into_iter().partition(|c| Channel::is_alpha(c.name()));
    if colour.is_empty() { alpha } else { colour }
}

/// Reduces a set of equally sized channels to statistics on the pool.
pub fn statistics_from_channels(pool: &ThreadPool, channels: Vec<Channel>, priority: i32) -> Task<CanvasStatistics> {
    let channels = Arc::new(selected_channels(channels));
    let num_channels = channels.len();
    let per_channel = channels.first().map_or(0, Channel::count);
    let total = per_channel * num_channels;
    let workers = pool.clone();

    // Linear index over all selected channels, channel-major.
    let sample = move |channels: &[Channel], i: usize| channels[i / per_channel].eval(i % per_channel);

    let reduce_channels = Arc::clone(&channels);
    let partials = pool.map_chunks(total, priority, move |range| {
        range.fold(Partial::EMPTY, |acc, i| {
            let v = sample(reduce_channels.as_slice(), i);
            if v.is_finite() {
                acc.merge(Partial {
                    sum: v as f64,
                    min: v,
                    max: v,
                    count: 1,
                })
            } else {
                acc
            }
        })
    });

    pool.spawn(priority, async move {
        let start = Instant::now();
        let totals = partials.await?.into_iter().fold(Partial::EMPTY, Partial::merge);
        if totals.count == 0 {
            return Ok(CanvasStatistics::empty(num_channels));
        }

        let axis = Axis::new(totals.min, totals.max);
        let count_channels = Arc::clone(&channels);
        let counts = workers
            .map_chunks(total, priority, move |range| {
                let mut histogram = vec![0u64; NUM_BUCKETS];
                for i in range {
                    let v = sample(count_channels.as_slice(), i);
                    if v.is_finite() {
                        histogram[axis.bucket(v)] += 1;
                    }
                }
                histogram
            })
            .await?;

        let mut histogram = vec![0u64; NUM_BUCKETS];
        for partial in counts {
            for (bucket, n) in histogram.iter_mut().zip(partial) {
                *bucket += n;
            }
        }

        let stats = CanvasStatistics {
            mean: (totals.sum / totals.count as f64) as f32,
            min: totals.min,
            max: totals.max,
            histogram,
            num_channels,
            histogram_zero: axis.bucket(0.0),
            finite_count: totals.count,
        };
        debug!(
            mean = stats.mean,
            min = stats.min,
            max = stats.max,
            samples = stats.finite_count,
            seconds = start.elapsed().as_secs_f64(),
            "computed canvas statistics"
        );
        Ok(stats)
    })
}

/// Composites the displayed channels and reduces them to statistics.
pub fn compute_canvas_statistics(
    pool: &ThreadPool,
    image: Arc<Image>,
    reference: Option<Arc<Image>>,
    requested_group: &str,
    metric: Metric,
    priority: i32,
) -> Task<Arc<CanvasStatistics>> {
    let channels = channels_from_images(pool, image, reference, requested_group, metric, priority);
    let workers = pool.clone();
    pool.spawn(priority, async move {
        let channels = channels.await?;
        let stats = statistics_from_channels(&workers, channels, priority).await?;
        Ok(Arc::new(stats))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn channel(name: &str, data: Vec<f32>) -> Channel {
        let w = data.len();
        Channel::from_data(name, w, 1, data).unwrap()
    }

    #[test]
    fn test_slog_roundtrip() {
        for v in [-100.0, -1.0, -0.01, 0.0, 0.5, 7.0, 1.0e4] {
            assert_relative_eq!(islog(slog(v)), v, epsilon = 1e-4, max_relative = 1e-4);
        }
        assert_eq!(slog(0.0), 0.0);
        assert!(slog(-2.0) < slog(-1.0));
    }

    #[test]
    fn test_axis_buckets() {
        let axis = Axis::new(0.0, 2.0);
        assert_eq!(axis.bucket(0.0), 0);
        assert_eq!(axis.bucket(2.0), NUM_BUCKETS - 1);
        assert_eq!(axis.bucket(-5.0), 0);
        assert!(axis.bucket(1.0) > NUM_BUCKETS / 2);

        let flat = Axis::new(3.0, 3.0);
        assert_eq!(flat.bucket(3.0), 0);
    }

    #[test]
    fn test_alpha_only_counts_when_alone() {
        let pool = ThreadPool::new(2).unwrap();
        let stats = statistics_from_channels(
            &pool,
            vec![channel("R", vec![2.0, 4.0]), channel("A", vec![100.0, 100.0])],
            0,
        )
        .wait()
        .unwrap();
        assert_eq!(stats.num_channels, 1);
        assert_eq!(stats.max, 4.0);

        let stats = statistics_from_channels(&pool, vec![channel("A", vec![0.5, 1.0])], 0)
            .wait()
            .unwrap();
        assert_eq!(stats.num_channels, 1);
        assert_relative_eq!(stats.mean, 0.75);
    }

    #[test]
    fn test_no_finite_samples() {
        let pool = ThreadPool::new(1).unwrap();
        let stats = statistics_from_channels(&pool, vec![channel("Y", vec![f32::NAN, f32::INFINITY])], 0)
            .wait()
            .unwrap();
        assert_eq!(stats, CanvasStatistics::empty(1));
    }

    #[test]
    fn test_large_input_spans_many_chunks() {
        let pool = ThreadPool::new(4).unwrap();
        let n = 100_000;
        let data: Vec<f32> = (0..n).map(|i| if i % 10 == 0 { f32::NAN } else { (i % 7) as f32 }).collect();
        let expected: Vec<f32> = data.iter().copied().filter(|v| v.is_finite()).collect();
        let expected_mean = expected.iter().map(|&v| v as f64).sum::<f64>() / expected.len() as f64;

        let stats = statistics_from_channels(&pool, vec![channel("Y", data)], 0).wait().unwrap();
        assert_eq!(stats.finite_count, expected.len() as u64);
        assert_eq!(stats.histogram.iter().sum::<u64>(), expected.len() as u64);
        assert_relative_eq!(stats.mean, expected_mean as f32, max_relative = 1e-6);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 6.0);
    }

    #[test]
    fn test_display_histogram_is_normalised() {
        let pool = ThreadPool::new(2).unwrap();
        let data: Vec<f32> = (0..1000).map(|i| i as f32 / 100.0).collect();
        let stats = statistics_from_channels(&pool, vec![channel("Y", data)], 0).wait().unwrap();
        let display = stats.display_histogram();
        assert_eq!(display.len(), NUM_BUCKETS);
        assert!(display.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(display.iter().any(|&v| v == 1.0));

        assert!(CanvasStatistics::empty(1).display_histogram().iter().all(|&v| v == 0.0));
    }
}
