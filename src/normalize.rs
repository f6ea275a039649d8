//! Per-channel intensity normalization.
//!
//! Maps raw intensities in `[0, pixel_max]` to a zero-centred, unit-scale
//! representation: `(raw / pixel_max - mean[c]) / std[c]`. Values are never
//! clamped, so results may fall outside `[-1, 1]`.

use crate::error::{Error, Result};
use crate::slice::{Raster, CHANNELS};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

/// Mean/std statistics, either one pair for grayscale data or one per RGB channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelStats {
    /// One mean/std pair applied to every channel.
    Scalar {
        /// Mean in unit range.
        mean: f32,
        /// Standard deviation in unit range.
        std: f32,
    },
    /// One mean/std pair per RGB channel.
    PerChannel {
        /// Channel means.
        mean: [f32; CHANNELS],
        /// Channel standard deviations.
        std: [f32; CHANNELS],
    },
}

/// Affine intensity normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityNormalizer {
    /// Largest raw intensity, mapped to 1.0 before centring.
    pub pixel_max: f32,
    /// Centring and scaling statistics.
    pub stats: ChannelStats,
}

impl Default for IntensityNormalizer {
    fn default() -> Self {
        Self::imagenet()
    }
}

impl IntensityNormalizer {
    /// Normalizer with a single mean/std for every channel.
    pub fn scalar(pixel_max: f32, mean: f32, std: f32) -> Self {
        Self {
            pixel_max,
            stats: ChannelStats::Scalar { mean, std },
        }
    }

    /// Normalizer with a mean/std per RGB channel.
    pub fn per_channel(pixel_max: f32, mean: [f32; CHANNELS], std: [f32; CHANNELS]) -> Self {
        Self {
            pixel_max,
            stats: ChannelStats::PerChannel { mean, std },
        }
    }

    /// ImageNet RGB statistics on 8-bit intensities.
    pub fn imagenet() -> Self {
        Self::per_channel(255.0, [0.485, 0.456, 0.406], [0.229, 0.224, 0.225])
    }

    /// MNIST grayscale statistics on 8-bit intensities.
    pub fn mnist() -> Self {
        Self::scalar(255.0, 0.1307, 0.3081)
    }

    /// Reject statistics that would divide by zero or produce NaN.
    pub fn validate(&self) -> Result<()> {
        if !self.pixel_max.is_finite() || self.pixel_max == 0.0 {
            return Err(Error::InvalidConfig(format!(
                "pixel_max must be finite and non-zero, got {}",
                self.pixel_max
            )));
        }

        let (means, stds): (&[f32], &[f32]) = match &self.stats {
            ChannelStats::Scalar { mean, std } => {
                (std::slice::from_ref(mean), std::slice::from_ref(std))
            }
            ChannelStats::PerChannel { mean, std } => (mean, std),
        };

        for (c, (&m, &s)) in means.iter().zip(stds).enumerate() {
            if !m.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "mean[{c}] must be finite, got {m}"
                )));
            }
            if !s.is_finite() || s == 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "std[{c}] must be finite and non-zero, got {s}"
                )));
            }
        }

        Ok(())
    }

    /// Mean/std pair selected by `channel`.
    ///
    /// # Panics
    ///
    /// Panics if the statistics are per-channel and `channel >= CHANNELS`.
    /// Scalar statistics accept any channel.
    #[inline]
    pub fn channel_stats(&self, channel: usize) -> (f32, f32) {
        debug_assert!(
            matches!(self.stats, ChannelStats::Scalar { .. }) || channel < CHANNELS,
            "channel {channel} out of range for {CHANNELS} per-channel statistics"
        );
        match &self.stats {
            ChannelStats::Scalar { mean, std } => (*mean, *std),
            ChannelStats::PerChannel { mean, std } => (mean[channel], std[channel]),
        }
    }

    /// Normalize one raw intensity for `channel`.
    #[inline]
    #[must_use]
    pub fn normalize(&self, raw: f32, channel: usize) -> f32 {
        let (mean, std) = self.channel_stats(channel);
        (raw / self.pixel_max - mean) / std
    }

    /// Convert an interleaved RGB raster into a planar `[3, height, width]` tensor.
    #[must_use = "this function returns a new tensor and does not modify the raster"]
    pub fn normalize_raster(&self, raster: &Raster) -> Array3<f32> {
        let (width, height) = (raster.width(), raster.height());
        let data = raster.as_slice();
        Array3::from_shape_fn((CHANNELS, height, width), |(c, y, x)| {
            self.normalize(data[(y * width + x) * CHANNELS + c], c)
        })
    }

    /// Normalize a flat buffer of single-channel bytes (IDX path).
    pub fn normalize_bytes(&self, bytes: &[u8]) -> Vec<f32> {
        bytes.iter().map(|&b| self.normalize(f32::from(b), 0)).collect()
    }
}
