//! Immutable dataset configuration.
//!
//! Defaults reproduce the constants the browser training demo shipped with.

use crate::error::{Error, Result};
use crate::label::LabelVocabulary;
use crate::normalize::IntensityNormalizer;
use crate::resample::Interpolation;
use serde::{Deserialize, Serialize};

/// Configuration for the volumetric slice pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Samples per batch. Must be positive.
    pub batch_size: usize,
    /// Sample cap for training streams.
    pub max_train_samples: usize,
    /// Sample cap for test streams.
    pub max_test_samples: usize,
    /// Intensity normalization applied after resizing.
    pub normalizer: IntensityNormalizer,
    /// Subject label vocabulary.
    pub vocabulary: LabelVocabulary,
    /// Output `(width, height)` of every slice.
    pub target_size: (usize, usize),
    /// Resampling method.
    pub interpolation: Interpolation,
    /// Factor applied to raw voxel values before normalization.
    ///
    /// Volumes decoded to unit range use 255 so they land on the 8-bit
    /// scale the normalizer expects.
    pub voxel_scale: f32,
    /// Shuffle subject order once at construction.
    pub shuffle: bool,
    /// Seed for subject shuffling. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            max_train_samples: 10,
            max_test_samples: 1,
            normalizer: IntensityNormalizer::imagenet(),
            vocabulary: LabelVocabulary::lesion(),
            target_size: (224, 224),
            interpolation: Interpolation::Bilinear,
            voxel_scale: 255.0,
            shuffle: false,
            seed: None,
        }
    }
}

impl PipelineConfig {
    /// Default configuration with the given batch size.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Default::default()
        }
    }

    /// Set batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set training and test sample caps.
    pub fn max_samples(mut self, train: usize, test: usize) -> Self {
        self.max_train_samples = train;
        self.max_test_samples = test;
        self
    }

    /// Set the normalizer.
    pub fn normalizer(mut self, normalizer: IntensityNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Set the label vocabulary.
    pub fn vocabulary(mut self, vocabulary: LabelVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Set output slice size.
    pub fn target_size(mut self, width: usize, height: usize) -> Self {
        self.target_size = (width, height);
        self
    }

    /// Set resampling method.
    pub fn interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Set raw voxel scale.
    pub fn voxel_scale(mut self, scale: f32) -> Self {
        self.voxel_scale = scale;
        self
    }

    /// Shuffle subjects deterministically with `seed`.
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.seed = Some(seed);
        self
    }

    /// Parse a RON document. Missing fields take their defaults.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source).map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field, failing with [`Error::InvalidConfig`].
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_string()));
        }
        let (w, h) = self.target_size;
        if w == 0 || h == 0 {
            return Err(Error::InvalidConfig(format!(
                "target_size {w}x{h} must be positive"
            )));
        }
        if !self.voxel_scale.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "voxel_scale must be finite, got {}",
                self.voxel_scale
            )));
        }
        self.normalizer.validate()
    }
}

/// Configuration for the flat-binary IDX (MNIST-style) dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MnistConfig {
    /// Samples per batch. Must be positive.
    pub batch_size: usize,
    /// Sample cap for training streams.
    pub max_train_samples: usize,
    /// Sample cap for test streams.
    pub max_test_samples: usize,
    /// Grayscale normalization.
    pub normalizer: IntensityNormalizer,
}

impl Default for MnistConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            max_train_samples: 60_000,
            max_test_samples: 10_000,
            normalizer: IntensityNormalizer::mnist(),
        }
    }
}

impl MnistConfig {
    /// Default configuration with the given batch size.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Default::default()
        }
    }

    /// Set training and test sample caps.
    pub fn max_samples(mut self, train: usize, test: usize) -> Self {
        self.max_train_samples = train;
        self.max_test_samples = test;
        self
    }

    /// Check every field, failing with [`Error::InvalidConfig`].
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_string()));
        }
        self.normalizer.validate()
    }
}
