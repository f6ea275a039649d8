//! Volumetric dataset pipeline.
//!
//! Subjects are labelled once at construction; every call to
//! [`DatasetPipeline::batches`] then starts a fresh, single-pass stream that
//! walks subjects in order and planes in order within each subject. Only one
//! plane is materialized at a time, so memory stays bounded by one batch.
//!
//! # Example
//! ```ignore
//! let pipeline = DatasetPipeline::training(volumes, PipelineConfig::with_batch_size(4))?;
//! for batch in pipeline.batches() {
//!     let batch = batch?;
//!     train_step(batch.images.view(), batch.labels.view());
//! }
//! ```

use crate::batch::{num_batches, Batch, BatchAssembler, Sample};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::label::resolve_label;
use crate::resample::resize_with;
use crate::slice::extract_slice_scaled;
use crate::volume::VolumeSource;
use ndarray::{Array1, Array4};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::num::NonZeroUsize;
use tracing::{debug, info};

/// Which sample cap a pipeline applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    /// Capped by `max_train_samples`.
    Train,
    /// Capped by `max_test_samples`.
    Test,
}

/// Lifecycle of a batch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Labels resolved, nothing pulled yet.
    SubjectsResolved,
    /// At least one batch has been pulled.
    Streaming,
    /// No further batches will be produced.
    Exhausted,
}

/// A volume together with its resolved class.
#[derive(Debug, Clone)]
pub struct Subject<V> {
    volume: V,
    label: i64,
}

impl<V: VolumeSource> Subject<V> {
    /// Subject name.
    pub fn name(&self) -> &str {
        self.volume.name()
    }

    /// Resolved class code.
    pub fn label(&self) -> i64 {
        self.label
    }

    /// Underlying volume.
    pub fn volume(&self) -> &V {
        &self.volume
    }
}

#[allow(clippy::option_if_let_else)]
fn get_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Labelled volume collection that streams fixed-shape batches.
#[derive(Debug)]
pub struct DatasetPipeline<V> {
    subjects: Vec<Subject<V>>,
    config: PipelineConfig,
    split: Split,
    batch_size: NonZeroUsize,
}

impl<V: VolumeSource> DatasetPipeline<V> {
    /// Resolve every subject's label and validate the configuration.
    ///
    /// Fails on the first subject that cannot be labelled; a dataset is
    /// never built from a subset of its volumes.
    pub fn new(
        volumes: impl IntoIterator<Item = V>,
        config: PipelineConfig,
        split: Split,
    ) -> Result<Self> {
        config.validate()?;
        let batch_size = NonZeroUsize::new(config.batch_size)
            .ok_or_else(|| Error::InvalidConfig("batch_size must be > 0".to_string()))?;

        let mut subjects = Vec::new();
        for volume in volumes {
            let [x, y, z, _] = volume.dims();
            if x == 0 || y == 0 || z == 0 {
                return Err(Error::InvalidDimensions(format!(
                    "volume '{}' has zero spatial dimension {:?}",
                    volume.name(),
                    [x, y, z]
                )));
            }
            let label = resolve_label(volume.name(), &config.vocabulary)?;
            debug!(subject = volume.name(), label, planes = z, "resolved subject");
            subjects.push(Subject { volume, label });
        }

        if config.shuffle {
            let mut rng = get_rng(config.seed);
            subjects.shuffle(&mut rng);
        }

        info!(
            subjects = subjects.len(),
            split = ?split,
            batch_size = config.batch_size,
            "dataset pipeline ready"
        );

        Ok(Self {
            subjects,
            config,
            split,
            batch_size,
        })
    }

    /// Pipeline capped by `max_train_samples`.
    pub fn training(volumes: impl IntoIterator<Item = V>, config: PipelineConfig) -> Result<Self> {
        Self::new(volumes, config, Split::Train)
    }

    /// Pipeline capped by `max_test_samples`.
    pub fn test(volumes: impl IntoIterator<Item = V>, config: PipelineConfig) -> Result<Self> {
        Self::new(volumes, config, Split::Test)
    }

    /// Labelled subjects in streaming order.
    pub fn subjects(&self) -> &[Subject<V>] {
        &self.subjects
    }

    /// Configuration the pipeline was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Split this pipeline serves.
    pub fn split(&self) -> Split {
        self.split
    }

    /// Sample cap for this split.
    pub fn max_samples(&self) -> usize {
        match self.split {
            Split::Train => self.config.max_train_samples,
            Split::Test => self.config.max_test_samples,
        }
    }

    /// Upper bound on batches, from the sample cap alone.
    pub fn num_batches(&self) -> usize {
        num_batches(self.max_samples(), self.batch_size.get())
    }

    /// Total planes across all subjects.
    pub fn len_planes(&self) -> usize {
        self.subjects.iter().map(|s| s.volume.num_planes()).sum()
    }

    /// Lazy per-plane samples, uncapped.
    pub fn samples(&self) -> SampleStream<'_, V> {
        SampleStream {
            subjects: &self.subjects,
            config: &self.config,
            subject: 0,
            plane: 0,
        }
    }

    /// Fresh stream of paired image/label batches.
    pub fn batches(&self) -> Batches<'_, V> {
        Batches {
            inner: BatchAssembler::with_batch_size(
                self.samples(),
                self.batch_size,
                self.max_samples(),
            ),
            state: PipelineState::SubjectsResolved,
        }
    }

    /// Image half of [`batches`](Self::batches).
    pub fn image_batches(&self) -> impl Iterator<Item = Result<Array4<f32>>> + '_ {
        self.batches().map(|batch| batch.map(|b| b.images))
    }

    /// Label half of [`batches`](Self::batches), computed without touching voxel data.
    ///
    /// Yields the same number of batches in the same order as the image view,
    /// except that a stream which fails on voxel data ends earlier there.
    pub fn label_batches(&self) -> LabelBatches<'_, V> {
        LabelBatches {
            inner: BatchAssembler::with_batch_size(
                LabelStream {
                    subjects: &self.subjects,
                    subject: 0,
                    plane: 0,
                },
                self.batch_size,
                self.max_samples(),
            ),
        }
    }
}

/// Per-plane samples in subject then plane order.
#[derive(Debug)]
pub struct SampleStream<'a, V> {
    subjects: &'a [Subject<V>],
    config: &'a PipelineConfig,
    subject: usize,
    plane: usize,
}

impl<'a, V: VolumeSource> SampleStream<'a, V> {
    fn sample(&self, subject: &Subject<V>, plane: usize) -> Result<Sample> {
        let (width, height) = self.config.target_size;
        let raster = extract_slice_scaled(&subject.volume, plane, self.config.voxel_scale)?;
        let raster = resize_with(&raster, width, height, self.config.interpolation)?;
        Ok(Sample {
            image: self.config.normalizer.normalize_raster(&raster),
            label: subject.label,
        })
    }
}

impl<'a, V: VolumeSource> Iterator for SampleStream<'a, V> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        let subjects = self.subjects;
        loop {
            let subject = subjects.get(self.subject)?;
            if self.plane >= subject.volume.num_planes() {
                self.subject += 1;
                self.plane = 0;
                continue;
            }
            if self.plane == 0 {
                debug!(
                    subject = subject.name(),
                    label = subject.label,
                    planes = subject.volume.num_planes(),
                    "streaming subject"
                );
            }
            let plane = self.plane;
            self.plane += 1;
            return Some(self.sample(subject, plane));
        }
    }
}

/// Paired batch stream returned by [`DatasetPipeline::batches`].
#[derive(Debug)]
pub struct Batches<'a, V> {
    inner: BatchAssembler<SampleStream<'a, V>>,
    state: PipelineState,
}

impl<'a, V> Batches<'a, V> {
    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Samples delivered in complete batches so far.
    pub fn samples_emitted(&self) -> usize {
        self.inner.samples_emitted()
    }
}

impl<'a, V: VolumeSource> Iterator for Batches<'a, V> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Some(group) => {
                self.state = PipelineState::Streaming;
                Some(group.and_then(Batch::from_samples))
            }
            None => {
                self.state = PipelineState::Exhausted;
                None
            }
        }
    }
}

struct LabelStream<'a, V> {
    subjects: &'a [Subject<V>],
    subject: usize,
    plane: usize,
}

impl<'a, V: VolumeSource> Iterator for LabelStream<'a, V> {
    type Item = Result<i64>;

    fn next(&mut self) -> Option<Self::Item> {
        let subjects = self.subjects;
        loop {
            let subject = subjects.get(self.subject)?;
            if self.plane >= subject.volume.num_planes() {
                self.subject += 1;
                self.plane = 0;
                continue;
            }
            self.plane += 1;
            return Some(Ok(subject.label));
        }
    }
}

/// Label batch stream returned by [`DatasetPipeline::label_batches`].
pub struct LabelBatches<'a, V> {
    inner: BatchAssembler<LabelStream<'a, V>>,
}

impl<'a, V: VolumeSource> Iterator for LabelBatches<'a, V> {
    type Item = Result<Array1<i64>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|group| group.map(Array1::from_vec))
    }
}
