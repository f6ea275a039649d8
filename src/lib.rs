//! Fixed-shape training batches from volumetric scans and IDX rasters.
//!
//! Two dataset sources feed the same batch contract, a `[batch, C, H, W]`
//! `f32` image tensor paired with a `[batch]` `i64` label tensor:
//!
//! - [`DatasetPipeline`] slices labelled 3D volumes into axial planes,
//!   replicates each plane to three channels, resizes it and normalizes it.
//! - [`MnistDataset`] reads big-endian IDX image and label files.
//!
//! Batches are produced lazily. A batch is only emitted when it is complete
//! and fits under the configured sample cap.
//!
//! ```ignore
//! use slicebatch::{DatasetPipeline, PipelineConfig, Volume};
//!
//! let volumes = vec![Volume::from_vec("sub01_no-lesion", [64, 64, 24, 1], data)?];
//! let pipeline = DatasetPipeline::training(volumes, PipelineConfig::with_batch_size(4))?;
//! for batch in pipeline.batches() {
//!     let batch = batch?;
//!     assert_eq!(batch.image_shape(), [4, 3, 224, 224]);
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod idx;
pub mod label;
pub mod normalize;
pub mod pipeline;
pub mod resample;
pub mod slice;
pub mod volume;

pub use batch::{assemble, num_batches, Batch, BatchAssembler, ElementKind, Sample};
pub use config::{MnistConfig, PipelineConfig};
pub use error::{Error, Result};
pub use idx::{IdxFile, IdxHeader, IdxPair, MnistDataset};
pub use label::{resolve_label, LabelVocabulary};
pub use normalize::{ChannelStats, IntensityNormalizer};
pub use pipeline::{DatasetPipeline, PipelineState, Split};
pub use resample::{resize, resize_with, Interpolation};
pub use slice::{extract_slice, stack_to_rgb, Raster};
pub use volume::{Volume, VolumeSource};
