//! Fixed-shape batch assembly.
//!
//! [`BatchAssembler`] groups a lazy sample sequence into runs of
//! `batch_size`, never emitting a run that would take the total beyond
//! `max_samples` and never emitting an incomplete tail. [`Batch`] stacks a
//! run into `[batch, C, H, W]` images and `[batch]` labels.

use crate::error::{Error, Result};
use ndarray::{stack, Array1, Array3, Array4, ArrayView3, Axis};
use std::num::NonZeroUsize;
use tracing::debug;

/// Element type of a tensor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// 32-bit float (images).
    Float32,
    /// 64-bit signed integer (labels).
    Int64,
}

/// Scalar types that can back a batch tensor.
pub trait TensorElement: Copy + Send + Sync + 'static {
    /// Kind advertised to the tensor runtime.
    const KIND: ElementKind;
}

impl TensorElement for f32 {
    const KIND: ElementKind = ElementKind::Float32;
}

impl TensorElement for i64 {
    const KIND: ElementKind = ElementKind::Int64;
}

/// One normalized `[C, H, W]` image tagged with its class.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Planar image tensor.
    pub image: Array3<f32>,
    /// Class code inherited from the subject.
    pub label: i64,
}

/// Paired image and label tensors with equal leading dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// `[batch, C, H, W]` images.
    pub images: Array4<f32>,
    /// `[batch]` labels.
    pub labels: Array1<i64>,
}

impl Batch {
    /// Pair image and label tensors, checking their leading dimensions agree.
    pub fn from_parts(images: Array4<f32>, labels: Array1<i64>) -> Result<Self> {
        if images.shape()[0] != labels.len() {
            return Err(Error::InconsistentShape {
                expected: vec![images.shape()[0]],
                found: vec![labels.len()],
            });
        }
        Ok(Self { images, labels })
    }

    /// Stack samples into one batch.
    pub fn from_samples(samples: Vec<Sample>) -> Result<Self> {
        let labels: Array1<i64> = samples.iter().map(|s| s.label).collect();
        let images = stack_images(samples.iter().map(|s| s.image.view()))?;
        Self::from_parts(images, labels)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True if the batch holds no samples.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Shape of the image tensor.
    pub fn image_shape(&self) -> [usize; 4] {
        let s = self.images.shape();
        [s[0], s[1], s[2], s[3]]
    }

    /// Element kind of the image tensor.
    pub fn image_kind(&self) -> ElementKind {
        f32::KIND
    }

    /// Element kind of the label tensor.
    pub fn label_kind(&self) -> ElementKind {
        i64::KIND
    }
}

/// Stack `[C, H, W]` images along a new leading axis.
///
/// Every image must match the first one's shape, otherwise
/// [`Error::InconsistentShape`] is returned. Images are never padded or cropped.
pub fn stack_images<'a>(images: impl IntoIterator<Item = ArrayView3<'a, f32>>) -> Result<Array4<f32>> {
    let views: Vec<ArrayView3<'a, f32>> = images.into_iter().collect();
    let Some(first) = views.first() else {
        return Err(Error::InvalidDimensions(
            "cannot stack an empty batch".to_string(),
        ));
    };

    let expected = first.shape().to_vec();
    if let Some(bad) = views.iter().find(|v| v.shape() != expected.as_slice()) {
        return Err(Error::InconsistentShape {
            expected,
            found: bad.shape().to_vec(),
        });
    }

    stack(Axis(0), &views).map_err(|e| Error::InvalidDimensions(format!("stack failed: {e}")))
}

/// Upper bound on the number of batches for a sample cap.
pub const fn num_batches(max_samples: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        0
    } else {
        max_samples / batch_size
    }
}

/// Groups a fallible sample stream into fixed-size runs under a sample cap.
///
/// Samples beyond the cap are never pulled from the source. The first error
/// from the source is yielded and ends the sequence.
#[derive(Debug)]
pub struct BatchAssembler<I> {
    samples: I,
    batch_size: usize,
    max_samples: usize,
    emitted: usize,
    finished: bool,
}

impl<I> BatchAssembler<I> {
    /// Create an assembler. `batch_size` must be positive.
    pub fn new(samples: I, batch_size: usize, max_samples: usize) -> Result<Self> {
        let batch_size = NonZeroUsize::new(batch_size)
            .ok_or_else(|| Error::InvalidConfig("batch_size must be > 0".to_string()))?;
        Ok(Self::with_batch_size(samples, batch_size, max_samples))
    }

    /// Create an assembler from an already validated batch size.
    pub fn with_batch_size(samples: I, batch_size: NonZeroUsize, max_samples: usize) -> Self {
        Self {
            samples,
            batch_size: batch_size.get(),
            max_samples,
            emitted: 0,
            finished: false,
        }
    }

    /// Samples emitted in complete batches so far.
    pub fn samples_emitted(&self) -> usize {
        self.emitted
    }

    /// True once no further batch will be produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<I, T> Iterator for BatchAssembler<I>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if self.emitted.saturating_add(self.batch_size) > self.max_samples {
            debug!(
                emitted = self.emitted,
                max_samples = self.max_samples,
                "sample cap reached"
            );
            self.finished = true;
            return None;
        }

        let mut group = Vec::with_capacity(self.batch_size);
        while group.len() < self.batch_size {
            match self.samples.next() {
                Some(Ok(sample)) => group.push(sample),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    if !group.is_empty() {
                        debug!(dropped = group.len(), "dropping incomplete tail");
                    }
                    self.finished = true;
                    return None;
                }
            }
        }

        self.emitted += self.batch_size;
        Some(Ok(group))
    }
}

/// Assemble samples into stacked batches.
pub fn assemble<I>(
    samples: I,
    batch_size: usize,
    max_samples: usize,
) -> Result<impl Iterator<Item = Result<Batch>>>
where
    I: IntoIterator<Item = Result<Sample>>,
{
    let grouped = BatchAssembler::new(samples.into_iter(), batch_size, max_samples)?;
    Ok(grouped.map(|group| group.and_then(Batch::from_samples)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f32, label: i64) -> Result<Sample> {
        Ok(Sample {
            image: Array3::from_elem((3, 2, 2), value),
            label,
        })
    }

    #[test]
    fn test_cap_drops_straddling_batch() {
        let samples = (0..6).map(|i| sample(i as f32, i));
        let batches: Vec<Batch> = assemble(samples, 2, 5)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].labels.to_vec(), vec![0, 1]);
        assert_eq!(batches[1].labels.to_vec(), vec![2, 3]);
        assert_eq!(batches[1].images[[0, 0, 0, 0]], 2.0);
        assert_eq!(batches[1].image_shape(), [2, 3, 2, 2]);
    }

    #[test]
    fn test_incomplete_tail_dropped() {
        let samples = (0..5).map(|i| sample(0.0, i));
        let count = assemble(samples, 2, 100).unwrap().count();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_cap_stops_pulling() {
        let mut pulled = 0;
        let samples = (0..100).map(|i| {
            pulled += 1;
            sample(0.0, i)
        });
        let grouped = BatchAssembler::new(samples, 3, 7).unwrap();
        assert_eq!(grouped.count(), 2);
        assert_eq!(pulled, 6);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let samples = std::iter::empty::<Result<Sample>>();
        assert!(matches!(
            BatchAssembler::new(samples, 0, 10),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_inconsistent_shape() {
        let samples = vec![
            sample(0.0, 0),
            Ok(Sample {
                image: Array3::zeros((3, 4, 2)),
                label: 0,
            }),
        ];
        let mut batches = assemble(samples, 2, 10).unwrap();
        match batches.next() {
            Some(Err(Error::InconsistentShape { expected, found })) => {
                assert_eq!(expected, vec![3, 2, 2]);
                assert_eq!(found, vec![3, 4, 2]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_source_error_ends_stream() {
        let samples = vec![
            sample(0.0, 0),
            Err(Error::InvalidDimensions("bad plane".into())),
            sample(0.0, 0),
            sample(0.0, 0),
        ];
        let mut grouped = BatchAssembler::new(samples.into_iter(), 1, 10).unwrap();
        assert!(grouped.next().unwrap().is_ok());
        assert!(grouped.next().unwrap().is_err());
        assert!(grouped.next().is_none());
        assert!(grouped.is_finished());
    }

    #[test]
    fn test_num_batches() {
        assert_eq!(num_batches(10, 3), 3);
        assert_eq!(num_batches(10, 0), 0);
        assert_eq!(num_batches(60000, 1), 60000);
    }

    #[test]
    fn test_element_kinds() {
        let batch = Batch::from_samples(vec![sample(1.0, 1).unwrap()]).unwrap();
        assert_eq!(batch.image_kind(), ElementKind::Float32);
        assert_eq!(batch.label_kind(), ElementKind::Int64);
        assert_eq!(batch.len(), 1);
    }
}
