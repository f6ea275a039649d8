//! Flat-binary IDX datasets (the MNIST file format).
//!
//! Layout: a big-endian `u32` magic number whose low byte is the dimension
//! count, that many big-endian `u32` dimension sizes, then one byte per
//! pixel or label. The first dimension counts items; the rest describe one
//! item.
//!
//! Plain files are memory-mapped, `.gz` files are decompressed in full.

use crate::batch::{num_batches, Batch, BatchAssembler};
use crate::config::MnistConfig;
use crate::error::{Error, Result};
use crate::normalize::IntensityNormalizer;
use byteorder::{BigEndian, ByteOrder};
use flate2::bufread::MultiGzDecoder;
use memmap2::Mmap;
use ndarray::{Array1, Array4};
use std::fs::File;
use std::io::{BufReader, Read};
use std::num::NonZeroUsize;
use std::ops::{Deref, Range};
use std::path::{Path, PathBuf};
use tracing::info;

/// Magic number of IDX image files (`u8`, 3 dimensions).
pub const IMAGES_MAGIC: u32 = 2051;
/// Magic number of IDX label files (`u8`, 1 dimension).
pub const LABELS_MAGIC: u32 = 2049;

/// Minimum byte count accepted as an IDX buffer.
pub const MIN_FILE_LEN: usize = 16;

const GZIP_BUFFER_SIZE: usize = 256 * 1024;

/// Parsed IDX header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxHeader {
    /// Magic number as read.
    pub magic: u32,
    /// Declared dimensions, item count first.
    pub dims: Vec<usize>,
}

impl IdxHeader {
    /// Parse the header at the start of `bytes`.
    ///
    /// Fails with [`Error::TruncatedFile`] below [`MIN_FILE_LEN`] bytes or when
    /// the declared dimension table runs past the buffer, and with
    /// [`Error::IncompatibleFormat`] when the magic number differs from
    /// `expected_magic`.
    pub fn parse(bytes: &[u8], expected_magic: u32) -> Result<Self> {
        if bytes.len() < MIN_FILE_LEN {
            return Err(Error::TruncatedFile {
                needed: MIN_FILE_LEN,
                available: bytes.len(),
            });
        }

        let magic = BigEndian::read_u32(&bytes[0..4]);
        if magic != expected_magic {
            return Err(Error::IncompatibleFormat {
                expected: expected_magic,
                found: magic,
            });
        }

        let ndim = usize::from(bytes[3]);
        if ndim == 0 {
            return Err(Error::InvalidDimensions(
                "IDX header declares zero dimensions".to_string(),
            ));
        }

        let header_len = 4 + 4 * ndim;
        if bytes.len() < header_len {
            return Err(Error::TruncatedFile {
                needed: header_len,
                available: bytes.len(),
            });
        }

        let dims = bytes[4..header_len]
            .chunks_exact(4)
            .map(|chunk| BigEndian::read_u32(chunk) as usize)
            .collect();

        let header = Self { magic, dims };
        header.item_size()?;
        Ok(header)
    }

    /// Bytes occupied by the header.
    pub fn header_len(&self) -> usize {
        4 + 4 * self.dims.len()
    }

    /// Number of items declared by the first dimension.
    pub fn num_items(&self) -> usize {
        self.dims[0]
    }

    /// Dimensions of one item.
    pub fn item_dims(&self) -> &[usize] {
        &self.dims[1..]
    }

    /// Bytes per item.
    ///
    /// Fails with [`Error::InvalidDimensions`] when the product of the item
    /// dimensions overflows `usize`.
    pub fn item_size(&self) -> Result<usize> {
        self.item_dims()
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| {
                Error::InvalidDimensions(format!(
                    "IDX item dims {:?} overflow the addressable size",
                    self.item_dims()
                ))
            })
    }
}

/// Backing storage of an IDX file.
#[derive(Debug)]
enum IdxBytes {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Deref for IdxBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Owned(v) => v.as_slice(),
            Self::Mapped(m) => &m[..],
        }
    }
}

/// An IDX buffer with a validated header.
#[derive(Debug)]
pub struct IdxFile {
    header: IdxHeader,
    bytes: IdxBytes,
}

impl IdxFile {
    /// Parse an in-memory buffer.
    pub fn from_bytes(bytes: Vec<u8>, expected_magic: u32) -> Result<Self> {
        let header = IdxHeader::parse(&bytes, expected_magic)?;
        Ok(Self {
            header,
            bytes: IdxBytes::Owned(bytes),
        })
    }

    /// Open a file, decompressing it when the name ends in `.gz`.
    pub fn open<P: AsRef<Path>>(path: P, expected_magic: u32) -> Result<Self> {
        let path = path.as_ref();
        let bytes = if is_gzipped(path) {
            IdxBytes::Owned(read_gzipped(path)?)
        } else {
            IdxBytes::Mapped(map_file(path)?)
        };

        let header = IdxHeader::parse(&bytes, expected_magic)?;
        info!(
            path = %path.display(),
            magic = header.magic,
            dims = ?header.dims,
            "loaded IDX file"
        );
        Ok(Self { header, bytes })
    }

    /// Parsed header.
    pub fn header(&self) -> &IdxHeader {
        &self.header
    }

    /// Number of declared items.
    pub fn num_items(&self) -> usize {
        self.header.num_items()
    }

    /// Raw bytes of `count` items starting at item `start`.
    pub fn item_bytes(&self, start: usize, count: usize) -> Result<&[u8]> {
        let size = self.header.item_size()?;
        let available = self.bytes.len();
        let range = start
            .checked_mul(size)
            .and_then(|offset| offset.checked_add(self.header.header_len()))
            .and_then(|begin| {
                let end = count.checked_mul(size)?.checked_add(begin)?;
                Some(begin..end)
            });
        match range {
            Some(range) if range.end <= available => Ok(&self.bytes[range]),
            Some(range) => Err(Error::TruncatedFile {
                needed: range.end,
                available,
            }),
            None => Err(Error::TruncatedFile {
                needed: usize::MAX,
                available,
            }),
        }
    }

    fn image_dims(&self) -> Result<(usize, usize)> {
        match *self.header.item_dims() {
            [rows, cols] => Ok((rows, cols)),
            ref other => Err(Error::InvalidDimensions(format!(
                "IDX image items must be 2D, got dims {other:?}"
            ))),
        }
    }

    /// `count` images from `start` as a `[count, 1, rows, cols]` tensor.
    ///
    /// Raw byte values are kept when `normalizer` is `None`.
    pub fn images(
        &self,
        start: usize,
        count: usize,
        normalizer: Option<&IntensityNormalizer>,
    ) -> Result<Array4<f32>> {
        let (rows, cols) = self.image_dims()?;
        let bytes = self.item_bytes(start, count)?;
        let data = match normalizer {
            Some(norm) => norm.normalize_bytes(bytes),
            None => bytes.iter().map(|&b| f32::from(b)).collect(),
        };
        Array4::from_shape_vec((count, 1, rows, cols), data)
            .map_err(|e| Error::InvalidDimensions(format!("image batch shape: {e}")))
    }

    /// `count` labels from `start` as a `[count]` tensor.
    pub fn labels(&self, start: usize, count: usize) -> Result<Array1<i64>> {
        if self.header.item_size()? != 1 {
            return Err(Error::InvalidDimensions(format!(
                "IDX label items must be scalars, got dims {:?}",
                self.header.item_dims()
            )));
        }
        let bytes = self.item_bytes(start, count)?;
        Ok(bytes.iter().map(|&b| i64::from(b)).collect())
    }

    /// Lazy image batches under the usual batch-size and sample-cap policy.
    pub fn image_batches<'a>(
        &'a self,
        batch_size: usize,
        max_samples: usize,
        normalizer: Option<&'a IntensityNormalizer>,
    ) -> Result<impl Iterator<Item = Result<Array4<f32>>> + 'a> {
        let batch_size = positive_batch_size(batch_size)?;
        self.image_dims()?;
        Ok(index_groups(self.num_items(), batch_size, max_samples)
            .map(move |group| group.and_then(|g| self.images(g.start, g.len(), normalizer))))
    }

    /// Lazy label batches under the usual batch-size and sample-cap policy.
    pub fn label_batches(
        &self,
        batch_size: usize,
        max_samples: usize,
    ) -> Result<impl Iterator<Item = Result<Array1<i64>>> + '_> {
        let batch_size = positive_batch_size(batch_size)?;
        Ok(index_groups(self.num_items(), batch_size, max_samples)
            .map(move |group| group.and_then(|g| self.labels(g.start, g.len()))))
    }
}

fn positive_batch_size(batch_size: usize) -> Result<NonZeroUsize> {
    NonZeroUsize::new(batch_size)
        .ok_or_else(|| Error::InvalidConfig("batch_size must be > 0".to_string()))
}

/// Item index ranges grouped by [`BatchAssembler`].
struct IndexGroups {
    inner: BatchAssembler<std::iter::Map<Range<usize>, fn(usize) -> Result<usize>>>,
}

impl Iterator for IndexGroups {
    type Item = Result<Range<usize>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|group| {
            group.map(|indices| match (indices.first(), indices.last()) {
                (Some(&first), Some(&last)) => first..last + 1,
                _ => 0..0,
            })
        })
    }
}

fn index_groups(num_items: usize, batch_size: NonZeroUsize, max_samples: usize) -> IndexGroups {
    let ok: fn(usize) -> Result<usize> = Ok;
    IndexGroups {
        inner: BatchAssembler::with_batch_size((0..num_items).map(ok), batch_size, max_samples),
    }
}

fn is_gzipped(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

fn read_gzipped(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut decoder = MultiGzDecoder::new(BufReader::with_capacity(GZIP_BUFFER_SIZE, file));
    let mut output = Vec::new();
    decoder.read_to_end(&mut output).map_err(|e| {
        Error::Decompression(format!("{}: gzip stream decode failed: {e}", path.display()))
    })?;
    Ok(output)
}

#[allow(unsafe_code)]
fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // SAFETY: the map is read-only. External modification of the file can
    // change the bytes seen but cannot cause undefined behaviour here, since
    // every access is bounds-checked against the mapped length.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

/// Image file paired with its label file.
#[derive(Debug)]
pub struct IdxPair {
    images: IdxFile,
    labels: IdxFile,
}

impl IdxPair {
    /// Pair images with labels, checking their item counts agree.
    pub fn new(images: IdxFile, labels: IdxFile) -> Result<Self> {
        images.image_dims()?;
        if labels.header.item_size()? != 1 {
            return Err(Error::InvalidDimensions(format!(
                "IDX label items must be scalars, got dims {:?}",
                labels.header.item_dims()
            )));
        }
        if images.num_items() != labels.num_items() {
            return Err(Error::InconsistentShape {
                expected: vec![images.num_items()],
                found: vec![labels.num_items()],
            });
        }
        Ok(Self { images, labels })
    }

    /// Open an image file (magic 2051) and label file (magic 2049).
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(images: P, labels: Q) -> Result<Self> {
        Self::new(
            IdxFile::open(images, IMAGES_MAGIC)?,
            IdxFile::open(labels, LABELS_MAGIC)?,
        )
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.images.num_items()
    }

    /// True when the pair holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image file.
    pub fn images(&self) -> &IdxFile {
        &self.images
    }

    /// Label file.
    pub fn labels(&self) -> &IdxFile {
        &self.labels
    }
}

/// MNIST-style dataset with train and test splits.
#[derive(Debug)]
pub struct MnistDataset {
    train: IdxPair,
    test: IdxPair,
    config: MnistConfig,
    batch_size: NonZeroUsize,
}

impl MnistDataset {
    /// Build from already opened splits.
    pub fn new(train: IdxPair, test: IdxPair, config: MnistConfig) -> Result<Self> {
        config.validate()?;
        let batch_size = positive_batch_size(config.batch_size)?;
        Ok(Self {
            train,
            test,
            config,
            batch_size,
        })
    }

    /// Open the four canonical MNIST files in `dir`, plain or `.gz`.
    pub fn from_dir<P: AsRef<Path>>(dir: P, config: MnistConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let train = IdxPair::open(
            resolve(dir, "train-images-idx3-ubyte"),
            resolve(dir, "train-labels-idx1-ubyte"),
        )?;
        let test = IdxPair::open(
            resolve(dir, "t10k-images-idx3-ubyte"),
            resolve(dir, "t10k-labels-idx1-ubyte"),
        )?;
        Self::new(train, test, config)
    }

    /// Configuration in use.
    pub fn config(&self) -> &MnistConfig {
        &self.config
    }

    /// Upper bound on training batches.
    pub fn num_training_batches(&self) -> usize {
        num_batches(self.config.max_train_samples, self.batch_size.get())
    }

    /// Upper bound on test batches.
    pub fn num_test_batches(&self) -> usize {
        num_batches(self.config.max_test_samples, self.batch_size.get())
    }

    /// Normalized training batches.
    pub fn training_batches(&self) -> MnistBatches<'_> {
        self.split_batches(&self.train, self.config.max_train_samples, true)
    }

    /// Test batches, optionally left as raw byte values.
    pub fn test_batches(&self, normalize: bool) -> MnistBatches<'_> {
        self.split_batches(&self.test, self.config.max_test_samples, normalize)
    }

    fn split_batches<'a>(
        &'a self,
        pair: &'a IdxPair,
        max_samples: usize,
        normalize: bool,
    ) -> MnistBatches<'a> {
        MnistBatches {
            pair,
            groups: index_groups(pair.len(), self.batch_size, max_samples),
            normalizer: normalize.then_some(&self.config.normalizer),
        }
    }
}

fn resolve(dir: &Path, name: &str) -> PathBuf {
    let plain = dir.join(name);
    if plain.exists() {
        return plain;
    }
    let gz = dir.join(format!("{name}.gz"));
    if gz.exists() {
        gz
    } else {
        plain
    }
}

/// Paired image/label batches over one IDX split.
pub struct MnistBatches<'a> {
    pair: &'a IdxPair,
    groups: IndexGroups,
    normalizer: Option<&'a IntensityNormalizer>,
}

impl Iterator for MnistBatches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let group = self.groups.next()?;
        Some(group.and_then(|range| {
            let images = self
                .pair
                .images
                .images(range.start, range.len(), self.normalizer)?;
            let labels = self.pair.labels.labels(range.start, range.len())?;
            Batch::from_parts(images, labels)
        }))
    }
}
