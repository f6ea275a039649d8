//! File-level tests for the IDX reader.

use flate2::write::GzEncoder;
use flate2::Compression;
use slicebatch::idx::{IMAGES_MAGIC, LABELS_MAGIC};
use slicebatch::{Batch, Error, IdxFile, IdxPair, MnistConfig, MnistDataset, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::{tempdir, NamedTempFile};

fn idx_bytes(magic: u32, dims: &[u32], payload: &[u8]) -> Vec<u8> {
    let mut bytes = magic.to_be_bytes().to_vec();
    for d in dims {
        bytes.extend_from_slice(&d.to_be_bytes());
    }
    bytes.extend_from_slice(payload);
    bytes
}

fn write_plain(path: &Path, bytes: &[u8]) {
    fs::write(path, bytes).unwrap();
}

fn write_gz(path: &Path, bytes: &[u8]) {
    let mut encoder = GzEncoder::new(fs::File::create(path).unwrap(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap();
}

/// `n` 3x3 images where every pixel of image `i` is `i`, labelled `i % 10`.
fn split_files(n: u32) -> (Vec<u8>, Vec<u8>) {
    let pixels: Vec<u8> = (0..n).flat_map(|i| [i as u8; 9]).collect();
    let labels: Vec<u8> = (0..n).map(|i| (i % 10) as u8).collect();
    (
        idx_bytes(IMAGES_MAGIC, &[n, 3, 3], &pixels),
        idx_bytes(LABELS_MAGIC, &[n], &labels),
    )
}

#[test]
fn test_two_item_image_file() {
    let file = NamedTempFile::new().unwrap();
    write_plain(file.path(), &idx_bytes(IMAGES_MAGIC, &[2, 4, 4], &[9; 32]));

    let idx = IdxFile::open(file.path(), IMAGES_MAGIC).unwrap();
    let mut batches = idx.image_batches(1, 2, None).unwrap();
    let first = batches.next().unwrap().unwrap();
    assert_eq!(first.shape(), &[1, 1, 4, 4]);
    assert!(first.iter().all(|&v| v == 9.0));
}

#[test]
fn test_open_gzipped_matches_plain() {
    let dir = tempdir().unwrap();
    let bytes = idx_bytes(IMAGES_MAGIC, &[3, 2, 2], &(0..12).collect::<Vec<u8>>());
    write_plain(&dir.path().join("images"), &bytes);
    write_gz(&dir.path().join("images.gz"), &bytes);

    let plain = IdxFile::open(dir.path().join("images"), IMAGES_MAGIC).unwrap();
    let gz = IdxFile::open(dir.path().join("images.gz"), IMAGES_MAGIC).unwrap();
    assert_eq!(plain.header(), gz.header());
    assert_eq!(
        plain.item_bytes(0, 3).unwrap(),
        gz.item_bytes(0, 3).unwrap()
    );
}

#[test]
fn test_short_file_is_truncated() {
    let file = NamedTempFile::new().unwrap();
    write_plain(file.path(), &[0, 0, 8, 1, 0, 0, 0, 4]);
    let err = IdxFile::open(file.path(), LABELS_MAGIC).unwrap_err();
    assert!(matches!(
        err,
        Error::TruncatedFile {
            needed: 16,
            available: 8
        }
    ));
}

#[test]
fn test_wrong_magic_reports_values() {
    let file = NamedTempFile::new().unwrap();
    write_plain(file.path(), &idx_bytes(LABELS_MAGIC, &[12], &[0; 12]));
    let err = IdxFile::open(file.path(), IMAGES_MAGIC).unwrap_err();
    assert!(matches!(
        err,
        Error::IncompatibleFormat {
            expected: IMAGES_MAGIC,
            found: LABELS_MAGIC
        }
    ));
}

#[test]
fn test_corrupt_gzip() {
    let file = tempdir().unwrap();
    let path = file.path().join("labels.gz");
    write_plain(&path, b"definitely not gzip data");
    assert!(matches!(
        IdxFile::open(&path, LABELS_MAGIC),
        Err(Error::Decompression(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        IdxFile::open(dir.path().join("absent"), IMAGES_MAGIC),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_dataset_from_dir_mixed_compression() {
    let dir = tempdir().unwrap();
    let (train_images, train_labels) = split_files(12);
    let (test_images, test_labels) = split_files(5);
    write_gz(&dir.path().join("train-images-idx3-ubyte.gz"), &train_images);
    write_plain(&dir.path().join("train-labels-idx1-ubyte"), &train_labels);
    write_plain(&dir.path().join("t10k-images-idx3-ubyte"), &test_images);
    write_gz(&dir.path().join("t10k-labels-idx1-ubyte.gz"), &test_labels);

    let config = MnistConfig::with_batch_size(4).max_samples(100, 100);
    let dataset = MnistDataset::from_dir(dir.path(), config).unwrap();

    let train: Vec<Batch> = dataset.training_batches().collect::<Result<_>>().unwrap();
    assert_eq!(train.len(), 3);
    assert_eq!(train[2].labels.to_vec(), vec![8, 9, 0, 1]);
    assert_eq!(train[0].image_shape(), [4, 1, 3, 3]);
    let expected = (3.0 / 255.0 - 0.1307) / 0.3081;
    assert!((train[0].images[[3, 0, 1, 1]] - expected).abs() < 1e-5);

    let test: Vec<Batch> = dataset.test_batches(false).collect::<Result<_>>().unwrap();
    assert_eq!(test.len(), 1);
    assert_eq!(test[0].images[[2, 0, 2, 2]], 2.0);
}

#[test]
fn test_dataset_caps() {
    let dir = tempdir().unwrap();
    let (images, labels) = split_files(20);
    for prefix in ["train", "t10k"] {
        write_plain(&dir.path().join(format!("{prefix}-images-idx3-ubyte")), &images);
        write_plain(&dir.path().join(format!("{prefix}-labels-idx1-ubyte")), &labels);
    }

    let config = MnistConfig::with_batch_size(3).max_samples(10, 2);
    let dataset = MnistDataset::from_dir(dir.path(), config).unwrap();
    assert_eq!(dataset.num_training_batches(), 3);
    assert_eq!(dataset.training_batches().count(), 3);
    assert_eq!(dataset.num_test_batches(), 0);
    assert_eq!(dataset.test_batches(true).count(), 0);
}

#[test]
fn test_mismatched_counts_rejected() {
    let dir = tempdir().unwrap();
    let (images, _) = split_files(4);
    let (_, labels) = split_files(5);
    let image_path = dir.path().join("images");
    let label_path = dir.path().join("labels");
    write_plain(&image_path, &images);
    write_plain(&label_path, &labels);
    let err = IdxPair::open(&image_path, &label_path).unwrap_err();
    assert!(matches!(err, Error::InconsistentShape { .. }));
}
