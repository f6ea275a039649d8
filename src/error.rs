//! Error types for slicebatch.
//!
//! Every failure is fatal to the operation that raised it. Nothing is retried
//! and no partially valid batch is ever produced.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building datasets or producing batches.
#[derive(Debug, Error)]
pub enum Error {
    /// Construction parameters are invalid (zero batch size, zero std, bad vocabulary).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A subject name contains none of the vocabulary tokens.
    #[error("subject '{name}' matches no label token (expected one of {tokens:?})")]
    UnlabeledSubject {
        /// Offending subject name.
        name: String,
        /// Tokens that were searched for.
        tokens: Vec<String>,
    },

    /// A subject name contains more than one vocabulary token.
    #[error("subject '{name}' matches several label tokens {matched:?}")]
    AmbiguousLabel {
        /// Offending subject name.
        name: String,
        /// Every token found in the name.
        matched: Vec<String>,
    },

    /// An index fell outside its valid range.
    #[error("index {index} out of range for {what} (valid range 0..{len})")]
    OutOfRange {
        /// What was being indexed.
        what: &'static str,
        /// Requested index.
        index: usize,
        /// Exclusive upper bound.
        len: usize,
    },

    /// Zero or otherwise unusable spatial dimensions.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Flat-binary magic number did not match the expected value.
    #[error("incompatible format: magic number {found} (0x{found:08x}), expected {expected}")]
    IncompatibleFormat {
        /// Magic number the caller expected.
        expected: u32,
        /// Magic number read from the buffer.
        found: u32,
    },

    /// Buffer ended before the declared header or payload.
    #[error("truncated file: needed {needed} bytes, {available} available")]
    TruncatedFile {
        /// Bytes required to continue.
        needed: usize,
        /// Bytes present in the buffer.
        available: usize,
    },

    /// Samples in one batch disagree on their non-batch dimensions.
    #[error("inconsistent sample shape: expected {expected:?}, got {found:?}")]
    InconsistentShape {
        /// Shape of the first sample in the batch.
        expected: Vec<usize>,
        /// Shape of the mismatching sample.
        found: Vec<usize>,
    },

    /// Failed to parse a serialized configuration.
    #[error("configuration parse error: {0}")]
    Configuration(String),

    /// Gzip stream could not be decoded.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that reject a dataset at construction time.
    pub fn is_labeling_error(&self) -> bool {
        matches!(self, Self::UnlabeledSubject { .. } | Self::AmbiguousLabel { .. })
    }
}
