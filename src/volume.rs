//! Volume capability and an in-memory implementation.
//!
//! Decoding volume files is left to the caller. The pipeline only needs a
//! name, the `[X, Y, Z, T]` dimensions and access to one Z-plane at a time.

use crate::error::{Error, Result};
use ndarray::{Array3, Array4};
use std::borrow::Cow;

/// Minimal capability the pipeline requires from a decoded volume.
pub trait VolumeSource {
    /// Identifier used for label inference.
    fn name(&self) -> &str;

    /// Dimensions `[X, Y, Z, T]`.
    fn dims(&self) -> [usize; 4];

    /// Intensities of Z-plane `index` of the first frame, X fastest, length `X*Y`.
    fn raw_plane(&self, index: usize) -> Result<Cow<'_, [f32]>>;

    /// Number of Z-planes available to [`raw_plane`](Self::raw_plane).
    fn num_planes(&self) -> usize {
        self.dims()[2]
    }
}

impl<V: VolumeSource + ?Sized> VolumeSource for &V {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn dims(&self) -> [usize; 4] {
        (**self).dims()
    }

    fn raw_plane(&self, index: usize) -> Result<Cow<'_, [f32]>> {
        (**self).raw_plane(index)
    }
}

impl<V: VolumeSource + ?Sized> VolumeSource for Box<V> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn dims(&self) -> [usize; 4] {
        (**self).dims()
    }

    fn raw_plane(&self, index: usize) -> Result<Cow<'_, [f32]>> {
        (**self).raw_plane(index)
    }
}

/// Decoded volume held in memory in Fortran (X-fastest) order.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    name: String,
    dims: [usize; 4],
    data: Vec<f32>,
}

impl Volume {
    /// Wrap a flat X-fastest buffer.
    ///
    /// Fails with [`Error::InvalidDimensions`] for an empty name, a zero
    /// dimension, or a buffer whose length disagrees with `dims`.
    pub fn from_vec(name: impl Into<String>, dims: [usize; 4], data: Vec<f32>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidDimensions(
                "volume name must not be empty".to_string(),
            ));
        }

        for (i, &d) in dims.iter().enumerate() {
            if d == 0 {
                return Err(Error::InvalidDimensions(format!(
                    "volume '{name}' dimension {i} is zero"
                )));
            }
        }

        let expected = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| Error::InvalidDimensions("dimension product overflow".into()))?;
        if data.len() != expected {
            return Err(Error::InvalidDimensions(format!(
                "volume '{name}' has {} values, dims {dims:?} require {expected}",
                data.len()
            )));
        }

        Ok(Self { name, dims, data })
    }

    /// Build from a `(X, Y, Z, T)` array in any memory layout.
    pub fn from_array(name: impl Into<String>, array: Array4<f32>) -> Result<Self> {
        let (x, y, z, t) = array.dim();
        // Reversed-axis logical order of the array is its Fortran order.
        let data: Vec<f32> = array.t().iter().copied().collect();
        Self::from_vec(name, [x, y, z, t], data)
    }

    /// Build a single-frame volume from a `(X, Y, Z)` array.
    pub fn from_array3(name: impl Into<String>, array: Array3<f32>) -> Result<Self> {
        let (x, y, z) = array.dim();
        let data: Vec<f32> = array.t().iter().copied().collect();
        Self::from_vec(name, [x, y, z, 1], data)
    }

    /// Flat X-fastest voxel buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

impl VolumeSource for Volume {
    fn name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> [usize; 4] {
        self.dims
    }

    fn raw_plane(&self, index: usize) -> Result<Cow<'_, [f32]>> {
        let [x, y, z, _] = self.dims;
        if index >= z {
            return Err(Error::OutOfRange {
                what: "plane",
                index,
                len: z,
            });
        }
        let plane = x * y;
        Ok(Cow::Borrowed(&self.data[index * plane..(index + 1) * plane]))
    }
}
