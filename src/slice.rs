//! Plane extraction and RGB replication.

use crate::error::{Error, Result};
use crate::volume::VolumeSource;

/// Channels in every raster produced by this crate.
pub const CHANNELS: usize = 3;

/// Interleaved RGB raster of `f32` intensities.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Raster {
    /// Wrap an interleaved `width * height * 3` buffer.
    pub fn from_interleaved(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        let expected = width * height * CHANNELS;
        if data.len() != expected {
            return Err(Error::InvalidDimensions(format!(
                "raster {width}x{height} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Declared `(width, height, channels)`.
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.width, self.height, CHANNELS)
    }

    /// Interleaved channel values.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Value of channel `c` at pixel `(x, y)`.
    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> f32 {
        self.data[(y * self.width + x) * CHANNELS + c]
    }

    /// Consume the raster and return its buffer.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Replicate a single-channel buffer into interleaved RGB, scaling each value.
pub fn stack_to_rgb(plane: &[f32], scale: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(plane.len() * CHANNELS);
    for &v in plane {
        let v = v * scale;
        out.extend_from_slice(&[v; CHANNELS]);
    }
    out
}

/// Extract Z-plane `plane_index` of `volume` as an RGB raster.
///
/// Fails with [`Error::OutOfRange`] when `plane_index >= Z`.
pub fn extract_slice<V: VolumeSource + ?Sized>(volume: &V, plane_index: usize) -> Result<Raster> {
    extract_slice_scaled(volume, plane_index, 1.0)
}

/// Like [`extract_slice`], multiplying every intensity by `scale`.
pub fn extract_slice_scaled<V: VolumeSource + ?Sized>(
    volume: &V,
    plane_index: usize,
    scale: f32,
) -> Result<Raster> {
    let [x, y, z, _] = volume.dims();
    if plane_index >= z {
        return Err(Error::OutOfRange {
            what: "plane",
            index: plane_index,
            len: z,
        });
    }

    let plane = volume.raw_plane(plane_index)?;
    if plane.len() != x * y {
        return Err(Error::InvalidDimensions(format!(
            "plane {plane_index} of '{}' has {} values, expected {x}x{y}",
            volume.name(),
            plane.len()
        )));
    }

    Raster::from_interleaved(x, y, stack_to_rgb(&plane, scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;

    fn ramp_volume(x: usize, y: usize, z: usize) -> Volume {
        let data: Vec<f32> = (0..x * y * z).map(|i| i as f32).collect();
        Volume::from_vec("sub01_no-lesion", [x, y, z, 1], data).unwrap()
    }

    #[test]
    fn test_extract_slice_length() {
        let vol = ramp_volume(4, 3, 5);
        for z in 0..5 {
            let raster = extract_slice(&vol, z).unwrap();
            assert_eq!(raster.as_slice().len(), 4 * 3 * 3);
            assert_eq!(raster.dims(), (4, 3, 3));
        }
    }

    #[test]
    fn test_extract_slice_out_of_range() {
        let vol = ramp_volume(2, 2, 3);
        assert!(matches!(
            extract_slice(&vol, 3),
            Err(Error::OutOfRange { index: 3, len: 3, .. })
        ));
        assert!(extract_slice(&vol, usize::MAX).is_err());
    }

    #[test]
    fn test_channels_are_interleaved_copies() {
        let vol = ramp_volume(2, 2, 2);
        let raster = extract_slice(&vol, 1).unwrap();
        assert_eq!(
            raster.as_slice(),
            &[4.0, 4.0, 4.0, 5.0, 5.0, 5.0, 6.0, 6.0, 6.0, 7.0, 7.0, 7.0]
        );
        assert_eq!(raster.get(1, 1, 2), 7.0);
    }

    #[test]
    fn test_scaled_extraction() {
        let vol = Volume::from_vec("v", [1, 1, 1, 1], vec![0.5]).unwrap();
        let raster = extract_slice_scaled(&vol, 0, 255.0).unwrap();
        assert_eq!(raster.as_slice(), &[127.5, 127.5, 127.5]);
    }
}
