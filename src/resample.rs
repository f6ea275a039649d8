//! Deterministic 2D raster resizing.
//!
//! Output pixel centres are mapped back to source coordinates with
//! half-pixel alignment. Bilinear sampling clamps at the borders, so a
//! constant image stays constant at any size.

use crate::error::{Error, Result};
use crate::slice::{Raster, CHANNELS};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Rows per parallel work item.
const ROWS_PER_TASK: usize = 16;

/// Interpolation method used by [`resize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Nearest-neighbour sampling.
    Nearest,
    /// Bilinear sampling.
    #[default]
    Bilinear,
}

/// Resize `raster` to `target_width x target_height` using bilinear sampling.
pub fn resize(raster: &Raster, target_width: usize, target_height: usize) -> Result<Raster> {
    resize_with(raster, target_width, target_height, Interpolation::Bilinear)
}

/// Resize `raster` with an explicit interpolation method.
///
/// Fails with [`Error::InvalidDimensions`] when the source or target has a
/// zero width or height.
#[must_use = "this function returns a new raster and does not modify the original"]
pub fn resize_with(
    raster: &Raster,
    target_width: usize,
    target_height: usize,
    method: Interpolation,
) -> Result<Raster> {
    let (src_w, src_h, _) = raster.dims();
    if src_w == 0 || src_h == 0 {
        return Err(Error::InvalidDimensions(format!(
            "cannot resize a {src_w}x{src_h} raster"
        )));
    }
    if target_width == 0 || target_height == 0 {
        return Err(Error::InvalidDimensions(format!(
            "target size {target_width}x{target_height} must be positive"
        )));
    }

    if src_w == target_width && src_h == target_height {
        return Ok(raster.clone());
    }

    let scale_x = src_w as f32 / target_width as f32;
    let scale_y = src_h as f32 / target_height as f32;
    let row_len = target_width * CHANNELS;
    let mut output = vec![0.0f32; row_len * target_height];

    output
        .par_chunks_mut(row_len * ROWS_PER_TASK)
        .enumerate()
        .for_each(|(task, rows)| {
            for (r, row) in rows.chunks_mut(row_len).enumerate() {
                let ty = task * ROWS_PER_TASK + r;
                match method {
                    Interpolation::Nearest => {
                        nearest_row(raster, row, ty, scale_x, scale_y, target_width)
                    }
                    Interpolation::Bilinear => {
                        bilinear_row(raster, row, ty, scale_x, scale_y, target_width)
                    }
                }
            }
        });

    Raster::from_interleaved(target_width, target_height, output)
}

#[inline]
fn source_coord(t: usize, scale: f32) -> f32 {
    (t as f32 + 0.5) * scale - 0.5
}

fn nearest_row(src: &Raster, row: &mut [f32], ty: usize, sx: f32, sy: f32, width: usize) {
    let max_x = src.width() - 1;
    let max_y = src.height() - 1;
    let y = (((ty as f32 + 0.5) * sy).floor() as usize).min(max_y);
    for tx in 0..width {
        let x = (((tx as f32 + 0.5) * sx).floor() as usize).min(max_x);
        for c in 0..CHANNELS {
            row[tx * CHANNELS + c] = src.get(x, y, c);
        }
    }
}

fn bilinear_row(src: &Raster, row: &mut [f32], ty: usize, sx: f32, sy: f32, width: usize) {
    let max_x = src.width() - 1;
    let max_y = src.height() - 1;

    let fy = source_coord(ty, sy).clamp(0.0, max_y as f32);
    let y0 = fy.floor() as usize;
    let y1 = (y0 + 1).min(max_y);
    let wy = fy - y0 as f32;

    for tx in 0..width {
        let fx = source_coord(tx, sx).clamp(0.0, max_x as f32);
        let x0 = fx.floor() as usize;
        let x1 = (x0 + 1).min(max_x);
        let wx = fx - x0 as f32;

        for c in 0..CHANNELS {
            let top = src.get(x0, y0, c) * (1.0 - wx) + src.get(x1, y0, c) * wx;
            let bottom = src.get(x0, y1, c) * (1.0 - wx) + src.get(x1, y1, c) * wx;
            row[tx * CHANNELS + c] = top * (1.0 - wy) + bottom * wy;
        }
    }
}
