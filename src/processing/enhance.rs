//! Directional band-pass enhancement of ridges.

use crate::fingerprint::{FrequencyField, OrientationField};
use crate::image::filter::gabor_kernel;
use crate::image::{Grid, Image, Rect};
use crate::trace::{trace_event, trace_span};
use crate::util::{FpMorphError, FpMorphResult};

/// Enhancement parameters; the block size comes from the region mask.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnhanceConfig {
    /// Gaussian envelope deviation of the Gabor kernel.
    pub deviation: f32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self { deviation: 4.0 }
    }
}

/// Returns true when the block centered at `(x, y)` and its eight
/// neighbours at the guard radius all have valid orientation.
fn is_filterable(orientations: &OrientationField, x: usize, y: usize, block_size: usize) -> bool {
    let half = block_size / 2 + 1;
    let around = if block_size % 2 == 0 { half } else { half + 1 };
    let (width, height) = orientations.shape();
    if x <= around || y <= around || x + around >= width || y + around >= height {
        return false;
    }
    let a = around as i64;
    let (x, y) = (x as i64, y as i64);
    [
        (0, 0),
        (-a, -a),
        (a, a),
        (a, -a),
        (-a, a),
        (0, -a),
        (0, a),
        (a, 0),
        (-a, 0),
    ]
    .iter()
    .all(|&(dx, dy)| orientations.is_valid(x + dx, y + dy))
}

fn block_rect(x: usize, y: usize, block_size: usize, width: usize, height: usize) -> Rect {
    let x0 = x.saturating_sub(block_size / 2);
    let y0 = y.saturating_sub(block_size / 2);
    Rect::from_corners(
        x0,
        y0,
        (x0 + block_size).min(width),
        (y0 + block_size).min(height),
    )
}

/// Enhances `normalized` block by block with Gabor kernels tuned to the local
/// orientation and frequency.
///
/// The block grid is swept once per offset in `-bs/2..=bs/2`. Each pass
/// convolves the blocks centered on its grid against the image as left by
/// the previous pass and rescales every block to [0, 1]. Blocks that are not
/// filterable, or whose frequency is not positive, are zeroed.
pub fn enhance(
    normalized: &Image,
    orientations: &OrientationField,
    frequencies: &FrequencyField,
    block_size: usize,
    cfg: &EnhanceConfig,
) -> FpMorphResult<Image> {
    if block_size % 2 == 0 {
        return Err(FpMorphError::EvenKernelSize { size: block_size });
    }
    for shape in [orientations.shape(), frequencies.shape()] {
        if shape != normalized.shape() {
            return Err(FpMorphError::ShapeMismatch {
                expected: normalized.shape(),
                got: shape,
            });
        }
    }
    let _span = trace_span!("enhance", block = block_size).entered();
    let (width, height) = normalized.shape();
    let mut out = normalized.clone();
    let half = (block_size / 2) as i64;
    let mut filtered_blocks = 0usize;
    let mut zeroed_blocks = 0usize;

    for offset in -half..=half {
        let snapshot = out.clone();
        let centers = (offset..)
            .step_by(block_size)
            .take_while(|&c| c < height as i64)
            .filter(|&c| c >= 0)
            .map(|c| c as usize)
            .collect::<Vec<_>>();
        let columns = (offset..)
            .step_by(block_size)
            .take_while(|&c| c < width as i64)
            .filter(|&c| c >= 0)
            .map(|c| c as usize)
            .collect::<Vec<_>>();

        for &y in &centers {
            for &x in &columns {
                let rect = block_rect(x, y, block_size, width, height);
                let frequency = frequencies.at(x as i64, y as i64);
                if !is_filterable(orientations, x, y, block_size) || frequency <= 0.0 {
                    out.fill_rect(rect, 0.0);
                    zeroed_blocks += 1;
                    continue;
                }
                let theta = orientations.angle(x as i64, y as i64).unwrap_or(0.0);
                let kernel = gabor_kernel(block_size, cfg.deviation, theta, 1.0 / frequency, 1.0, 0.0)?;
                let block = Grid::from_fn(rect.width, rect.height, |bx, by| {
                    kernel.apply_at(&snapshot, rect.x + bx, rect.y + by)
                })
                .rescaled();
                for by in 0..rect.height {
                    for bx in 0..rect.width {
                        out[(rect.x + bx, rect.y + by)] = block[(bx, by)];
                    }
                }
                filtered_blocks += 1;
            }
        }
    }
    trace_event!("enhanced", filtered = filtered_blocks, zeroed = zeroed_blocks);
    Ok(out)
}
