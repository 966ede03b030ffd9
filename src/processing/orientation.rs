//! Block-wise ridge orientation from gradient moments.

use crate::fingerprint::OrientationField;
use crate::image::filter::{gaussian_blur, sobel};
use crate::image::{Grid, Image};
use crate::trace::{trace_event, trace_span};
use crate::util::math::{odd_size, wrap_half_turn};
use crate::util::{FpMorphError, FpMorphResult};

/// Orientation estimation parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientationConfig {
    /// Block size in pixels.
    pub block_size: usize,
    /// Smooths the doubled-angle vector field before re-deriving angles.
    pub low_pass: bool,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            block_size: 16,
            low_pass: false,
        }
    }
}

/// Pixel span `[start, end)` of every block along an axis of length `len`.
///
/// A block is kept only while its center `k*bs + bs/2` lies inside the axis.
pub(crate) fn block_spans(len: usize, block_size: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..)
        .map(move |k| k * block_size)
        .take_while(move |start| block_size > 0 && start + block_size / 2 < len)
        .map(move |start| (start, (start + block_size).min(len)))
}

fn fill_block(grid: &mut Image, (x0, x1): (usize, usize), (y0, y1): (usize, usize), value: f32) {
    for y in y0..y1 {
        for x in x0..x1 {
            grid[(x, y)] = value;
        }
    }
}

/// Estimates the orientation field of a normalized image.
///
/// Each block gets `0.5 * atan2(2*sum(gx*gy), sum(gx^2 - gy^2))` in [0, pi)
/// and validity 1; blocks whose `sum(gx^2 - gy^2)` is zero keep validity 0.
pub fn estimate_orientations(
    normalized: &Image,
    cfg: &OrientationConfig,
) -> FpMorphResult<OrientationField> {
    if cfg.block_size == 0 {
        return Err(FpMorphError::InvalidConfig("orientation block size must be positive"));
    }
    let _span = trace_span!("estimate_orientations", block = cfg.block_size).entered();
    let (width, height) = normalized.shape();
    let mut angles = Grid::filled(width, height, 0.0f32);
    let mut validity = Grid::filled(width, height, 0.0f32);
    let mut phi_x = Grid::filled(width, height, 0.0f32);
    let mut phi_y = Grid::filled(width, height, 0.0f32);
    let (gx, gy) = sobel(normalized);

    for ys in block_spans(height, cfg.block_size) {
        for xs in block_spans(width, cfg.block_size) {
            let mut vsx = 0.0f32;
            let mut vsy = 0.0f32;
            for y in ys.0..ys.1 {
                for x in xs.0..xs.1 {
                    let (dx, dy) = (gx[(x, y)], gy[(x, y)]);
                    vsy += 2.0 * dx * dy;
                    vsx += dx * dx - dy * dy;
                }
            }
            if vsx == 0.0 {
                continue;
            }
            let theta = wrap_half_turn(0.5 * vsy.atan2(vsx));
            fill_block(&mut angles, xs, ys, theta);
            fill_block(&mut validity, xs, ys, 1.0);
            fill_block(&mut phi_x, xs, ys, (2.0 * theta).cos());
            fill_block(&mut phi_y, xs, ys, (2.0 * theta).sin());
        }
    }

    if cfg.low_pass && !normalized.is_empty() {
        let size = odd_size(7 * cfg.block_size);
        let fx = gaussian_blur(&phi_x, size, 0.0)?;
        let fy = gaussian_blur(&phi_y, size, 0.0)?;
        for ys in block_spans(height, cfg.block_size) {
            for xs in block_spans(width, cfg.block_size) {
                let cx = xs.0 + cfg.block_size / 2;
                let cy = ys.0 + cfg.block_size / 2;
                let (vx, vy) = (fx[(cx, cy)], fy[(cx, cy)]);
                let theta = if vx != 0.0 {
                    wrap_half_turn(0.5 * vy.atan2(vx))
                } else {
                    0.0
                };
                fill_block(&mut angles, xs, ys, theta);
            }
        }
    }

    let field = OrientationField::new(angles, validity, cfg.block_size)?;
    trace_event!(
        "orientations",
        valid_blocks = field.foreground_blocks(cfg.block_size)
    );
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn grating(size: usize, normal: f32, period: f32) -> Image {
        let (s, c) = normal.sin_cos();
        Grid::from_fn(size, size, |x, y| {
            let t = x as f32 * c + y as f32 * s;
            0.5 + 0.5 * (2.0 * PI * t / period).cos()
        })
    }

    #[test]
    fn block_spans_clip_last_block() {
        let spans: Vec<_> = block_spans(21, 8).collect();
        assert_eq!(spans, vec![(0, 8), (8, 16), (16, 21)]);
        let spans: Vec<_> = block_spans(20, 8).collect();
        assert_eq!(spans, vec![(0, 8), (8, 16)]);
    }

    #[test]
    fn recovers_grating_normal() {
        let normal = 0.6f32;
        let img = grating(64, normal, 8.0);
        let field = estimate_orientations(&img, &OrientationConfig::default()).unwrap();
        let angle = field.angle(24, 24).unwrap();
        assert!(field.is_valid(24, 24));
        assert!((angle - normal).abs() < 0.05, "angle {angle}");
    }

    #[test]
    fn flat_image_stays_invalid() {
        let img = Grid::filled(32, 32, 0.3f32);
        let field = estimate_orientations(&img, &OrientationConfig::default()).unwrap();
        assert_eq!(field.foreground_blocks(16), 0);
    }

    #[test]
    fn low_pass_keeps_uniform_field() {
        let normal = 2.0f32;
        let img = grating(96, normal, 9.0);
        let cfg = OrientationConfig {
            block_size: 12,
            low_pass: true,
        };
        let field = estimate_orientations(&img, &cfg).unwrap();
        let angle = field.angle(48, 48).unwrap();
        assert!((angle - normal).abs() < 0.05, "angle {angle}");
    }
}
