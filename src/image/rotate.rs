//! Rotation of sample grids into an expanded bounding box.
//!
//! The grid is rotated about its center `((w - 1) / 2, (h - 1) / 2)` and the
//! output canvas grows to the bounding box of the rotated rectangle so no
//! source sample is lost. Every destination pixel is mapped back to the
//! source with the inverse rotation and sampled bilinearly; taps outside the
//! source read `fill`, so samples along the rotated border blend toward it.

use crate::image::{Grid, Image};
use crate::util::math::sin_cos_deg;

/// Shared geometry for rotating several equally sized grids by one angle.
#[derive(Copy, Clone, Debug)]
pub struct Rotation {
    sin: f32,
    cos: f32,
    src_width: usize,
    src_height: usize,
    out_width: usize,
    out_height: usize,
    shift_x: f32,
    shift_y: f32,
}

impl Rotation {
    /// Prepares a rotation of a `width x height` grid by `angle_deg`.
    ///
    /// Positive angles turn the content clockwise on screen (y down), so a
    /// direction `phi` becomes `phi + angle`.
    pub fn new(width: usize, height: usize, angle_deg: f32) -> Self {
        let (sin, cos) = sin_cos_deg(angle_deg);
        let (w, h) = (width as f32, height as f32);
        let out_w = (w * cos.abs() + h * sin.abs()).round().max(0.0) as usize;
        let out_h = (w * sin.abs() + h * cos.abs()).round().max(0.0) as usize;
        Self {
            sin,
            cos,
            src_width: width,
            src_height: height,
            out_width: out_w,
            out_height: out_h,
            shift_x: out_w as f32 / 2.0 - w / 2.0,
            shift_y: out_h as f32 / 2.0 - h / 2.0,
        }
    }

    /// Size of the expanded output canvas.
    pub fn output_shape(&self) -> (usize, usize) {
        (self.out_width, self.out_height)
    }

    /// Maps a destination pixel back to fractional source coordinates.
    pub fn source_of(&self, x: f32, y: f32) -> (f32, f32) {
        let cx = (self.src_width as f32 - 1.0) * 0.5;
        let cy = (self.src_height as f32 - 1.0) * 0.5;
        let dx = x - self.shift_x - cx;
        let dy = y - self.shift_y - cy;
        (
            self.cos * dx + self.sin * dy + cx,
            -self.sin * dx + self.cos * dy + cy,
        )
    }

    /// Rotates `src` into the expanded canvas, reading `fill` outside it.
    pub fn apply(&self, src: &Image, fill: f32) -> Image {
        if src.is_empty() {
            return Grid::filled(self.out_width, self.out_height, fill);
        }
        Grid::from_fn(self.out_width, self.out_height, |x, y| {
            let (sx, sy) = self.source_of(x as f32, y as f32);
            sample_bilinear(src, sx, sy, fill)
        })
    }
}

/// Bilinear sample where taps outside the grid read `fill`.
pub(crate) fn sample_bilinear(src: &Image, sx: f32, sy: f32, fill: f32) -> f32 {
    if !sx.is_finite() || !sy.is_finite() {
        return fill;
    }
    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);
    let tap = |x: i64, y: i64| src.get_signed(x, y).unwrap_or(fill);
    let top = tap(x0, y0) * (1.0 - fx) + tap(x0 + 1, y0) * fx;
    let bottom = tap(x0, y0 + 1) * (1.0 - fx) + tap(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Rotates a grid by `angle_deg` into its expanded bounding box.
pub fn rotate_expanded(src: &Image, angle_deg: f32, fill: f32) -> Image {
    Rotation::new(src.width(), src.height(), angle_deg).apply(src, fill)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rotation_is_identity() {
        let img = Grid::from_fn(7, 5, |x, y| (x * 3 + y) as f32 / 40.0);
        let out = rotate_expanded(&img, 0.0, 1.0);
        assert_eq!(out.shape(), (7, 5));
        for (a, b) in out.data().iter().zip(img.data()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn quarter_turn_swaps_dimensions() {
        let img = Grid::from_fn(8, 4, |x, _| x as f32);
        let rot = Rotation::new(8, 4, 90.0);
        assert_eq!(rot.output_shape(), (4, 8));
        let out = rot.apply(&img, 0.0);
        // Clockwise on screen: the first source column lands on the top row.
        for x in 0..4 {
            assert!(out[(x, 0)].abs() < 1e-4, "x={x} v={}", out[(x, 0)]);
            assert!((out[(x, 7)] - 7.0).abs() < 1e-4);
        }
    }

    #[test]
    fn outside_samples_use_fill() {
        let img = Grid::filled(10, 10, 0.0f32);
        let out = rotate_expanded(&img, 45.0, 1.0);
        assert!(out.width() > 10);
        assert_eq!(out[(0, 0)], 1.0);
    }
}
