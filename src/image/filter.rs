//! Separable blurs, gradients, directional kernels and resampling.
//!
//! All neighbourhood filters read across the image edge with reflect-101
//! borders (`dcb|abcd|cba`), so a filter never invents samples.

use crate::image::{Grid, Image};
use crate::util::{FpMorphError, FpMorphResult};
use std::f32::consts::PI;

/// Maps a possibly out-of-range index into `[0, len)` with reflect-101.
#[inline]
pub(crate) fn reflect101(idx: i64, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let n = len as i64;
    let period = 2 * n - 2;
    let mut i = idx.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

/// Default Gaussian deviation for a kernel of `size` taps.
pub fn sigma_for_size(size: usize) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1D Gaussian kernel. A non-positive `sigma` is derived from `size`.
pub fn gaussian_kernel(size: usize, sigma: f32) -> FpMorphResult<Vec<f32>> {
    if size % 2 == 0 {
        return Err(FpMorphError::EvenKernelSize { size });
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        sigma_for_size(size)
    };
    let half = (size / 2) as f32;
    let scale = -0.5 / (sigma * sigma);
    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - half;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    Ok(kernel)
}

/// Blurs an image with a separable Gaussian of `size` taps.
pub fn gaussian_blur(img: &Image, size: usize, sigma: f32) -> FpMorphResult<Image> {
    let kernel = gaussian_kernel(size, sigma)?;
    Ok(separable(img, &kernel, &kernel))
}

fn separable(img: &Image, kx: &[f32], ky: &[f32]) -> Image {
    if img.is_empty() {
        return img.clone();
    }
    let (width, height) = img.shape();
    let hx = (kx.len() / 2) as i64;
    let hy = (ky.len() / 2) as i64;

    let horizontal = Grid::from_fn(width, height, |x, y| {
        let row = img.row(y);
        kx.iter()
            .enumerate()
            .map(|(i, k)| k * row[reflect101(x as i64 + i as i64 - hx, width)])
            .sum::<f32>()
    });
    Grid::from_fn(width, height, |x, y| {
        ky.iter()
            .enumerate()
            .map(|(i, k)| k * horizontal[(x, reflect101(y as i64 + i as i64 - hy, height))])
            .sum::<f32>()
    })
}

/// Horizontal and vertical 3x3 Sobel derivatives.
pub fn sobel(img: &Image) -> (Image, Image) {
    let gx = separable(img, &[-1.0, 0.0, 1.0], &[1.0, 2.0, 1.0]);
    let gy = separable(img, &[1.0, 2.0, 1.0], &[-1.0, 0.0, 1.0]);
    (gx, gy)
}

/// Square 2D filter kernel stored row-major.
#[derive(Clone, Debug)]
pub struct Kernel2d {
    size: usize,
    taps: Vec<f32>,
}

impl Kernel2d {
    /// Side length in taps.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Tap at column `x`, row `y`.
    pub fn tap(&self, x: usize, y: usize) -> f32 {
        self.taps[y * self.size + x]
    }

    /// Correlates the kernel with `img` centered at `(x, y)`, reflect-101 borders.
    pub fn apply_at(&self, img: &Image, x: usize, y: usize) -> f32 {
        let half = (self.size / 2) as i64;
        let (width, height) = img.shape();
        let mut acc = 0.0f32;
        for ky in 0..self.size {
            let sy = reflect101(y as i64 + ky as i64 - half, height);
            let row = img.row(sy);
            for kx in 0..self.size {
                let sx = reflect101(x as i64 + kx as i64 - half, width);
                acc += self.taps[ky * self.size + kx] * row[sx];
            }
        }
        acc
    }
}

/// Real Gabor kernel tuned to a ridge direction and wavelength.
///
/// `theta` is the normal of the ridges, `lambda` the ridge period in pixels,
/// `gamma` the spatial aspect ratio and `psi` the phase offset.
pub fn gabor_kernel(
    size: usize,
    sigma: f32,
    theta: f32,
    lambda: f32,
    gamma: f32,
    psi: f32,
) -> FpMorphResult<Kernel2d> {
    if size % 2 == 0 {
        return Err(FpMorphError::EvenKernelSize { size });
    }
    let half = (size / 2) as i64;
    let sigma_x = sigma;
    let sigma_y = sigma / gamma;
    let ex = -0.5 / (sigma_x * sigma_x);
    let ey = -0.5 / (sigma_y * sigma_y);
    let cscale = 2.0 * PI / lambda;
    let (s, c) = theta.sin_cos();

    let mut taps = vec![0.0f32; size * size];
    for y in -half..=half {
        for x in -half..=half {
            let (xf, yf) = (x as f32, y as f32);
            let xr = xf * c + yf * s;
            let yr = -xf * s + yf * c;
            let v = (ex * xr * xr + ey * yr * yr).exp() * (cscale * xr + psi).cos();
            // Stored point-mirrored so correlation equals convolution.
            let row = (half - y) as usize;
            let col = (half - x) as usize;
            taps[row * size + col] = v;
        }
    }
    Ok(Kernel2d { size, taps })
}

/// Resamples an image by `scale` with bilinear interpolation on pixel centers.
pub fn resize_bilinear(img: &Image, scale: f32) -> Image {
    if img.is_empty() {
        return img.clone();
    }
    let (width, height) = img.shape();
    let out_w = ((width as f32 * scale).round() as usize).max(1);
    let out_h = ((height as f32 * scale).round() as usize).max(1);
    let inv_x = width as f32 / out_w as f32;
    let inv_y = height as f32 / out_h as f32;
    let max_x = width - 1;
    let max_y = height - 1;

    Grid::from_fn(out_w, out_h, |x, y| {
        let sx = ((x as f32 + 0.5) * inv_x - 0.5).max(0.0);
        let sy = ((y as f32 + 0.5) * inv_y - 0.5).max(0.0);
        let x0 = (sx.floor() as usize).min(max_x);
        let y0 = (sy.floor() as usize).min(max_y);
        let x1 = (x0 + 1).min(max_x);
        let y1 = (y0 + 1).min(max_y);
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;
        let top = img[(x0, y0)] * (1.0 - fx) + img[(x1, y0)] * fx;
        let bottom = img[(x0, y1)] * (1.0 - fx) + img[(x1, y1)] * fx;
        top * (1.0 - fy) + bottom * fy
    })
}
