//! Contrast normalization toward a fixed target mean.

use crate::image::filter::{gaussian_blur, resize_bilinear};
use crate::image::Image;
use crate::trace::{trace_event, trace_span};
use crate::util::FpMorphResult;

/// Normalization parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizeConfig {
    /// Resampling factor applied to the raw image first.
    pub scale: f32,
    /// Gaussian smoothing kernel size (odd).
    pub blur_size: usize,
    /// Target mean of the normalized image.
    pub target_mean: f32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            scale: 1.1,
            blur_size: 5,
            target_mean: 75.0 / 255.0,
        }
    }
}

/// Output of [`normalize`]: the resampled raw image and its normalized copy.
#[derive(Clone, Debug)]
pub struct Normalized {
    pub resized: Image,
    pub normalized: Image,
}

/// Resamples, smooths and normalizes an image.
///
/// After a min-max rescale each sample moves to
/// `m0 +/- sqrt(m0 * (x - m)^2 / d)` with `m` the mean and `d` the standard
/// deviation, the sign following `x > m`. A flat image has no deviation and
/// maps to `m0` everywhere.
pub fn normalize(raw: &Image, cfg: &NormalizeConfig) -> FpMorphResult<Normalized> {
    let _span = trace_span!("normalize", width = raw.width(), height = raw.height()).entered();
    let resized = resize_bilinear(raw, cfg.scale);
    let blurred = gaussian_blur(&resized, cfg.blur_size, 0.0)?;
    let scaled = blurred.rescaled();

    let count = scaled.data().len().max(1) as f64;
    let mean = scaled.data().iter().map(|&v| v as f64).sum::<f64>() / count;
    let var = scaled
        .data()
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / count;
    let dev = var.sqrt();
    let m0 = cfg.target_mean as f64;

    let normalized = scaled.map(|v| {
        if dev <= 0.0 {
            return m0 as f32;
        }
        let diff = v as f64 - mean;
        let delta = (m0 * diff * diff / dev).sqrt();
        let out = if diff > 0.0 { m0 + delta } else { m0 - delta };
        out.clamp(0.0, 1.0) as f32
    });
    trace_event!("normalized", mean = mean, deviation = dev);
    Ok(Normalized {
        resized,
        normalized,
    })
}
