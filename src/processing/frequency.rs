//! Ridge frequency from x-signature peaks, with the foreground vote that
//! yields the region mask.

use crate::fingerprint::{FrequencyField, OrientationField, RegionMask};
use crate::image::filter::gaussian_blur;
use crate::image::{Grid, Image};
use crate::processing::orientation::block_spans;
use crate::processing::region::{block_rect, correct_segmentation};
use crate::trace::{trace_event, trace_span};
use crate::util::math::{odd_size, round_i};
use crate::util::{FpMorphError, FpMorphResult};
use std::f32::consts::FRAC_PI_2;

/// Frequency estimation parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrequencyConfig {
    /// Block size in pixels.
    pub block_size: usize,
    /// Number of x-signature samples.
    pub window_size: usize,
    /// Fills unrecoverable blocks from their neighbours and smooths the field.
    pub interpolate: bool,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            block_size: 8,
            window_size: 16,
            interpolate: false,
        }
    }
}

/// Frequency field and region mask, both cropped to the foreground region.
#[derive(Clone, Debug)]
pub struct FrequencyEstimate {
    pub frequencies: FrequencyField,
    pub region: RegionMask,
}

const PEAK_LEVEL: f32 = 0.5;
const MIN_PEAK_GAP: usize = 6;
const MIN_SPACING: f32 = 3.0;
const MAX_SPACING: f32 = 25.0;
const MIN_AMPLITUDE: f32 = 0.2;
const MIN_VARIANCE: f32 = 0.01;
const UNRECOVERABLE: f32 = -1.0;

/// Samples the inverted intensity profile across the ridges at `(cx, cy)`.
///
/// Sample `k` averages `block_size` pixels along the ridge; only pixels
/// inside the image with valid orientation count, and a sample without any
/// such pixel is 0.
pub fn x_signature(
    img: &Image,
    orientations: &OrientationField,
    cx: usize,
    cy: usize,
    block_size: usize,
    window_size: usize,
) -> Vec<f32> {
    let theta = orientations.angle(cx as i64, cy as i64).unwrap_or(0.0);
    let (s, c) = (theta - FRAC_PI_2).sin_cos();
    let half_window = (window_size / 2) as i64;
    let half_block = block_size as f32 / 2.0;

    (-half_window..half_window)
        .map(|k| {
            let k = k as f32;
            let mut sum = 0.0f32;
            let mut count = 0usize;
            for d in 0..block_size {
                let along = d as f32 - half_block;
                let row = round_i(cy as f32 + along * s + (0.5 - k) * c);
                let col = round_i(cx as f32 + along * c + (k - 0.5) * s);
                if !orientations.is_valid(col, row) {
                    continue;
                }
                if let Some(v) = img.get_signed(col, row) {
                    sum += v;
                    count += 1;
                }
            }
            if count == 0 {
                0.0
            } else {
                1.0 - sum / count as f32
            }
        })
        .collect()
}

fn push_extremum(indices: &mut Vec<usize>, index: usize, signal: &[f32], valley: bool) {
    let Some(&last) = indices.last() else {
        indices.push(index);
        return;
    };
    if index - last > MIN_PEAK_GAP {
        indices.push(index);
        return;
    }
    let better = if valley {
        signal[index] < signal[last]
    } else {
        signal[index] > signal[last]
    };
    if better {
        indices.pop();
        indices.push(index);
    }
}

/// Finds peak and valley indices of a signature.
///
/// Peaks must exceed 0.5 and dominate their neighbours (end samples compare
/// their single neighbour). Valleys are local minima, end samples also below
/// 0.5. Candidates closer than the minimum gap to the previous one replace
/// it only when strictly more extreme.
pub fn find_extrema(signal: &[f32]) -> (Vec<usize>, Vec<usize>) {
    let mut peaks = Vec::new();
    let mut valleys = Vec::new();
    let n = signal.len();
    if n < 2 {
        return (peaks, valleys);
    }
    for i in 0..n {
        let v = signal[i];
        let is_peak = if i == 0 {
            v > PEAK_LEVEL && v >= signal[1]
        } else if i == n - 1 {
            v > PEAK_LEVEL && v >= signal[i - 1]
        } else {
            v > PEAK_LEVEL && signal[i - 1] <= v && v >= signal[i + 1]
        };
        if is_peak {
            push_extremum(&mut peaks, i, signal, false);
        }

        let is_valley = if i == 0 {
            v < PEAK_LEVEL && v <= signal[1]
        } else if i == n - 1 {
            v < PEAK_LEVEL && v <= signal[i - 1]
        } else {
            signal[i - 1] >= v && v <= signal[i + 1]
        };
        if is_valley {
            push_extremum(&mut valleys, i, signal, true);
        }
    }
    (peaks, valleys)
}

/// Mean distance between consecutive peaks, `None` for fewer than two peaks
/// or a spacing outside [3, 25].
pub fn average_spacing(peaks: &[usize]) -> Option<f32> {
    if peaks.len() < 2 {
        return None;
    }
    let total: usize = peaks.windows(2).map(|w| w[1] - w[0]).sum();
    let avg = total as f32 / (peaks.len() - 1) as f32;
    (MIN_SPACING..=MAX_SPACING).contains(&avg).then_some(avg)
}

fn amplitude(signal: &[f32], peaks: &[usize], valleys: &[usize]) -> f32 {
    if peaks.is_empty() || valleys.is_empty() {
        return 0.0;
    }
    let mean = |idx: &[usize]| idx.iter().map(|&i| signal[i]).sum::<f32>() / idx.len() as f32;
    mean(peaks) - mean(valleys)
}

/// Population variance of the window starting at `(x, y)`.
fn window_variance(img: &Image, x: usize, y: usize, extent: usize) -> f32 {
    let x1 = (x + extent).min(img.width());
    let y1 = (y + extent).min(img.height());
    let count = ((x1 - x) * (y1 - y)) as f32;
    if count == 0.0 {
        return 0.0;
    }
    let mut sum = 0.0f32;
    let mut sum_sq = 0.0f32;
    for yy in y..y1 {
        for &v in &img.row(yy)[x..x1] {
            sum += v;
            sum_sq += v * v;
        }
    }
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// Estimates the frequency field and region mask of a normalized image.
///
/// Both results are cropped to the block-aligned foreground region; blocks
/// outside the corrected mask read 0. An image without foreground yields
/// empty fields and an empty region.
pub fn estimate_frequencies(
    normalized: &Image,
    orientations: &OrientationField,
    cfg: &FrequencyConfig,
) -> FpMorphResult<FrequencyEstimate> {
    if cfg.block_size == 0 {
        return Err(FpMorphError::InvalidConfig("frequency block size must be positive"));
    }
    if orientations.shape() != normalized.shape() {
        return Err(FpMorphError::ShapeMismatch {
            expected: normalized.shape(),
            got: orientations.shape(),
        });
    }
    let _span = trace_span!(
        "estimate_frequencies",
        block = cfg.block_size,
        window = cfg.window_size
    )
    .entered();

    let (width, height) = normalized.shape();
    let bs = cfg.block_size;
    let xs: Vec<_> = block_spans(width, bs).collect();
    let ys: Vec<_> = block_spans(height, bs).collect();
    let mut raw = Grid::filled(xs.len(), ys.len(), UNRECOVERABLE);
    let mut votes = Grid::filled(xs.len(), ys.len(), false);
    let mut region = RegionMask::default();
    let mut extremes: Option<(f32, f32)> = None;

    for (by, &(y0, _)) in ys.iter().enumerate() {
        for (bx, &(x0, _)) in xs.iter().enumerate() {
            let (cx, cy) = (x0 + bs / 2, y0 + bs / 2);
            let signal = x_signature(normalized, orientations, cx, cy, bs, cfg.window_size);
            let (peaks, valleys) = find_extrema(&signal);
            let spacing = average_spacing(&peaks);
            let frequency = spacing.map_or(UNRECOVERABLE, |avg| 1.0 / avg);
            raw[(bx, by)] = frequency;

            if let Some(avg) = spacing {
                extremes = Some(match extremes {
                    None => (frequency, frequency),
                    Some((lo, hi)) => (lo.min(frequency), hi.max(frequency)),
                });
                let amp = amplitude(&signal, &peaks, &valleys);
                let var = window_variance(normalized, cx, cy, 4 * bs);
                if amp > MIN_AMPLITUDE && var > MIN_VARIANCE {
                    votes[(bx, by)] = true;
                    region.add_peak_distance(avg);
                }
            }
        }
    }
    let (min_f, max_f) = extremes.unwrap_or((0.0, 0.0));

    let Some(bbox) = correct_segmentation(&mut votes) else {
        trace_event!("frequencies", foreground_blocks = 0usize, min = min_f, max = max_f);
        region.set_mask(Image::default_empty(), Default::default());
        return Ok(FrequencyEstimate {
            frequencies: FrequencyField::new(Image::default_empty(), min_f, max_f),
            region,
        });
    };
    let rect = block_rect(bbox, bs, width, height);
    let (bx0, by0, bx1, by1) = bbox;
    let block_cols = bx1 - bx0 + 1;
    let block_rows = by1 - by0 + 1;

    let mask_blocks = Grid::from_fn(block_cols, block_rows, |x, y| votes[(bx0 + x, by0 + y)]);
    let mut freq_blocks = Grid::from_fn(block_cols, block_rows, |x, y| {
        if mask_blocks[(x, y)] {
            raw[(bx0 + x, by0 + y)]
        } else {
            0.0
        }
    });
    if cfg.interpolate {
        freq_blocks = interpolate_blocks(&freq_blocks);
    }

    // Expand to pixel resolution; the region starts on a block boundary.
    let block_of = |x: usize, y: usize| ((x / bs).min(block_cols - 1), (y / bs).min(block_rows - 1));
    let mask = Grid::from_fn(rect.width, rect.height, |x, y| {
        if mask_blocks[block_of(x, y)] {
            1.0
        } else {
            0.0
        }
    });
    let mut values = Grid::from_fn(rect.width, rect.height, |x, y| freq_blocks[block_of(x, y)]);
    if cfg.interpolate {
        values = gaussian_blur(&values, odd_size(7 * bs), (9 * bs) as f32)?;
    }

    let foreground = mask_blocks.data().iter().filter(|&&b| b).count();
    trace_event!(
        "frequencies",
        foreground_blocks = foreground,
        min = min_f,
        max = max_f
    );
    region.set_mask(mask, rect);
    Ok(FrequencyEstimate {
        frequencies: FrequencyField::new(values, min_f, max_f),
        region,
    })
}

/// Replaces unrecoverable blocks with the mean of the positive values in
/// their 3x3 block neighbourhood, or 0 without any.
fn interpolate_blocks(blocks: &Image) -> Image {
    let (cols, rows) = blocks.shape();
    Grid::from_fn(cols, rows, |x, y| {
        let v = blocks[(x, y)];
        if v != UNRECOVERABLE {
            return v;
        }
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if let Some(n) = blocks.get_signed(x as i64 + dx, y as i64 + dy) {
                    if n > 0.0 {
                        sum += n;
                        count += 1;
                    }
                }
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::orientation::{estimate_orientations, OrientationConfig};
    use std::f32::consts::PI;

    #[test]
    fn extrema_respect_minimum_gap() {
        let signal = [0.9, 0.2, 0.95, 0.1, 0.1, 0.2, 0.3, 0.4, 0.6, 0.8, 0.9, 0.7];
        let (peaks, valleys) = find_extrema(&signal);
        // index 2 replaces index 0, index 10 is far enough to be kept
        assert_eq!(peaks, vec![2, 10]);
        assert_eq!(valleys, vec![3]);
    }

    #[test]
    fn spacing_rejects_implausible_values() {
        assert_eq!(average_spacing(&[0]), None);
        assert_eq!(average_spacing(&[0, 8, 16]), Some(8.0));
        assert_eq!(average_spacing(&[0, 2]), None);
        assert_eq!(average_spacing(&[0, 30]), None);
    }

    #[test]
    fn signature_of_grating_recovers_period() {
        let period = 8.0f32;
        let img = Grid::from_fn(96, 96, |x, _| 0.5 + 0.5 * (2.0 * PI * x as f32 / period).cos());
        let field = estimate_orientations(&img, &OrientationConfig::default()).unwrap();
        let signal = x_signature(&img, &field, 48, 48, 8, 32);
        let (peaks, _) = find_extrema(&signal);
        let avg = average_spacing(&peaks).unwrap();
        assert!((avg - period).abs() < 0.5, "spacing {avg}");
    }

    #[test]
    fn flat_image_has_empty_region() {
        let img = Grid::filled(64, 64, 0.4f32);
        let field = estimate_orientations(&img, &OrientationConfig::default()).unwrap();
        let est = estimate_frequencies(&img, &field, &FrequencyConfig::default()).unwrap();
        assert!(est.region.is_empty());
        assert!(est.frequencies.values().is_empty());
        assert_eq!(est.frequencies.max(), 0.0);
    }

    #[test]
    fn interpolation_averages_positive_neighbours() {
        let blocks = Grid::from_vec(vec![0.1, -1.0, 0.0, 0.2, 0.0, -1.0], 3, 2).unwrap();
        let out = interpolate_blocks(&blocks);
        assert!((out[(1, 0)] - 0.15).abs() < 1e-6);
        assert_eq!(out[(2, 1)], 0.0);
        assert_eq!(out[(0, 0)], 0.1);
    }
}
