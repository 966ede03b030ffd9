//! Block-granularity fields stored at pixel resolution.
//!
//! Every pixel of a block carries the block value, so consumers can index a
//! field with image coordinates directly. A validity or mask value of zero
//! marks samples every consumer must skip.

use crate::image::{Image, Rect};
use crate::util::math::round_i;
use crate::util::FpMorphResult;

/// Ridge orientation per block with a validity flag.
///
/// Angles are the dominant gradient orientation in [0, pi); ridges run
/// perpendicular to it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrientationField {
    angles: Image,
    validity: Image,
    block_size: usize,
}

impl OrientationField {
    /// Wraps angle and validity grids of equal shape.
    pub fn new(angles: Image, validity: Image, block_size: usize) -> FpMorphResult<Self> {
        if angles.shape() != validity.shape() {
            return Err(crate::util::FpMorphError::ShapeMismatch {
                expected: angles.shape(),
                got: validity.shape(),
            });
        }
        Ok(Self {
            angles,
            validity,
            block_size,
        })
    }

    /// Angle grid.
    pub fn angles(&self) -> &Image {
        &self.angles
    }

    /// Validity grid.
    pub fn validity(&self) -> &Image {
        &self.validity
    }

    /// Block size the field was estimated with.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn width(&self) -> usize {
        self.angles.width()
    }

    pub fn height(&self) -> usize {
        self.angles.height()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.angles.shape()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    /// Angle at `(x, y)`, `None` outside the field.
    pub fn angle(&self, x: i64, y: i64) -> Option<f32> {
        self.angles.get_signed(x, y)
    }

    /// Validity at `(x, y)`; samples outside the field read 0.
    pub fn validity_at(&self, x: i64, y: i64) -> f32 {
        self.validity.get_signed(x, y).unwrap_or(0.0)
    }

    /// Returns true when `(x, y)` is inside the field and valid.
    pub fn is_valid(&self, x: i64, y: i64) -> bool {
        self.validity_at(x, y) > 0.0
    }

    /// Copies `rect` out of both grids.
    pub fn crop(&self, rect: Rect) -> FpMorphResult<Self> {
        Ok(Self {
            angles: self.angles.crop(rect)?,
            validity: self.validity.crop(rect)?,
            block_size: self.block_size,
        })
    }

    /// Replaces the validity grid with a region mask of the same shape.
    pub fn with_validity(mut self, validity: Image) -> FpMorphResult<Self> {
        if validity.shape() != self.angles.shape() {
            return Err(crate::util::FpMorphError::ShapeMismatch {
                expected: self.angles.shape(),
                got: validity.shape(),
            });
        }
        self.validity = validity;
        Ok(self)
    }

    /// Counts block centers `(k*bs + bs/2)` with positive validity.
    pub fn foreground_blocks(&self, block_size: usize) -> usize {
        if block_size == 0 {
            return 0;
        }
        let (width, height) = self.shape();
        let mut blocks = 0;
        for y in (block_size / 2..height).step_by(block_size) {
            for x in (block_size / 2..width).step_by(block_size) {
                if self.validity[(x, y)] > 0.0 {
                    blocks += 1;
                }
            }
        }
        blocks
    }
}

/// Ridge frequency per block with the extremes seen during estimation.
///
/// Values are `1/spacing` for recoverable blocks, `-1` for unrecoverable
/// blocks inside the region (until interpolated) and `0` for background.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrequencyField {
    values: Image,
    min: f32,
    max: f32,
}

impl FrequencyField {
    pub fn new(values: Image, min: f32, max: f32) -> Self {
        Self { values, min, max }
    }

    pub fn values(&self) -> &Image {
        &self.values
    }

    /// Smallest recoverable frequency, 0 when none was found.
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Largest frequency, 0 when none was found.
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Frequency at `(x, y)`, 0 outside the field.
    pub fn at(&self, x: i64, y: i64) -> f32 {
        self.values.get_signed(x, y).unwrap_or(0.0)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    pub(crate) fn with_values(&self, values: Image) -> Self {
        Self {
            values,
            min: self.min,
            max: self.max,
        }
    }
}

/// Foreground/background mask with its bounding region and the ridge
/// spacing statistics gathered from foreground blocks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionMask {
    mask: Image,
    region: Rect,
    total_peak_distance: f32,
    peak_distances: usize,
}

impl RegionMask {
    pub fn new(mask: Image, region: Rect) -> Self {
        Self {
            mask,
            region,
            total_peak_distance: 0.0,
            peak_distances: 0,
        }
    }

    /// Mask samples: 1 foreground, 0 background.
    pub fn mask(&self) -> &Image {
        &self.mask
    }

    /// Bounding region in the coordinates of the image it was estimated on.
    pub fn region(&self) -> Rect {
        self.region
    }

    /// Mask value at `(x, y)`, 0 outside.
    pub fn at(&self, x: i64, y: i64) -> f32 {
        self.mask.get_signed(x, y).unwrap_or(0.0)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.mask.shape()
    }

    /// Returns true when no foreground was found.
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Records the peak spacing of one foreground block.
    pub fn add_peak_distance(&mut self, distance: f32) {
        self.total_peak_distance += distance;
        self.peak_distances += 1;
    }

    /// Mean recorded peak spacing, 0 when nothing was recorded.
    pub fn average_peak_distance(&self) -> f32 {
        if self.peak_distances == 0 {
            return 0.0;
        }
        self.total_peak_distance / self.peak_distances as f32
    }

    /// Odd enhancement block size matching the average ridge spacing.
    pub fn ideal_enhance_block(&self) -> usize {
        let size = round_i(self.average_peak_distance()).max(0) as usize;
        if size % 2 == 1 {
            size
        } else {
            size + 1
        }
    }

    pub(crate) fn set_mask(&mut self, mask: Image, region: Rect) {
        self.mask = mask;
        self.region = region;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Grid;

    #[test]
    fn foreground_blocks_sample_block_centers() {
        let angles = Grid::filled(32, 16, 0.5f32);
        let validity = Grid::from_fn(32, 16, |x, _| if x < 16 { 1.0 } else { 0.0 });
        let field = OrientationField::new(angles, validity, 8).unwrap();
        assert_eq!(field.foreground_blocks(8), 4);
        assert_eq!(field.foreground_blocks(16), 1);
    }

    #[test]
    fn ideal_block_is_odd() {
        let mut mask = RegionMask::default();
        assert_eq!(mask.ideal_enhance_block(), 1);
        mask.add_peak_distance(8.0);
        mask.add_peak_distance(9.0);
        assert_eq!(mask.average_peak_distance(), 8.5);
        assert_eq!(mask.ideal_enhance_block(), 9);
        mask.add_peak_distance(5.0);
        assert_eq!(mask.ideal_enhance_block(), 7);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = OrientationField::new(Grid::filled(4, 4, 0.0), Grid::filled(4, 3, 0.0), 2)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::util::FpMorphError::ShapeMismatch { .. }
        ));
    }
}
