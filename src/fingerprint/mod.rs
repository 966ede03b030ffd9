//! The per-fingerprint working record and its derived fields.
//!
//! A `Fingerprint` owns the raw image plus every field a pipeline stage has
//! produced so far. Stages fill their slot in order; reading a slot before
//! its stage ran is a `StageNotRun` error rather than a default value.

use crate::image::{BinaryImage, Image};
use crate::util::{FpMorphError, FpMorphResult};

mod fields;
mod minutia;

pub use fields::{FrequencyField, OrientationField, RegionMask};
pub use minutia::{Adjacency, Minutia, MinutiaKind};

/// Block geometry attached to a fingerprint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FingerprintParams {
    /// Block size of the orientation field and the alignment grid.
    pub block_size: usize,
    /// Window size used to sample x-signatures.
    pub window_size: usize,
    /// Segmentation threshold carried with the record for reporting.
    pub segmentation_threshold: f32,
}

impl Default for FingerprintParams {
    fn default() -> Self {
        Self {
            block_size: 16,
            window_size: 32,
            segmentation_threshold: 0.9,
        }
    }
}

/// Working record of one fingerprint.
#[derive(Clone, Debug, Default)]
pub struct Fingerprint {
    raw: Image,
    params: FingerprintParams,
    normalized: Option<Image>,
    orientations: Option<OrientationField>,
    frequencies: Option<FrequencyField>,
    region: Option<RegionMask>,
    enhanced: Option<Image>,
    binarized: Option<BinaryImage>,
    thinned: Option<BinaryImage>,
    minutiae: Option<Vec<Minutia>>,
}

macro_rules! stage_slot {
    ($get:ident, $set:ident, $field:ident, $ty:ty, $stage:literal) => {
        #[doc = concat!("Output of the `", $stage, "` stage.")]
        pub fn $get(&self) -> FpMorphResult<&$ty> {
            self.$field
                .as_ref()
                .ok_or(FpMorphError::StageNotRun { stage: $stage })
        }

        #[doc = concat!("Stores the output of the `", $stage, "` stage.")]
        pub fn $set(&mut self, value: $ty) -> &mut Self {
            self.$field = Some(value);
            self
        }
    };
}

impl Fingerprint {
    /// Creates a record from a raw image with the given block geometry.
    pub fn new(raw: Image, params: FingerprintParams) -> Self {
        Self {
            raw,
            params,
            ..Self::default()
        }
    }

    /// The raw image, resized by normalization and trimmed to the region.
    pub fn raw(&self) -> &Image {
        &self.raw
    }

    pub fn set_raw(&mut self, raw: Image) -> &mut Self {
        self.raw = raw;
        self
    }

    pub fn params(&self) -> FingerprintParams {
        self.params
    }

    pub fn block_size(&self) -> usize {
        self.params.block_size
    }

    pub fn window_size(&self) -> usize {
        self.params.window_size
    }

    stage_slot!(normalized, set_normalized, normalized, Image, "normalize");
    stage_slot!(
        orientations,
        set_orientations,
        orientations,
        OrientationField,
        "estimate_orientations"
    );
    stage_slot!(
        frequencies,
        set_frequencies,
        frequencies,
        FrequencyField,
        "estimate_frequencies"
    );
    stage_slot!(
        region_mask,
        set_region_mask,
        region,
        RegionMask,
        "estimate_frequencies"
    );
    stage_slot!(enhanced, set_enhanced, enhanced, Image, "enhance");
    stage_slot!(binarized, set_binarized, binarized, BinaryImage, "binarize");
    stage_slot!(thinned, set_thinned, thinned, BinaryImage, "thin");

    /// Output of the `extract_minutiae` stage.
    pub fn minutiae(&self) -> FpMorphResult<&[Minutia]> {
        self.minutiae
            .as_deref()
            .ok_or(FpMorphError::StageNotRun {
                stage: "extract_minutiae",
            })
    }

    pub fn set_minutiae(&mut self, minutiae: Vec<Minutia>) -> &mut Self {
        self.minutiae = Some(minutiae);
        self
    }

    /// Foreground blocks of the orientation field at this record's block size.
    pub fn foreground_blocks(&self) -> FpMorphResult<usize> {
        Ok(self.orientations()?.foreground_blocks(self.params.block_size))
    }

    /// Clears every derived field so the record can be reprocessed.
    pub fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.raw), self.params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Grid;

    #[test]
    fn unset_stage_reports_its_name() {
        let fp = Fingerprint::new(Grid::filled(8, 8, 0.5), FingerprintParams::default());
        assert_eq!(
            fp.orientations().unwrap_err(),
            FpMorphError::StageNotRun {
                stage: "estimate_orientations"
            }
        );
        assert!(fp.minutiae().is_err());
    }

    #[test]
    fn reset_keeps_raw_and_params() {
        let params = FingerprintParams {
            block_size: 12,
            ..FingerprintParams::default()
        };
        let mut fp = Fingerprint::new(Grid::filled(8, 8, 0.5), params);
        fp.set_normalized(Grid::filled(8, 8, 0.2));
        fp.set_minutiae(Vec::new());
        fp.reset();
        assert!(fp.normalized().is_err());
        assert!(fp.minutiae().is_err());
        assert_eq!(fp.raw().shape(), (8, 8));
        assert_eq!(fp.block_size(), 12);
    }
}
