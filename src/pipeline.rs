//! Configuration values and the two processors composing the stages.
//!
//! [`FingerprintProcessor`] runs the single-fingerprint stages on a
//! [`Fingerprint`] record; [`MorphingProcessor`] prepares two records with it,
//! aligns one onto the other, extracts minutiae on both and blends a morph.

use std::f32::consts::PI;

use crate::fingerprint::{Fingerprint, FingerprintParams};
use crate::image::Image;
use crate::morphing::{
    align, estimate_cutline, generate_template, AlignConfig, AlignedFingerprint, Alignment,
    CutlineConfig, MorphedTemplate, TemplateConfig, TemplateKind,
};
use crate::processing::{
    self, EnhanceConfig, FakeFilterConfig, FrequencyConfig, MinutiaeConfig, NormalizeConfig,
    OrientationConfig,
};
use crate::trace::{trace_event, trace_span};
use crate::util::{FpMorphError, FpMorphResult};

/// Parameters of the single-fingerprint stages.
#[derive(Clone, Debug, Default)]
pub struct ProcessingConfig {
    pub fingerprint: FingerprintParams,
    pub normalize: NormalizeConfig,
    pub orientation: OrientationConfig,
    pub frequency: FrequencyConfig,
    pub enhance: EnhanceConfig,
    pub minutiae: MinutiaeConfig,
    pub fake_filter: FakeFilterConfig,
}

/// Parameters of the two-fingerprint stages.
#[derive(Clone, Debug, Default)]
pub struct MorphingConfig {
    pub align: AlignConfig,
    pub cutline: CutlineConfig,
    pub template: TemplateConfig,
    pub kind: TemplateKind,
}

/// Complete pipeline configuration.
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub processing: ProcessingConfig,
    pub morphing: MorphingConfig,
}

impl PipelineConfig {
    /// Setup of the batch research runs: 12 px blocks, interpolated 4 px
    /// frequency blocks, smoothed orientations and a fine cutline search.
    pub fn reference() -> Self {
        let block_size = 12;
        Self {
            processing: ProcessingConfig {
                fingerprint: FingerprintParams {
                    block_size,
                    window_size: 30,
                    segmentation_threshold: 0.003,
                },
                orientation: OrientationConfig {
                    block_size,
                    low_pass: true,
                },
                frequency: FrequencyConfig {
                    block_size: 4,
                    interpolate: true,
                    ..FrequencyConfig::default()
                },
                minutiae: MinutiaeConfig {
                    block_size,
                    ..MinutiaeConfig::default()
                },
                ..ProcessingConfig::default()
            },
            morphing: MorphingConfig {
                align: AlignConfig {
                    translation_step: block_size,
                    rotation_step: 9.0,
                    overlap_threshold: 0.7,
                    ..AlignConfig::default()
                },
                cutline: CutlineConfig {
                    rotation_step: PI / 60.0,
                    dmax: 30.0,
                    search_area: 64,
                    ..CutlineConfig::default()
                },
                template: TemplateConfig {
                    border: 16,
                    background: 255.0 / 255.0,
                },
                kind: TemplateKind::ImageLevel,
            },
        }
    }
}

/// Runs the single-fingerprint stages on a record.
#[derive(Clone, Debug, Default)]
pub struct FingerprintProcessor {
    cfg: ProcessingConfig,
}

impl FingerprintProcessor {
    pub fn new(cfg: ProcessingConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.cfg
    }

    /// Creates a record for `raw` with the configured block geometry.
    pub fn fingerprint(&self, raw: Image) -> Fingerprint {
        Fingerprint::new(raw, self.cfg.fingerprint)
    }

    /// Resamples the raw image and stores its normalized copy.
    pub fn normalize(&self, fp: &mut Fingerprint) -> FpMorphResult<()> {
        let out = processing::normalize(fp.raw(), &self.cfg.normalize)?;
        fp.set_raw(out.resized).set_normalized(out.normalized);
        Ok(())
    }

    pub fn estimate_orientations(&self, fp: &mut Fingerprint) -> FpMorphResult<()> {
        let field = processing::estimate_orientations(fp.normalized()?, &self.cfg.orientation)?;
        fp.set_orientations(field);
        Ok(())
    }

    /// Stores the frequency field and the region mask.
    pub fn estimate_frequencies(&self, fp: &mut Fingerprint) -> FpMorphResult<()> {
        let estimate = processing::estimate_frequencies(
            fp.normalized()?,
            fp.orientations()?,
            &self.cfg.frequency,
        )?;
        fp.set_frequencies(estimate.frequencies)
            .set_region_mask(estimate.region);
        Ok(())
    }

    pub fn apply_region_mask(&self, fp: &mut Fingerprint) -> FpMorphResult<()> {
        processing::apply_region_mask(fp)
    }

    /// Normalization through region trimming.
    pub fn prepare(&self, fp: &mut Fingerprint) -> FpMorphResult<()> {
        self.normalize(fp)?;
        self.estimate_orientations(fp)?;
        self.estimate_frequencies(fp)?;
        self.apply_region_mask(fp)
    }

    /// Gabor enhancement with the block size suggested by the region mask.
    pub fn enhance(&self, fp: &mut Fingerprint) -> FpMorphResult<()> {
        let block = fp.region_mask()?.ideal_enhance_block();
        let enhanced = processing::enhance(
            fp.normalized()?,
            fp.orientations()?,
            fp.frequencies()?,
            block,
            &self.cfg.enhance,
        )?;
        fp.set_enhanced(enhanced);
        Ok(())
    }

    pub fn binarize(&self, fp: &mut Fingerprint) -> FpMorphResult<()> {
        let binary = processing::binarize(fp.enhanced()?);
        fp.set_binarized(binary);
        Ok(())
    }

    pub fn thin(&self, fp: &mut Fingerprint) -> FpMorphResult<()> {
        let skeleton = processing::thin(fp.binarized()?);
        fp.set_thinned(skeleton);
        Ok(())
    }

    /// Extracts minutiae from the skeleton without filtering.
    pub fn extract_minutiae(&self, fp: &mut Fingerprint) -> FpMorphResult<()> {
        let minutiae =
            processing::extract_minutiae(fp.thinned()?, fp.orientations()?, &self.cfg.minutiae)?;
        fp.set_minutiae(minutiae);
        Ok(())
    }

    /// Flags and removes fake minutiae of an extracted list.
    pub fn filter_fake_minutiae(&self, fp: &mut Fingerprint) -> FpMorphResult<()> {
        let minutiae = fp.minutiae()?.to_vec();
        let kept = processing::filter_fake_minutiae(fp.thinned()?, minutiae, &self.cfg.fake_filter);
        fp.set_minutiae(kept);
        Ok(())
    }

    /// Enhancement through fake minutiae removal.
    pub fn find_minutiae(&self, fp: &mut Fingerprint) -> FpMorphResult<()> {
        self.enhance(fp)?;
        self.binarize(fp)?;
        self.thin(fp)?;
        self.extract_minutiae(fp)?;
        self.filter_fake_minutiae(fp)
    }

    /// Every single-fingerprint stage in order.
    pub fn process(&self, fp: &mut Fingerprint) -> FpMorphResult<()> {
        self.prepare(fp)?;
        self.find_minutiae(fp)
    }
}

/// Composes both processors into a morph of two fingerprints.
#[derive(Clone, Debug, Default)]
pub struct MorphingProcessor {
    processor: FingerprintProcessor,
    cfg: MorphingConfig,
}

impl MorphingProcessor {
    pub fn new(processor: FingerprintProcessor, cfg: MorphingConfig) -> Self {
        Self { processor, cfg }
    }

    /// Builds both processors from one pipeline configuration.
    pub fn from_config(cfg: PipelineConfig) -> Self {
        Self::new(FingerprintProcessor::new(cfg.processing), cfg.morphing)
    }

    pub fn processor(&self) -> &FingerprintProcessor {
        &self.processor
    }

    pub fn config(&self) -> &MorphingConfig {
        &self.cfg
    }

    /// Aligns `af` onto the prepared partner `f`.
    pub fn align(&self, af: &mut AlignedFingerprint, f: &Fingerprint) -> FpMorphResult<Alignment> {
        align(af, f, &self.cfg.align)
    }

    /// Morphs `af` into `partner`.
    ///
    /// Both records start from their raw images; on return they hold every
    /// derived field, `af` carries its alignment and cutline, and the morph
    /// of the configured kind is returned.
    ///
    /// A pair whose placed regions do not intersect, such as a blank print
    /// with no foreground, fails with [`FpMorphError::EmptyOverlap`] right
    /// after alignment; callers skip it.
    pub fn morph(
        &self,
        af: &mut AlignedFingerprint,
        partner: &mut Fingerprint,
    ) -> FpMorphResult<MorphedTemplate> {
        let _span = trace_span!(
            "morph",
            width = partner.raw().width(),
            height = partner.raw().height()
        )
        .entered();

        self.processor.prepare(partner)?;
        self.processor.prepare(af.fingerprint_mut())?;
        let alignment = self.align(af, partner)?;
        if af.layout(partner)?.overlap.is_empty() {
            trace_event!(
                "empty_overlap",
                dx = alignment.dx,
                dy = alignment.dy,
                angle = alignment.angle_deg
            );
            return Err(FpMorphError::EmptyOverlap);
        }
        self.processor.find_minutiae(af.fingerprint_mut())?;
        self.processor.find_minutiae(partner)?;

        let cutline = estimate_cutline(af, partner, &self.cfg.cutline)?;
        af.set_cutline(cutline);
        let morph = generate_template(af, partner, self.cfg.kind, &self.cfg.template)?;
        trace_event!(
            "morph",
            minutiae = morph.minutiae().len(),
            width = morph.shape().0,
            height = morph.shape().1
        );
        Ok(morph)
    }
}
