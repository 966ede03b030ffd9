//! JSON configuration of the command line tool.
//!
//! Every section mirrors a library config; omitted fields fall back to
//! [`PipelineConfig::reference`], the setup of the batch research runs.

use std::path::PathBuf;

use fpmorph::processing::{
    EnhanceConfig, FakeFilterConfig, FrequencyConfig, MinutiaeConfig, NormalizeConfig,
    OrientationConfig,
};
use fpmorph::{
    AlignConfig, CutlineConfig, FingerprintParams, MorphingConfig, PipelineConfig,
    ProcessingConfig, TemplateConfig, TemplateKind,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: ModeConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub matcher: Option<MatcherConfig>,
    pub fingerprint: FingerprintConfig,
    pub normalize: NormalizeSection,
    pub orientation: OrientationSection,
    pub frequency: FrequencySection,
    pub enhance: EnhanceSection,
    pub minutiae: MinutiaeSection,
    pub fake_filter: FakeFilterSection,
    pub align: AlignSection,
    pub cutline: CutlineSection,
    pub template: TemplateSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ModeConfig::Morph,
            input: InputConfig::default(),
            output: OutputConfig::default(),
            matcher: None,
            fingerprint: FingerprintConfig::default(),
            normalize: NormalizeSection::default(),
            orientation: OrientationSection::default(),
            frequency: FrequencySection::default(),
            enhance: EnhanceSection::default(),
            minutiae: MinutiaeSection::default(),
            fake_filter: FakeFilterSection::default(),
            align: AlignSection::default(),
            cutline: CutlineSection::default(),
            template: TemplateSection::default(),
        }
    }
}

impl Config {
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            processing: ProcessingConfig {
                fingerprint: self.fingerprint.clone().into(),
                normalize: self.normalize.clone().into(),
                orientation: self.orientation.clone().into(),
                frequency: self.frequency.clone().into(),
                enhance: self.enhance.clone().into(),
                minutiae: self.minutiae.clone().into(),
                fake_filter: self.fake_filter.clone().into(),
            },
            morphing: MorphingConfig {
                align: self.align.clone().into(),
                cutline: self.cutline.clone().into(),
                template: self.template.clone().into(),
                kind: self.template.kind.into(),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModeConfig {
    /// Runs the single-fingerprint stages on every input image.
    Process,
    /// Morphs a pair, or every image of a directory with its next neighbours.
    Morph,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// First fingerprint; in morph mode the partner of the pair.
    pub image: Option<PathBuf>,
    /// Second fingerprint of the pair, aligned onto `image`.
    pub other: Option<PathBuf>,
    /// Directory processed in batch when no single image is given.
    pub dir: Option<PathBuf>,
    /// In batch morphing, how many following images each image is paired with.
    pub neighbours: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            image: None,
            other: None,
            dir: None,
            neighbours: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Writes the stage and morph visualizations next to the templates.
    pub debug_images: bool,
    /// Match report appended to in `dir`.
    pub report: String,
    /// Also writes the minutiae in the synthetic generator's format.
    pub generator_templates: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("out"),
            debug_images: true,
            report: "match_results.txt".to_string(),
            generator_templates: false,
        }
    }
}

/// External program scoring two minutia templates.
#[derive(Debug, Deserialize)]
pub struct MatcherConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn reference() -> PipelineConfig {
    PipelineConfig::reference()
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    pub block_size: usize,
    pub window_size: usize,
    pub segmentation_threshold: f32,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        let p = reference().processing.fingerprint;
        Self {
            block_size: p.block_size,
            window_size: p.window_size,
            segmentation_threshold: p.segmentation_threshold,
        }
    }
}

impl From<FingerprintConfig> for FingerprintParams {
    fn from(cfg: FingerprintConfig) -> Self {
        Self {
            block_size: cfg.block_size,
            window_size: cfg.window_size,
            segmentation_threshold: cfg.segmentation_threshold,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NormalizeSection {
    pub scale: f32,
    pub blur_size: usize,
    /// Target mean intensity in 8-bit units.
    pub target_mean: f32,
}

impl Default for NormalizeSection {
    fn default() -> Self {
        let n = reference().processing.normalize;
        Self {
            scale: n.scale,
            blur_size: n.blur_size,
            target_mean: (n.target_mean * 255.0).round(),
        }
    }
}

impl From<NormalizeSection> for NormalizeConfig {
    fn from(cfg: NormalizeSection) -> Self {
        Self {
            scale: cfg.scale,
            blur_size: cfg.blur_size,
            target_mean: cfg.target_mean / 255.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OrientationSection {
    pub block_size: usize,
    pub low_pass: bool,
}

impl Default for OrientationSection {
    fn default() -> Self {
        let o = reference().processing.orientation;
        Self {
            block_size: o.block_size,
            low_pass: o.low_pass,
        }
    }
}

impl From<OrientationSection> for OrientationConfig {
    fn from(cfg: OrientationSection) -> Self {
        Self {
            block_size: cfg.block_size,
            low_pass: cfg.low_pass,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FrequencySection {
    pub block_size: usize,
    pub window_size: usize,
    pub interpolate: bool,
}

impl Default for FrequencySection {
    fn default() -> Self {
        let f = reference().processing.frequency;
        Self {
            block_size: f.block_size,
            window_size: f.window_size,
            interpolate: f.interpolate,
        }
    }
}

impl From<FrequencySection> for FrequencyConfig {
    fn from(cfg: FrequencySection) -> Self {
        Self {
            block_size: cfg.block_size,
            window_size: cfg.window_size,
            interpolate: cfg.interpolate,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EnhanceSection {
    pub deviation: f32,
}

impl Default for EnhanceSection {
    fn default() -> Self {
        Self {
            deviation: reference().processing.enhance.deviation,
        }
    }
}

impl From<EnhanceSection> for EnhanceConfig {
    fn from(cfg: EnhanceSection) -> Self {
        Self {
            deviation: cfg.deviation,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MinutiaeSection {
    pub block_size: usize,
    pub trace_threshold: f32,
    pub adaptive_default: f32,
    pub adaptive_bound: i32,
    pub own_line_steps: usize,
}

impl Default for MinutiaeSection {
    fn default() -> Self {
        let m = reference().processing.minutiae;
        Self {
            block_size: m.block_size,
            trace_threshold: m.trace_threshold,
            adaptive_default: m.adaptive_default,
            adaptive_bound: m.adaptive_bound,
            own_line_steps: m.own_line_steps,
        }
    }
}

impl From<MinutiaeSection> for MinutiaeConfig {
    fn from(cfg: MinutiaeSection) -> Self {
        Self {
            block_size: cfg.block_size,
            trace_threshold: cfg.trace_threshold,
            adaptive_default: cfg.adaptive_default,
            adaptive_bound: cfg.adaptive_bound,
            own_line_steps: cfg.own_line_steps,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FakeFilterSection {
    pub max_minutiae: usize,
}

impl Default for FakeFilterSection {
    fn default() -> Self {
        Self {
            max_minutiae: reference().processing.fake_filter.max_minutiae,
        }
    }
}

impl From<FakeFilterSection> for FakeFilterConfig {
    fn from(cfg: FakeFilterSection) -> Self {
        Self {
            max_minutiae: cfg.max_minutiae,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AlignSection {
    pub translation_step: usize,
    pub rotation_step_deg: f32,
    pub min_angle_deg: f32,
    pub max_angle_deg: f32,
    pub overlap_threshold: f32,
    pub parallel: bool,
}

impl Default for AlignSection {
    fn default() -> Self {
        let a = reference().morphing.align;
        Self {
            translation_step: a.translation_step,
            rotation_step_deg: a.rotation_step,
            min_angle_deg: a.min_angle_deg,
            max_angle_deg: a.max_angle_deg,
            overlap_threshold: a.overlap_threshold,
            parallel: true,
        }
    }
}

impl From<AlignSection> for AlignConfig {
    fn from(cfg: AlignSection) -> Self {
        Self {
            translation_step: cfg.translation_step,
            rotation_step: cfg.rotation_step_deg,
            min_angle_deg: cfg.min_angle_deg,
            max_angle_deg: cfg.max_angle_deg,
            overlap_threshold: cfg.overlap_threshold,
            parallel: cfg.parallel,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CutlineSection {
    pub rotation_step_deg: f32,
    pub dmax: f32,
    pub search_area: i32,
    pub orientation_weight: f32,
    pub frequency_weight: f32,
    pub minutiae_weight: f32,
    pub sigmoid_shift: f32,
    pub sigmoid_slope: f32,
    pub dynamic: bool,
    pub adaptive: bool,
}

impl Default for CutlineSection {
    fn default() -> Self {
        let c = reference().morphing.cutline;
        Self {
            rotation_step_deg: c.rotation_step.to_degrees(),
            dmax: c.dmax,
            search_area: c.search_area,
            orientation_weight: c.orientation_weight,
            frequency_weight: c.frequency_weight,
            minutiae_weight: c.minutiae_weight,
            sigmoid_shift: c.sigmoid_shift,
            sigmoid_slope: c.sigmoid_slope,
            dynamic: c.dynamic,
            adaptive: c.adaptive,
        }
    }
}

impl From<CutlineSection> for CutlineConfig {
    fn from(cfg: CutlineSection) -> Self {
        Self {
            rotation_step: cfg.rotation_step_deg.to_radians(),
            dmax: cfg.dmax,
            search_area: cfg.search_area,
            orientation_weight: cfg.orientation_weight,
            frequency_weight: cfg.frequency_weight,
            minutiae_weight: cfg.minutiae_weight,
            sigmoid_shift: cfg.sigmoid_shift,
            sigmoid_slope: cfg.sigmoid_slope,
            dynamic: cfg.dynamic,
            adaptive: cfg.adaptive,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKindConfig {
    ImageLevel,
    FeatureLevel,
    ImageLevelColored,
}

impl From<TemplateKindConfig> for TemplateKind {
    fn from(kind: TemplateKindConfig) -> Self {
        match kind {
            TemplateKindConfig::ImageLevel => TemplateKind::ImageLevel,
            TemplateKindConfig::FeatureLevel => TemplateKind::FeatureLevel,
            TemplateKindConfig::ImageLevelColored => TemplateKind::ImageLevelColored,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TemplateSection {
    pub kind: TemplateKindConfig,
    pub border: usize,
    /// Background intensity of the padding in 8-bit units.
    pub background: f32,
}

impl Default for TemplateSection {
    fn default() -> Self {
        let t = reference().morphing.template;
        Self {
            kind: TemplateKindConfig::ImageLevel,
            border: t.border,
            background: (t.background * 255.0).round(),
        }
    }
}

impl From<TemplateSection> for TemplateConfig {
    fn from(cfg: TemplateSection) -> Self {
        Self {
            border: cfg.border,
            background: cfg.background / 255.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_JSON: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

    #[test]
    fn empty_config_uses_the_reference_setup() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.mode, ModeConfig::Morph);
        assert!(config.matcher.is_none());
        let pipeline = config.pipeline();
        let reference = PipelineConfig::reference();
        assert_eq!(
            pipeline.processing.fingerprint.block_size,
            reference.processing.fingerprint.block_size
        );
        assert!((pipeline.processing.normalize.target_mean - 75.0 / 255.0).abs() < 1e-6);
        assert!(
            (pipeline.morphing.cutline.rotation_step - reference.morphing.cutline.rotation_step)
                .abs()
                < 1e-6
        );
        assert!((pipeline.morphing.template.background - 1.0).abs() < 1e-6);
    }

    #[test]
    fn example_config_parses() {
        let config: Config = serde_json::from_str(EXAMPLE_JSON).unwrap();
        assert_eq!(config.input.neighbours, 3);
        let matcher = config.matcher.as_ref().unwrap();
        assert_eq!(matcher.command, "mcc-match");
        let pipeline = config.pipeline();
        assert_eq!(pipeline.processing.frequency.block_size, 4);
        assert!(pipeline.morphing.align.parallel);
        assert!((pipeline.morphing.cutline.rotation_step - 3f32.to_radians()).abs() < 1e-6);
        assert_eq!(pipeline.morphing.kind, TemplateKind::ImageLevel);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let json = r#"{ "mode": "process", "cutline": { "dynamic": true }, "template": { "kind": "image_level_colored" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, ModeConfig::Process);
        let pipeline = config.pipeline();
        assert!(pipeline.morphing.cutline.dynamic);
        assert!((pipeline.morphing.cutline.dmax - 30.0).abs() < 1e-6);
        assert_eq!(pipeline.morphing.kind, TemplateKind::ImageLevelColored);
    }
}
