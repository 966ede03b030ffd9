//! fpmorph builds morphed fingerprints from two contact fingerprint images.
//!
//! Each image is normalized, segmented into a foreground region, described
//! by per-block orientation and ridge frequency fields, Gabor enhanced,
//! thinned, and reduced to a filtered list of minutiae. Two processed
//! fingerprints are then aligned, a cutline splitting their overlap is
//! searched, and a morph is blended from one identity on each side of it.
//!
//! Optional features: `rayon` parallelizes the alignment search, `tracing`
//! emits stage spans and events, `image-io` adds image loading, saving and
//! the debug renderings in [`render`].

pub mod export;
pub mod fingerprint;
pub mod image;
pub mod morphing;
pub mod pipeline;
pub mod processing;
#[cfg(feature = "image-io")]
pub mod render;
mod trace;
pub mod util;

pub use fingerprint::{
    Fingerprint, FingerprintParams, FrequencyField, Minutia, MinutiaKind, OrientationField,
    RegionMask,
};
pub use image::{BinaryImage, Grid, Image, ImageView, Point, Rect, RgbImage};
pub use morphing::{
    AlignConfig, AlignedFingerprint, Alignment, Cutline, CutlineConfig, MorphedTemplate,
    Separation, TemplateConfig, TemplateImage, TemplateKind,
};
pub use pipeline::{
    FingerprintProcessor, MorphingConfig, MorphingProcessor, PipelineConfig, ProcessingConfig,
};
pub use export::{MatchRecord, MinutiaTemplate, ReportWriter, TemplateMatcher};
pub use util::{FpMorphError, FpMorphResult};
