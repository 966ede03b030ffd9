//! Two-fingerprint stages: alignment, cutline search and template blending.
//!
//! The partner fingerprint stays in place while the aligned one is rotated
//! and shifted onto it. Both are laid out in a shared union canvas; the
//! cutline lives in that canvas and the morph covers their overlap.

pub mod align;
pub mod angles;
pub mod cutline;
pub mod template;

pub use align::{align, overlap_box, AlignConfig, AlignedFingerprint, Alignment, Layout};
pub use angles::AngleGrid;
pub use cutline::{estimate_cutline, evaluate_line, Cutline, CutlineConfig, Line, Partition, Separation};
pub use template::{generate_template, MorphedTemplate, TemplateConfig, TemplateImage, TemplateKind};
