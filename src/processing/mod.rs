//! Single-fingerprint processing stages.
//!
//! Every stage is a free function of its inputs and an immutable config
//! value; the [`crate::pipeline::FingerprintProcessor`] threads them through
//! a [`crate::fingerprint::Fingerprint`] record.

pub mod enhance;
pub mod fake;
pub mod frequency;
pub mod minutiae;
pub mod normalize;
pub mod orientation;
pub mod region;
pub mod ridge;
pub mod thinning;

pub use enhance::{enhance, EnhanceConfig};
pub use fake::{filter_fake_minutiae, find_fake_minutiae, remove_fake_minutiae, FakeFilterConfig};
pub use frequency::{estimate_frequencies, FrequencyConfig, FrequencyEstimate};
pub use minutiae::{extract_minutiae, MinutiaeConfig};
pub use normalize::{normalize, NormalizeConfig, Normalized};
pub use orientation::{estimate_orientations, OrientationConfig};
pub use region::apply_region_mask;
pub use ridge::Probe;
pub use thinning::{binarize, thin};
