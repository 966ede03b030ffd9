//! Error types for fpmorph.

use thiserror::Error;

/// Result alias for fpmorph operations.
pub type Result<T> = std::result::Result<T, FpMorphError>;

/// Errors that can occur while processing or morphing fingerprints.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum FpMorphError {
    /// Image dimensions are invalid or overflow.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// The backing buffer does not hold enough samples.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// The stride is smaller than the row width.
    #[error("invalid stride: width {width}, stride {stride}")]
    InvalidStride { width: usize, stride: usize },
    /// A region of interest does not fit inside the image.
    #[error(
        "roi out of bounds: ({x}, {y}) {width}x{height} in {img_width}x{img_height} image"
    )]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    },
    /// Two grids that must share a shape do not.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
    /// Angle grid parameters are invalid.
    #[error("invalid angle grid: {reason}")]
    InvalidAngleGrid { reason: &'static str },
    /// A filter kernel needs an odd size so it has a center sample.
    #[error("kernel size must be odd, got {size}")]
    EvenKernelSize { size: usize },
    /// A configuration value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    /// The aligned fingerprints share no foreground area to morph.
    #[error("aligned fingerprints do not overlap")]
    EmptyOverlap,
    /// The cutline search did not settle on a separation side.
    #[error("cutline separation is unknown")]
    UnknownSeparation,
    /// The requested template kind is not produced by the generator.
    #[error("unsupported template kind: {kind}")]
    UnsupportedTemplateKind { kind: &'static str },
    /// A derived field was read before the stage producing it ran.
    #[error("stage `{stage}` has not run")]
    StageNotRun { stage: &'static str },
    /// A minutia record could not be parsed.
    #[error("malformed minutia record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },
    /// The external matcher failed or returned garbage.
    #[error("matcher failed: {reason}")]
    Matcher { reason: String },
    /// Reading or writing a file failed.
    #[error("io error: {reason}")]
    Io { reason: String },
    /// Image decoding or encoding failed.
    #[cfg(feature = "image-io")]
    #[error("image io error: {reason}")]
    ImageIo { reason: String },
}

impl From<std::io::Error> for FpMorphError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}
