//! Loading and saving fingerprints through the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::{Grid, Image, ImageView, RgbImage};
use crate::util::{FpMorphError, FpMorphResult};
use std::path::Path;

/// Converts a grayscale buffer into an image with samples in [0, 1].
pub fn image_from_gray(img: &image::GrayImage) -> FpMorphResult<Image> {
    let view = ImageView::from_slice(img.as_raw(), img.width() as usize, img.height() as usize)?;
    Ok(Grid::from_gray_view(view))
}

/// Converts any decoded image to grayscale and scales it to [0, 1].
pub fn image_from_dynamic(img: &image::DynamicImage) -> FpMorphResult<Image> {
    image_from_gray(&img.to_luma8())
}

/// Loads an image from disk as a grayscale fingerprint.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> FpMorphResult<Image> {
    let img = image::open(path).map_err(|err| FpMorphError::ImageIo {
        reason: err.to_string(),
    })?;
    image_from_dynamic(&img)
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Converts an image in [0, 1] into an 8-bit grayscale buffer.
pub fn gray_from_image(img: &Image) -> FpMorphResult<image::GrayImage> {
    let raw = img.data().iter().map(|&v| to_u8(v)).collect();
    image::GrayImage::from_raw(img.width() as u32, img.height() as u32, raw).ok_or(
        FpMorphError::InvalidDimensions {
            width: img.width(),
            height: img.height(),
        },
    )
}

/// Converts an RGB image in [0, 1] into an 8-bit RGB buffer.
pub fn rgb_from_image(img: &RgbImage) -> FpMorphResult<image::RgbImage> {
    let raw = img
        .data()
        .iter()
        .flat_map(|px| px.iter().map(|&v| to_u8(v)))
        .collect();
    image::RgbImage::from_raw(img.width() as u32, img.height() as u32, raw).ok_or(
        FpMorphError::InvalidDimensions {
            width: img.width(),
            height: img.height(),
        },
    )
}

fn check_not_empty(width: usize, height: usize) -> FpMorphResult<()> {
    if width == 0 || height == 0 {
        return Err(FpMorphError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// Writes a grayscale image; the format follows the file extension.
pub fn save_gray_image<P: AsRef<Path>>(img: &Image, path: P) -> FpMorphResult<()> {
    check_not_empty(img.width(), img.height())?;
    gray_from_image(img)?
        .save(path)
        .map_err(|err| FpMorphError::ImageIo {
            reason: err.to_string(),
        })
}

/// Writes an RGB image; the format follows the file extension.
pub fn save_rgb_image<P: AsRef<Path>>(img: &RgbImage, path: P) -> FpMorphResult<()> {
    check_not_empty(img.width(), img.height())?;
    rgb_from_image(img)?
        .save(path)
        .map_err(|err| FpMorphError::ImageIo {
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_conversion_scales_to_unit_range() {
        let buf = image::GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();
        let img = image_from_gray(&buf).unwrap();
        assert_eq!(img.data(), &[0.0, 1.0]);
        let back = gray_from_image(&img).unwrap();
        assert_eq!(back.as_raw(), &vec![0u8, 255u8]);
    }

    #[test]
    fn missing_file_is_an_image_io_error() {
        let err = load_gray_image("/nonexistent/fingerprint.png").unwrap_err();
        assert!(matches!(err, FpMorphError::ImageIo { .. }));
    }
}
