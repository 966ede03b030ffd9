//! Debug visualizations of the stages and the morph.
//!
//! Every function renders into an in-memory grid; the `save_*` helpers write
//! them through [`crate::image::io`]. Geometry is drawn with small
//! rasterizers on [`Grid`] so the overlays keep the pipeline's coordinates.

use std::path::Path;

use crate::fingerprint::{Fingerprint, Minutia, MinutiaKind, OrientationField};
use crate::image::io::{save_gray_image, save_rgb_image};
use crate::image::{Grid, Image, Point, Rect, RgbImage};
use crate::morphing::align::block_centers;
use crate::morphing::template::tint;
use crate::morphing::{AlignedFingerprint, Layout, MorphedTemplate, TemplateImage};
use crate::util::FpMorphResult;

/// Half size of the minutia markers.
const MARKER_SIZE: i64 = 5;
/// Length of the direction stroke.
const STROKE_LENGTH: f32 = 20.0;

const BLACK: [f32; 3] = [0.0, 0.0, 0.0];
const ENDING_COLOR: [f32; 3] = [1.0, 0.0, 0.0];
const BIFURCATION_COLOR: [f32; 3] = [0.0, 0.0, 1.0];
const SCORED_BLOCK_COLOR: [f32; 3] = [0.0, 120.0 / 255.0, 0.0];
const PARTNER_MINUTIA_COLOR: [f32; 3] = [120.0 / 255.0, 1.0, 0.0];
const ALIGNED_MINUTIA_COLOR: [f32; 3] = [0.0, 120.0 / 255.0, 1.0];

fn plot<T: Copy>(img: &mut Grid<T>, x: i64, y: i64, value: T) {
    if img.contains(x, y) {
        img[(x as usize, y as usize)] = value;
    }
}

/// Draws a segment by sampling it once per pixel of its longer axis.
fn draw_line<T: Copy>(img: &mut Grid<T>, from: (f32, f32), to: (f32, f32), value: T) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let x = (from.0 + t * dx).round() as i64;
        let y = (from.1 + t * dy).round() as i64;
        plot(img, x, y, value);
    }
}

/// Outline of the square spanning `[x0, x1] x [y0, y1]`.
fn draw_square<T: Copy>(img: &mut Grid<T>, (x0, y0): (i64, i64), (x1, y1): (i64, i64), value: T) {
    for x in x0..=x1 {
        plot(img, x, y0, value);
        plot(img, x, y1, value);
    }
    for y in y0..=y1 {
        plot(img, x0, y, value);
        plot(img, x1, y, value);
    }
}

fn draw_circle<T: Copy>(img: &mut Grid<T>, center: Point, radius: i64, value: T) {
    let steps = (8 * radius).max(8);
    for i in 0..steps {
        let angle = i as f32 / steps as f32 * std::f32::consts::TAU;
        let x = center.x as i64 + (radius as f32 * angle.cos()).round() as i64;
        let y = center.y as i64 + (radius as f32 * angle.sin()).round() as i64;
        plot(img, x, y, value);
    }
}

fn to_rgb(img: &Image) -> RgbImage {
    img.map(|v| [v, v, v])
}

/// Normalized image with background blocks painted white.
pub fn masked_normalized(fp: &Fingerprint) -> FpMorphResult<Image> {
    let normalized = fp.normalized()?;
    let mask = fp.region_mask()?.mask();
    if mask.shape() != normalized.shape() {
        return Ok(normalized.clone());
    }
    Ok(Grid::from_fn(normalized.width(), normalized.height(), |x, y| {
        if mask[(x, y)] > 0.0 {
            normalized[(x, y)]
        } else {
            1.0
        }
    }))
}

/// One ridge-direction stroke per block over `base`, or over black when
/// `base` is `None`. Invalid blocks are filled black.
pub fn orientation_overlay(field: &OrientationField, base: Option<&Image>) -> Image {
    let (width, height) = field.shape();
    let mut out = match base {
        Some(img) if img.shape() == field.shape() => img.clone(),
        _ => Grid::filled(width, height, 0.0),
    };
    let bs = field.block_size();
    let half = (bs / 2) as f32;
    for (cx, cy) in block_centers(Rect::new(0, 0, width, height), bs) {
        let (x, y) = (cx as i64, cy as i64);
        let Some(angle) = field.angle(x, y).filter(|_| field.is_valid(x, y)) else {
            let x0 = cx.saturating_sub(bs / 2);
            let y0 = cy.saturating_sub(bs / 2);
            out.fill_rect(Rect::new(x0, y0, bs, bs), 0.0);
            continue;
        };
        let (sin, cos) = (angle - std::f32::consts::FRAC_PI_2).sin_cos();
        let (fx, fy) = (cx as f32, cy as f32);
        draw_line(
            &mut out,
            (fx + half * cos, fy + half * sin),
            (fx - half * cos, fy - half * sin),
            1.0,
        );
    }
    out
}

/// Draws minutiae shifted by `offset`: endings as circles, bifurcations as
/// squares, each with a stroke along its direction. Fake minutiae are
/// skipped.
pub fn draw_minutiae(
    img: &mut RgbImage,
    minutiae: &[Minutia],
    offset: Point,
    color: impl Fn(MinutiaKind) -> [f32; 3],
) {
    for m in minutiae.iter().filter(|m| !m.fake) {
        let pos = m.position + offset;
        let value = color(m.kind);
        match m.kind {
            MinutiaKind::Ending => draw_circle(img, pos, MARKER_SIZE, value),
            MinutiaKind::Bifurcation => {
                let (x, y) = (pos.x as i64, pos.y as i64);
                draw_square(
                    img,
                    (x - MARKER_SIZE, y - MARKER_SIZE),
                    (x + MARKER_SIZE, y + MARKER_SIZE),
                    value,
                );
            }
        }
        let (fx, fy) = (pos.x as f32, pos.y as f32);
        let (sin, cos) = m.direction.sin_cos();
        draw_line(
            img,
            (fx, fy),
            (fx + STROKE_LENGTH * cos, fy + STROKE_LENGTH * sin),
            value,
        );
    }
}

/// Minutiae of a processed fingerprint over its normalized image.
pub fn minutiae_overlay(fp: &Fingerprint) -> FpMorphResult<RgbImage> {
    let mut out = to_rgb(fp.normalized()?);
    draw_minutiae(&mut out, fp.minutiae()?, Point::new(0, 0), |kind| match kind {
        MinutiaKind::Ending => ENDING_COLOR,
        MinutiaKind::Bifurcation => BIFURCATION_COLOR,
    });
    Ok(out)
}

/// Places both images into the union canvas, white where absent.
fn union_images(af: &AlignedFingerprint, partner: &Fingerprint) -> FpMorphResult<(Layout, Image, Image)> {
    let layout = af.layout(partner)?;
    let (width, height) = layout.union;
    let place = |img: &Image, origin: Point| {
        let mut canvas = Grid::filled(width, height, 1.0f32);
        for y in 0..img.height() {
            for x in 0..img.width() {
                plot(
                    &mut canvas,
                    origin.x as i64 + x as i64,
                    origin.y as i64 + y as i64,
                    img[(x, y)],
                );
            }
        }
        canvas
    };
    let partner_img = place(partner.raw(), layout.partner);
    let aligned_img = place(af.aligned()?, layout.aligned);
    Ok((layout, partner_img, aligned_img))
}

/// Overlap blocks whose center is valid in both orientation fields.
fn common_blocks(
    af: &AlignedFingerprint,
    partner: &Fingerprint,
    layout: &Layout,
) -> FpMorphResult<Vec<(usize, usize)>> {
    let o = partner.orientations()?;
    let oa = af.fingerprint().orientations()?;
    let bs = partner.block_size();
    Ok(block_centers(layout.overlap, bs)
        .into_iter()
        .filter(|&(x, y)| {
            let (x, y) = (x as i64, y as i64);
            oa.validity_at(x - layout.aligned.x as i64, y - layout.aligned.y as i64) > 0.0
                && o.validity_at(x - layout.partner.x as i64, y - layout.partner.y as i64) > 0.0
        })
        .collect())
}

fn outline_block(img: &mut RgbImage, (cx, cy): (usize, usize), bs: usize, value: [f32; 3]) {
    let half = (bs / 2) as i64;
    let (x, y) = (cx as i64, cy as i64);
    draw_square(img, (x - half, y - half), (x + half, y + half), value);
}

/// Both fingerprints in the union canvas, the partner tinted green and the
/// aligned one blue, mixed half and half. Blocks valid in both are outlined.
pub fn aligned_overlay(af: &AlignedFingerprint, partner: &Fingerprint) -> FpMorphResult<RgbImage> {
    let (layout, partner_img, aligned_img) = union_images(af, partner)?;
    let (width, height) = layout.union;
    let mut out = Grid::from_fn(width, height, |x, y| {
        let p = tint(partner_img[(x, y)], true);
        let a = tint(aligned_img[(x, y)], false);
        [
            0.5 * p[0] + 0.5 * a[0],
            0.5 * p[1] + 0.5 * a[1],
            0.5 * p[2] + 0.5 * a[2],
        ]
    });
    for center in common_blocks(af, partner, &layout)? {
        outline_block(&mut out, center, partner.block_size(), BLACK);
    }
    Ok(out)
}

/// Gray union blend with the cutline, the blocks within `dmax` of it that
/// were scored, and the minutiae of both partitions.
pub fn cutline_overlay(af: &AlignedFingerprint, partner: &Fingerprint) -> FpMorphResult<RgbImage> {
    let cutline = af.cutline()?;
    let (layout, partner_img, aligned_img) = union_images(af, partner)?;
    let (width, height) = layout.union;
    let mut out = Grid::from_fn(width, height, |x, y| {
        let v = 0.5 * partner_img[(x, y)] + 0.5 * aligned_img[(x, y)];
        [v, v, v]
    });

    for center in common_blocks(af, partner, &layout)? {
        if cutline.line.distance(center.0 as f32, center.1 as f32) <= cutline.dmax {
            outline_block(&mut out, center, partner.block_size(), SCORED_BLOCK_COLOR);
        }
    }

    let line = cutline.line;
    let (w, h) = (width as f32, height as f32);
    let ends = if line.b.abs() < 0.01 {
        let x = -line.c / line.a;
        ((x, 0.0), (x, h))
    } else {
        ((0.0, -line.c / line.b), (w, (-line.a * w - line.c) / line.b))
    };
    draw_line(&mut out, ends.0, ends.1, BLACK);

    let origin = layout.overlap.origin();
    for list in [&cutline.partner.positive, &cutline.partner.negative] {
        draw_minutiae(&mut out, list, origin, |_| PARTNER_MINUTIA_COLOR);
    }
    for list in [&cutline.aligned.positive, &cutline.aligned.negative] {
        draw_minutiae(&mut out, list, origin, |_| ALIGNED_MINUTIA_COLOR);
    }
    Ok(out)
}

/// Morph pixels as RGB with its minutiae drawn on top.
pub fn morph_overlay(morph: &MorphedTemplate) -> RgbImage {
    let mut out = match morph.image() {
        TemplateImage::Gray(img) => to_rgb(img),
        TemplateImage::Colored(img) => img.clone(),
    };
    draw_minutiae(&mut out, morph.minutiae(), Point::new(0, 0), |kind| match kind {
        MinutiaKind::Ending => ENDING_COLOR,
        MinutiaKind::Bifurcation => BIFURCATION_COLOR,
    });
    out
}

/// Writes the morph pixels; the format follows the file extension.
pub fn save_morph(morph: &MorphedTemplate, path: impl AsRef<Path>) -> FpMorphResult<()> {
    match morph.image() {
        TemplateImage::Gray(img) => save_gray_image(img, path),
        TemplateImage::Colored(img) => save_rgb_image(img, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphing::align::uniform_field;

    #[test]
    fn lines_cover_both_endpoints() {
        let mut img = Grid::filled(10, 10, 0u8);
        draw_line(&mut img, (1.0, 1.0), (8.0, 4.0), 1);
        assert_eq!(img[(1, 1)], 1);
        assert_eq!(img[(8, 4)], 1);
        assert_eq!(img.data().iter().filter(|&&v| v == 1).count(), 8);
    }

    #[test]
    fn shapes_clip_at_the_border() {
        let mut img = Grid::filled(6, 6, 0u8);
        draw_square(&mut img, (-2, -2), (2, 2), 1);
        draw_circle(&mut img, Point::new(5, 5), 3, 1);
        assert_eq!(img[(2, 0)], 1);
        assert_eq!(img[(0, 2)], 1);
        assert_eq!(img[(1, 1)], 0);
        assert_eq!(img[(5, 2)], 1);
    }

    #[test]
    fn invalid_blocks_are_black_and_valid_blocks_get_strokes() {
        let field = uniform_field(32, 16, 0.0, 16, |x, _| x < 16);
        let base = Grid::filled(32, 16, 0.5f32);
        let out = orientation_overlay(&field, Some(&base));
        assert!((16..32).all(|x| out[(x, 3)] == 0.0));
        // Angle 0 ridges run vertically through the block center.
        assert_eq!(out[(8, 2)], 1.0);
        assert_eq!(out[(2, 8)], 0.5);
    }

    #[test]
    fn minutiae_markers_follow_their_kind() {
        let mut img = Grid::filled(40, 40, [1.0f32; 3]);
        let list = [
            Minutia::new(Point::new(10, 10), 0.0, 7.0, MinutiaKind::Ending),
            Minutia::new(Point::new(30, 30), 0.0, 7.0, MinutiaKind::Bifurcation),
        ];
        draw_minutiae(&mut img, &list, Point::new(0, 0), |kind| match kind {
            MinutiaKind::Ending => ENDING_COLOR,
            MinutiaKind::Bifurcation => BIFURCATION_COLOR,
        });
        assert_eq!(img[(10, 5)], ENDING_COLOR);
        assert_eq!(img[(25, 25)], BIFURCATION_COLOR);
        assert_eq!(img[(25, 30)], BIFURCATION_COLOR);
        assert_eq!(img[(20, 10)], ENDING_COLOR);
    }
}
