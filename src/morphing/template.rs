//! Morphed template generation across a cutline.
//!
//! Every pixel of the overlap box where both fingerprints are foreground is
//! taken from the side of the cutline it lies on, blended with the other
//! side inside the `dmax` band. Pixels near the edge of the joint foreground
//! fade toward the background value.

use std::f32::consts::FRAC_PI_4;

use crate::fingerprint::{Fingerprint, FingerprintParams, Minutia};
use crate::image::{Grid, Image, Point, Rect, RgbImage};
use crate::morphing::align::AlignedFingerprint;
use crate::morphing::cutline::{Line, Separation};
use crate::trace::{trace_event, trace_span};
use crate::util::{FpMorphError, FpMorphResult};

const AXIS_SHIFTS: [(f32, f32); 4] = [(0.0, 1.0), (-1.0, 0.0), (0.0, -1.0), (1.0, 0.0)];
const DIAGONAL_SHIFTS: [(f32, f32); 4] = [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)];
/// Channel gain marking a fingerprint in colored templates.
const TINT_GAIN: f32 = 1.7;

/// Template generation parameters.
#[derive(Clone, Debug)]
pub struct TemplateConfig {
    /// Width of the faded band along the joint foreground edge, pixels.
    pub border: usize,
    /// Value written outside the joint foreground.
    pub background: f32,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            border: 16,
            background: 1.0,
        }
    }
}

/// Kind of morphed template to produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TemplateKind {
    /// Single channel image blend.
    #[default]
    ImageLevel,
    /// Minutiae-only synthesis; declared for completeness, not produced.
    FeatureLevel,
    /// Tinted RGB blend for inspection.
    ImageLevelColored,
}

impl TemplateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::ImageLevel => "image-level",
            TemplateKind::FeatureLevel => "feature-level",
            TemplateKind::ImageLevelColored => "image-level-colored",
        }
    }
}

/// Pixels of a morphed template.
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateImage {
    Gray(Image),
    Colored(RgbImage),
}

/// A morph: the blended image plus the merged minutiae of both sides.
///
/// Minutiae positions are relative to the template's top-left corner.
#[derive(Clone, Debug, PartialEq)]
pub struct MorphedTemplate {
    image: TemplateImage,
    minutiae: Vec<Minutia>,
    separation: Separation,
}

impl MorphedTemplate {
    pub fn image(&self) -> &TemplateImage {
        &self.image
    }

    /// Single channel image, `None` for colored templates.
    pub fn gray(&self) -> Option<&Image> {
        match &self.image {
            TemplateImage::Gray(img) => Some(img),
            TemplateImage::Colored(_) => None,
        }
    }

    /// RGB image, `None` for single channel templates.
    pub fn colored(&self) -> Option<&RgbImage> {
        match &self.image {
            TemplateImage::Colored(img) => Some(img),
            TemplateImage::Gray(_) => None,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        match &self.image {
            TemplateImage::Gray(img) => img.shape(),
            TemplateImage::Colored(img) => img.shape(),
        }
    }

    pub fn minutiae(&self) -> &[Minutia] {
        &self.minutiae
    }

    pub fn separation(&self) -> Separation {
        self.separation
    }

    /// Wraps a single channel template in a fingerprint record carrying its minutiae.
    pub fn to_fingerprint(&self, params: FingerprintParams) -> Option<Fingerprint> {
        let img = self.gray()?;
        let mut fp = Fingerprint::new(img.clone(), params);
        fp.set_minutiae(self.minutiae.clone());
        Some(fp)
    }
}

/// One fingerprint placed in union coordinates.
#[derive(Clone, Copy)]
struct Side<'a> {
    image: &'a Image,
    region: &'a Image,
    origin: Point,
}

impl Side<'_> {
    fn local(&self, x: usize, y: usize) -> (i64, i64) {
        (x as i64 - self.origin.x as i64, y as i64 - self.origin.y as i64)
    }

    fn region_at(&self, (x, y): (i64, i64)) -> f32 {
        self.region.get_signed(x, y).unwrap_or(0.0)
    }

    fn pixel(&self, (x, y): (i64, i64), background: f32) -> f32 {
        self.image.get_signed(x, y).unwrap_or(background)
    }
}

/// Clamps a probe into the region grid; positions are truncated first.
fn clamp_probe(region: &Image, x: f32, y: f32) -> (i64, i64) {
    let max_x = region.width().saturating_sub(1) as i64;
    let max_y = region.height().saturating_sub(1) as i64;
    ((x as i64).clamp(0, max_x), (y as i64).clamp(0, max_y))
}

/// Largest number of steps a probe had to retreat from `border` toward the
/// pixel before it landed inside the joint foreground, or `None` when every
/// probe started inside.
fn border_distance(
    own: Side<'_>,
    own_pos: (i64, i64),
    other: Side<'_>,
    other_pos: (i64, i64),
    border: usize,
) -> Option<usize> {
    let outside = |dist: i64, (sx, sy): (f32, f32), factor: f32| {
        let step = dist as f32 * factor;
        let p1 = clamp_probe(own.region, own_pos.0 as f32 + sx * step, own_pos.1 as f32 + sy * step);
        let p2 = clamp_probe(
            other.region,
            other_pos.0 as f32 + sx * step,
            other_pos.1 as f32 + sy * step,
        );
        own.region_at(p1) <= 0.0 || other.region_at(p2) <= 0.0
    };

    let probes = AXIS_SHIFTS
        .iter()
        .map(|&s| (s, 1.0))
        .chain(DIAGONAL_SHIFTS.iter().map(|&s| (s, FRAC_PI_4.cos())));
    let mut distance: Option<usize> = None;
    for (shift, factor) in probes {
        let mut dist = border as i64;
        if !outside(dist, shift, factor) {
            continue;
        }
        let mut length = 0usize;
        while outside(dist, shift, factor) {
            length += 1;
            dist -= 1;
            if dist < 0 {
                break;
            }
        }
        if dist < 0 {
            continue;
        }
        distance = Some(distance.map_or(length, |d| d.max(length)));
    }
    distance
}

/// Pixel of `own` faded toward the background near the joint foreground edge.
fn smoothed_pixel(
    own: Side<'_>,
    own_pos: (i64, i64),
    other: Side<'_>,
    other_pos: (i64, i64),
    cfg: &TemplateConfig,
) -> f32 {
    let value = own.pixel(own_pos, cfg.background);
    if cfg.border == 0 || own.region_at(own_pos) == 0.0 || other.region_at(other_pos) == 0.0 {
        return value;
    }
    match border_distance(own, own_pos, other, other_pos, cfg.border) {
        Some(distance) => {
            let border = cfg.border as f32;
            let w = ((border - distance as f32) / border).max(0.0);
            w * value + (1.0 - w) * cfg.background
        }
        None => value,
    }
}

/// Weight of the positive side at distance `d` from the line.
fn positive_weight(positive: bool, dmax: f32, d: f32) -> f32 {
    let w = ((dmax - d) / (2.0 * dmax)).max(0.0);
    if positive {
        1.0 - w
    } else {
        w
    }
}

fn blend_gray(
    positive: Side<'_>,
    negative: Side<'_>,
    line: &Line,
    dmax: f32,
    overlap: Rect,
    cfg: &TemplateConfig,
) -> Image {
    let mut out = Grid::filled(overlap.width, overlap.height, cfg.background);
    for y in overlap.y..overlap.bottom() {
        for x in overlap.x..overlap.right() {
            let pp = positive.local(x, y);
            let np = negative.local(x, y);
            if positive.region_at(pp) <= 0.0 || negative.region_at(np) <= 0.0 {
                continue;
            }
            let (fx, fy) = (x as f32, y as f32);
            let d = line.distance(fx, fy);
            let on_positive = line.is_positive(fx, fy);
            let in_band = dmax > 0.0 && d <= dmax;
            let value = if in_band {
                let p = smoothed_pixel(positive, pp, negative, np, cfg);
                let n = smoothed_pixel(negative, np, positive, pp, cfg);
                let w = positive_weight(on_positive, dmax, d);
                w * p + (1.0 - w) * n
            } else if on_positive {
                smoothed_pixel(positive, pp, negative, np, cfg)
            } else {
                smoothed_pixel(negative, np, positive, pp, cfg)
            };
            out.data_mut()[(y - overlap.y) * overlap.width + (x - overlap.x)] = value;
        }
    }
    out
}

/// Tints a gray value: green gain for the partner, blue for the aligned one.
pub(crate) fn tint(value: f32, partner: bool) -> [f32; 3] {
    let boosted = (value * TINT_GAIN).min(1.0);
    if partner {
        [value, boosted, value]
    } else {
        [value, value, boosted]
    }
}

fn blend_colored(
    positive: (Side<'_>, bool),
    negative: (Side<'_>, bool),
    line: &Line,
    dmax: f32,
    overlap: Rect,
) -> RgbImage {
    let (positive, positive_is_partner) = positive;
    let (negative, negative_is_partner) = negative;
    let mut out = Grid::filled(overlap.width, overlap.height, [1.0f32; 3]);
    for y in overlap.y..overlap.bottom() {
        for x in overlap.x..overlap.right() {
            let pp = positive.local(x, y);
            let np = negative.local(x, y);
            if positive.region_at(pp) <= 0.0 || negative.region_at(np) <= 0.0 {
                continue;
            }
            let (fx, fy) = (x as f32, y as f32);
            let d = line.distance(fx, fy);
            let on_positive = line.is_positive(fx, fy);
            let p = tint(positive.pixel(pp, 1.0), positive_is_partner);
            let n = tint(negative.pixel(np, 1.0), negative_is_partner);
            let value = if dmax > 0.0 && d <= dmax {
                let w = positive_weight(on_positive, dmax, d);
                [
                    w * p[0] + (1.0 - w) * n[0],
                    w * p[1] + (1.0 - w) * n[1],
                    w * p[2] + (1.0 - w) * n[2],
                ]
            } else if on_positive {
                p
            } else {
                n
            };
            out.data_mut()[(y - overlap.y) * overlap.width + (x - overlap.x)] = value;
        }
    }
    out
}

/// Generates a morphed template of `kind` from an aligned pair with a cutline.
///
/// The separation decides which identity fills the positive side; an
/// unknown separation and the feature-level kind are errors.
pub fn generate_template(
    af: &AlignedFingerprint,
    partner: &Fingerprint,
    kind: TemplateKind,
    cfg: &TemplateConfig,
) -> FpMorphResult<MorphedTemplate> {
    if kind == TemplateKind::FeatureLevel {
        return Err(FpMorphError::UnsupportedTemplateKind {
            kind: kind.as_str(),
        });
    }
    let cutline = af.cutline()?;
    let layout = af.layout(partner)?;
    let overlap = layout.overlap;
    let _span = trace_span!(
        "generate_template",
        kind = kind.as_str(),
        width = overlap.width,
        height = overlap.height
    )
    .entered();

    let partner_side = Side {
        image: partner.raw(),
        region: partner.region_mask()?.mask(),
        origin: layout.partner,
    };
    let aligned_side = Side {
        image: af.aligned()?,
        region: af.fingerprint().region_mask()?.mask(),
        origin: layout.aligned,
    };

    let (positive, negative, positive_is_partner, minutiae) = match cutline.separation {
        Separation::PosNeg => (
            partner_side,
            aligned_side,
            true,
            [&cutline.partner.positive[..], &cutline.aligned.negative[..]].concat(),
        ),
        Separation::NegPos => (
            aligned_side,
            partner_side,
            false,
            [&cutline.aligned.positive[..], &cutline.partner.negative[..]].concat(),
        ),
        Separation::Unknown => return Err(FpMorphError::UnknownSeparation),
    };

    let image = match kind {
        TemplateKind::ImageLevelColored => TemplateImage::Colored(blend_colored(
            (positive, positive_is_partner),
            (negative, !positive_is_partner),
            &cutline.line,
            cutline.dmax,
            overlap,
        )),
        _ => TemplateImage::Gray(blend_gray(
            positive,
            negative,
            &cutline.line,
            cutline.dmax,
            overlap,
            cfg,
        )),
    };
    trace_event!("template", minutiae = minutiae.len(), separation = cutline.separation.as_str());
    Ok(MorphedTemplate {
        image,
        minutiae,
        separation: cutline.separation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side<'a>(image: &'a Image, region: &'a Image) -> Side<'a> {
        Side {
            image,
            region,
            origin: Point::new(0, 0),
        }
    }

    #[test]
    fn interior_pixels_are_not_faded() {
        let image = Grid::filled(64, 64, 0.25f32);
        let region = Grid::filled(64, 64, 1.0f32);
        let s = side(&image, &region);
        let cfg = TemplateConfig::default();
        // Probes clamp into the field, so a fully valid pair never fades.
        assert_eq!(smoothed_pixel(s, (2, 2), s, (2, 2), &cfg), 0.25);
        assert_eq!(smoothed_pixel(s, (32, 32), s, (32, 32), &cfg), 0.25);
    }

    #[test]
    fn pixels_near_the_region_edge_fade_to_background() {
        let image = Grid::filled(64, 64, 0.0f32);
        let region = Grid::from_fn(64, 64, |x, _| if x < 40 { 1.0 } else { 0.0 });
        let s = side(&image, &region);
        let cfg = TemplateConfig::default();
        // 4 px from the edge: probe at x = 52 retreats to x = 39, 13 steps.
        let near = smoothed_pixel(s, (36, 32), s, (36, 32), &cfg);
        assert!((near - 13.0 / 16.0).abs() < 1e-6, "{near}");
        let far = smoothed_pixel(s, (10, 32), s, (10, 32), &cfg);
        assert_eq!(far, 0.0);
    }

    #[test]
    fn positive_weight_reaches_half_on_the_line() {
        assert!((positive_weight(true, 30.0, 0.0) - 0.5).abs() < 1e-6);
        assert!((positive_weight(false, 30.0, 0.0) - 0.5).abs() < 1e-6);
        assert_eq!(positive_weight(true, 30.0, 30.0), 1.0);
        assert_eq!(positive_weight(false, 30.0, 45.0), 0.0);
    }

    #[test]
    fn tint_saturates_the_marked_channel() {
        assert_eq!(tint(0.8, true), [0.8, 1.0, 0.8]);
        assert_eq!(tint(0.5, false), [0.5, 0.5, 0.85]);
    }
}
