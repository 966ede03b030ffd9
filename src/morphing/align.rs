//! Rotation and translation search aligning one fingerprint onto another.
//!
//! The aligned fingerprint's orientation field is rotated over a discrete
//! angle grid; for each rotation a block-stepped translation grid is scanned
//! and every placement is scored by validity-weighted orientation agreement
//! over the overlapping blocks. The winning rotation is then applied to the
//! remaining working data of the aligned fingerprint.

use std::f32::consts::PI;

use crate::fingerprint::{Fingerprint, OrientationField};
use crate::image::rotate::Rotation;
use crate::image::{Image, Point, Rect};
use crate::morphing::angles::AngleGrid;
use crate::morphing::cutline::Cutline;
use crate::trace::{trace_detail, trace_event, trace_span};
use crate::util::math::wrap_half_turn;
use crate::util::{FpMorphError, FpMorphResult};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Alignment search parameters.
#[derive(Clone, Debug)]
pub struct AlignConfig {
    /// Translation grid step in pixels.
    pub translation_step: usize,
    /// Rotation step in degrees.
    pub rotation_step: f32,
    /// First rotation of the search, degrees.
    pub min_angle_deg: f32,
    /// Last rotation of the search (inclusive), degrees.
    pub max_angle_deg: f32,
    /// Minimum overlap as a fraction of the smaller fingerprint's foreground blocks.
    ///
    /// Overlap is the number of block centers inside the intersection of both
    /// fields, the same grid the similarity is summed over. Small prints need
    /// a threshold leaving room for their true offset: at 64x64 with 8 px
    /// blocks a one-block diagonal offset keeps 49 of 64 blocks.
    pub overlap_threshold: f32,
    /// Evaluates rotations in parallel when the `rayon` feature is enabled.
    pub parallel: bool,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            translation_step: 12,
            rotation_step: 9.0,
            min_angle_deg: -90.0,
            max_angle_deg: 90.0,
            overlap_threshold: 0.6,
            parallel: false,
        }
    }
}

/// Placement of the aligned fingerprint relative to its partner.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Alignment {
    /// Horizontal offset of the aligned fingerprint from the partner.
    pub dx: i32,
    /// Vertical offset of the aligned fingerprint from the partner.
    pub dy: i32,
    /// Rotation applied to the aligned fingerprint, degrees.
    pub angle_deg: f32,
    /// Orientation similarity of the winning placement.
    pub similarity: f32,
}

impl Alignment {
    /// Origin of the aligned fingerprint in union coordinates.
    pub fn aligned_origin(&self) -> Point {
        Point::new(self.dx.max(0), self.dy.max(0))
    }

    /// Origin of the partner fingerprint in union coordinates.
    pub fn partner_origin(&self) -> Point {
        Point::new((-self.dx).max(0), (-self.dy).max(0))
    }

    /// Lays out both fingerprints in one union canvas.
    pub fn layout(&self, aligned_shape: (usize, usize), partner_shape: (usize, usize)) -> Layout {
        let aligned = self.aligned_origin();
        let partner = self.partner_origin();
        let width = (aligned.x as usize + aligned_shape.0).max(partner.x as usize + partner_shape.0);
        let height = (aligned.y as usize + aligned_shape.1).max(partner.y as usize + partner_shape.1);
        Layout {
            aligned,
            partner,
            overlap: overlap_box(partner, partner_shape, aligned, aligned_shape),
            union: (width, height),
        }
    }
}

/// Both fingerprints placed in a shared union canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Layout {
    /// Origin of the aligned fingerprint.
    pub aligned: Point,
    /// Origin of the partner fingerprint.
    pub partner: Point,
    /// Region both fingerprints cover.
    pub overlap: Rect,
    /// Size of the union canvas.
    pub union: (usize, usize),
}

/// A fingerprint rotated and placed against a partner, plus its cutline.
///
/// The wrapped record keeps its unrotated raw image; the normalized image,
/// orientation, frequency and region fields are replaced by their rotated
/// and identity-cropped versions once [`align`] has run.
#[derive(Clone, Debug, Default)]
pub struct AlignedFingerprint {
    fingerprint: Fingerprint,
    aligned: Option<Image>,
    alignment: Option<Alignment>,
    cutline: Option<Cutline>,
}

impl AlignedFingerprint {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            ..Self::default()
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn fingerprint_mut(&mut self) -> &mut Fingerprint {
        &mut self.fingerprint
    }

    /// Raw image rotated by the alignment angle and cropped to the identity region.
    pub fn aligned(&self) -> FpMorphResult<&Image> {
        self.aligned
            .as_ref()
            .ok_or(FpMorphError::StageNotRun { stage: "align" })
    }

    pub fn alignment(&self) -> FpMorphResult<Alignment> {
        self.alignment.ok_or(FpMorphError::StageNotRun { stage: "align" })
    }

    pub fn cutline(&self) -> FpMorphResult<&Cutline> {
        self.cutline.as_ref().ok_or(FpMorphError::StageNotRun {
            stage: "estimate_cutline",
        })
    }

    pub fn set_cutline(&mut self, cutline: Cutline) -> &mut Self {
        self.cutline = Some(cutline);
        self
    }

    /// Union layout against `partner`.
    pub fn layout(&self, partner: &Fingerprint) -> FpMorphResult<Layout> {
        Ok(self
            .alignment()?
            .layout(self.aligned()?.shape(), partner.raw().shape()))
    }

    /// Drops every derived field, keeping the raw image.
    pub fn reset(&mut self) {
        self.fingerprint.reset();
        self.aligned = None;
        self.alignment = None;
        self.cutline = None;
    }
}

/// Intersection of two placed rectangles; empty when they do not overlap.
pub fn overlap_box(
    a_pos: Point,
    a_shape: (usize, usize),
    b_pos: Point,
    b_shape: (usize, usize),
) -> Rect {
    let x0 = a_pos.x.max(b_pos.x).max(0) as usize;
    let y0 = a_pos.y.max(b_pos.y).max(0) as usize;
    let x1 = (a_pos.x as i64 + a_shape.0 as i64).min(b_pos.x as i64 + b_shape.0 as i64);
    let y1 = (a_pos.y as i64 + a_shape.1 as i64).min(b_pos.y as i64 + b_shape.1 as i64);
    Rect::from_corners(x0, y0, x1.max(0) as usize, y1.max(0) as usize)
}

/// Block centers `start + bs/2, start + bs/2 + bs, ...` inside `rect`.
pub(crate) fn block_centers(rect: Rect, block_size: usize) -> impl Iterator<Item = (usize, usize)> {
    let step = block_size.max(1);
    let ys = (rect.y + block_size / 2..rect.bottom()).step_by(step);
    ys.flat_map(move |y| (rect.x + block_size / 2..rect.right()).step_by(step).map(move |x| (x, y)))
}

/// Number of block centers [`block_centers`] yields for `rect`.
pub(crate) fn block_center_count(rect: Rect, block_size: usize) -> usize {
    let step = block_size.max(1);
    let along = |len: usize| {
        if len > block_size / 2 {
            (len - block_size / 2 - 1) / step + 1
        } else {
            0
        }
    };
    along(rect.width) * along(rect.height)
}

/// Orientation agreement `1 - 2|o1 - o2| / pi` of two angles.
pub(crate) fn orientation_agreement(o1: f32, o2: f32) -> f32 {
    1.0 - 2.0 * (o1 - o2).abs() / PI
}

/// Rotates an orientation field and crops it to its valid samples.
///
/// Returns the cropped field and the identity rectangle in the rotated
/// canvas. Valid angles are turned by the rotation and wrapped into [0, pi).
pub fn rotate_orientations(
    field: &OrientationField,
    angle_deg: f32,
) -> FpMorphResult<(OrientationField, Rect)> {
    let (width, height) = field.shape();
    let rotation = Rotation::new(width, height, angle_deg);
    let mut angles = rotation.apply(field.angles(), 0.0);
    let mut validity = rotation.apply(field.validity(), 0.0);
    let turn = angle_deg.to_radians();

    let (out_w, out_h) = rotation.output_shape();
    let mut bbox: Option<(usize, usize, usize, usize)> = None;
    for y in 0..out_h {
        for x in 0..out_w {
            let v = validity[(x, y)];
            if !(0.0..=1.0).contains(&v) || v == 0.0 {
                validity.data_mut()[y * out_w + x] = 0.0;
                angles.data_mut()[y * out_w + x] = 0.0;
                continue;
            }
            let a = angles[(x, y)];
            angles.data_mut()[y * out_w + x] = wrap_half_turn(a + turn);
            bbox = Some(match bbox {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }

    // The far corner is exclusive, so the last valid row and column drop out.
    let identity = bbox
        .map(|(x0, y0, x1, y1)| Rect::from_corners(x0, y0, x1, y1))
        .unwrap_or_default();
    let rotated = OrientationField::new(angles, validity, field.block_size())?.crop(identity)?;
    Ok((rotated, identity))
}

/// Best placement found for one rotation.
#[derive(Clone, Debug)]
struct RotationBest {
    dx: i32,
    dy: i32,
    similarity: f32,
}

/// Scores one placement; `None` marks a negligible overlap.
fn similarity(
    af: &OrientationField,
    af_pos: Point,
    f: &OrientationField,
    f_pos: Point,
    block_size: usize,
    min_blocks: f32,
) -> Option<f32> {
    let bb = overlap_box(f_pos, f.shape(), af_pos, af.shape());
    let mut num = 0.0f32;
    let mut den = 0.0f32;
    let mut overlapped = 0usize;
    for (x, y) in block_centers(bb, block_size) {
        let (ax, ay) = (x as i64 - af_pos.x as i64, y as i64 - af_pos.y as i64);
        let (fx, fy) = (x as i64 - f_pos.x as i64, y as i64 - f_pos.y as i64);
        let r1 = af.validity_at(ax, ay);
        let r2 = f.validity_at(fx, fy);
        if r1 > 0.0 && r2 > 0.0 {
            overlapped += 1;
            let o1 = af.angle(ax, ay).unwrap_or(0.0);
            let o2 = f.angle(fx, fy).unwrap_or(0.0);
            num += (r1 + r2) * orientation_agreement(o1, o2);
            den += r1 + r2;
        }
    }
    if (overlapped as f32) < min_blocks {
        return None;
    }
    Some(if den > 0.0 { num / den } else { 0.0 })
}

/// Scans the translation grid for one rotated field.
fn search_translations(
    rotated: &OrientationField,
    partner: &OrientationField,
    block_size: usize,
    cfg: &AlignConfig,
) -> Option<RotationBest> {
    let ts = cfg.translation_step;
    let (r_w, r_h) = rotated.shape();
    let (f_w, f_h) = partner.shape();
    let rows = r_h / ts / 2 + f_h / ts / 2;
    let cols = r_w / ts / 2 + f_w / ts / 2;
    let f_pos = Point::new((cols / 2 * ts) as i32, (rows / 2 * ts) as i32);

    let blocks = if r_w * r_h > f_w * f_h {
        partner.foreground_blocks(block_size)
    } else {
        rotated.foreground_blocks(block_size)
    };
    let min_blocks = blocks as f32 * cfg.overlap_threshold;

    let mut best: Option<RotationBest> = None;
    let mut best_score = 0.0f32;
    for i in 0..rows {
        for j in 0..cols {
            let af_pos = Point::new((j * ts) as i32, (i * ts) as i32);
            let bb = overlap_box(f_pos, partner.shape(), af_pos, rotated.shape());
            if (block_center_count(bb, block_size) as f32) < min_blocks {
                continue;
            }
            let Some(score) = similarity(rotated, af_pos, partner, f_pos, block_size, min_blocks)
            else {
                continue;
            };
            if score > best_score {
                best_score = score;
                best = Some(RotationBest {
                    dx: af_pos.x - f_pos.x,
                    dy: af_pos.y - f_pos.y,
                    similarity: score,
                });
            }
        }
    }
    best
}

fn search_rotation(
    field: &OrientationField,
    partner: &OrientationField,
    angle_deg: f32,
    block_size: usize,
    cfg: &AlignConfig,
) -> FpMorphResult<Option<RotationBest>> {
    let (rotated, _) = rotate_orientations(field, angle_deg)?;
    let best = search_translations(&rotated, partner, block_size, cfg);
    if let Some(best) = &best {
        trace_detail!(
            "rotation_best",
            angle = angle_deg,
            dx = best.dx,
            dy = best.dy,
            similarity = best.similarity
        );
    }
    Ok(best)
}

fn evaluate_rotations_seq(
    field: &OrientationField,
    partner: &OrientationField,
    grid: &AngleGrid,
    block_size: usize,
    cfg: &AlignConfig,
) -> FpMorphResult<Vec<Option<RotationBest>>> {
    grid.iter()
        .map(|angle| search_rotation(field, partner, angle, block_size, cfg))
        .collect()
}

#[cfg(feature = "rayon")]
fn evaluate_rotations(
    field: &OrientationField,
    partner: &OrientationField,
    grid: &AngleGrid,
    block_size: usize,
    cfg: &AlignConfig,
) -> FpMorphResult<Vec<Option<RotationBest>>> {
    if !cfg.parallel {
        return evaluate_rotations_seq(field, partner, grid, block_size, cfg);
    }
    (0..grid.len())
        .into_par_iter()
        .map(|idx| search_rotation(field, partner, grid.angle_at(idx), block_size, cfg))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn evaluate_rotations(
    field: &OrientationField,
    partner: &OrientationField,
    grid: &AngleGrid,
    block_size: usize,
    cfg: &AlignConfig,
) -> FpMorphResult<Vec<Option<RotationBest>>> {
    evaluate_rotations_seq(field, partner, grid, block_size, cfg)
}

/// Aligns `af` onto `partner` and rotates its working data accordingly.
///
/// Both fingerprints need their orientation, frequency and region stages
/// run (and the region applied). When no placement scores above zero the
/// identity transform is used.
pub fn align(
    af: &mut AlignedFingerprint,
    partner: &Fingerprint,
    cfg: &AlignConfig,
) -> FpMorphResult<Alignment> {
    if cfg.translation_step == 0 {
        return Err(FpMorphError::InvalidConfig("translation step must be positive"));
    }
    let block_size = partner.block_size();
    if block_size == 0 {
        return Err(FpMorphError::InvalidConfig("block size must be positive"));
    }
    let grid = AngleGrid::inclusive(cfg.min_angle_deg, cfg.max_angle_deg, cfg.rotation_step)?;
    let _span = trace_span!("align", angles = grid.len(), step = cfg.translation_step).entered();

    let field = af.fingerprint.orientations()?.clone();
    let partner_field = partner.orientations()?;
    let results = evaluate_rotations(&field, partner_field, &grid, block_size, cfg)?;

    // Ordered reduction keeps the first strictly best placement.
    let mut alignment = Alignment::default();
    let mut best_score = 0.0f32;
    for (idx, result) in results.into_iter().enumerate() {
        if let Some(best) = result {
            if best.similarity > best_score {
                best_score = best.similarity;
                alignment = Alignment {
                    dx: best.dx,
                    dy: best.dy,
                    angle_deg: grid.angle_at(idx),
                    similarity: best.similarity,
                };
            }
        }
    }
    if best_score <= 0.0 {
        trace_event!("alignment_not_found", angles = grid.len());
    }

    apply_alignment(af, &field, alignment)?;
    trace_event!(
        "alignment",
        dx = alignment.dx,
        dy = alignment.dy,
        angle = alignment.angle_deg,
        similarity = alignment.similarity
    );
    Ok(alignment)
}

fn rotate_cropped(img: &Image, angle_deg: f32, fill: f32, identity: Rect) -> FpMorphResult<Image> {
    let rotated = Rotation::new(img.width(), img.height(), angle_deg).apply(img, fill);
    rotated.crop(identity)
}

fn apply_alignment(
    af: &mut AlignedFingerprint,
    field: &OrientationField,
    alignment: Alignment,
) -> FpMorphResult<()> {
    let angle = alignment.angle_deg;
    let (orientations, identity) = rotate_orientations(field, angle)?;

    let fingerprint = &mut af.fingerprint;
    let aligned = rotate_cropped(fingerprint.raw(), angle, 1.0, identity)?;
    let normalized = rotate_cropped(fingerprint.normalized()?, angle, 1.0, identity)?;
    let frequencies = fingerprint.frequencies()?;
    let frequencies =
        frequencies.with_values(rotate_cropped(frequencies.values(), angle, 0.0, identity)?);
    let mut region = fingerprint.region_mask()?.clone();
    let mask = rotate_cropped(region.mask(), angle, 0.0, identity)?;
    region.set_mask(mask, identity);

    fingerprint
        .set_normalized(normalized)
        .set_orientations(orientations)
        .set_frequencies(frequencies)
        .set_region_mask(region);
    af.aligned = Some(aligned);
    af.alignment = Some(alignment);
    af.cutline = None;
    Ok(())
}

/// Builds a field with validity 1 wherever `valid` holds and angle `angle`.
#[cfg(test)]
pub(crate) fn uniform_field(
    width: usize,
    height: usize,
    angle: f32,
    block_size: usize,
    valid: impl Fn(usize, usize) -> bool,
) -> OrientationField {
    use crate::image::Grid;

    let angles = Grid::filled(width, height, angle);
    let validity = Grid::from_fn(width, height, |x, y| if valid(x, y) { 1.0 } else { 0.0 });
    OrientationField::new(angles, validity, block_size).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_box_clamps_disjoint_rects() {
        let bb = overlap_box(Point::new(0, 0), (10, 10), Point::new(20, 0), (10, 10));
        assert!(bb.is_empty());
        let bb = overlap_box(Point::new(0, 0), (10, 10), Point::new(4, 6), (10, 10));
        assert_eq!(bb, Rect::new(4, 6, 6, 4));
    }

    #[test]
    fn block_centers_start_half_a_block_in() {
        let centers: Vec<_> = block_centers(Rect::new(10, 0, 20, 9), 8).collect();
        assert_eq!(centers, vec![(14, 4), (22, 4)]);
    }

    #[test]
    fn block_center_count_matches_iteration() {
        for &(rect, bs) in &[
            (Rect::new(10, 0, 20, 9), 8),
            (Rect::new(3, 5, 58, 58), 12),
            (Rect::new(0, 0, 56, 63), 8),
            (Rect::new(0, 0, 4, 30), 8),
            (Rect::new(0, 0, 0, 0), 8),
        ] {
            assert_eq!(
                block_center_count(rect, bs),
                block_centers(rect, bs).count(),
                "{rect:?} / {bs}"
            );
        }
        // 58 px hold five centers but only four whole 12 px blocks.
        assert_eq!(block_center_count(Rect::new(0, 0, 58, 58), 12), 25);
    }

    #[test]
    fn layout_places_negative_offsets_on_partner() {
        let alignment = Alignment {
            dx: -5,
            dy: 3,
            ..Alignment::default()
        };
        let layout = alignment.layout((20, 20), (30, 10));
        assert_eq!(layout.aligned, Point::new(0, 3));
        assert_eq!(layout.partner, Point::new(5, 0));
        assert_eq!(layout.union, (35, 23));
        assert_eq!(layout.overlap, Rect::new(5, 3, 15, 7));
    }

    #[test]
    fn zero_rotation_keeps_angles_and_trims_last_valid_row() {
        let field = uniform_field(12, 10, 0.5, 4, |x, y| (2..8).contains(&x) && (1..9).contains(&y));
        let (rotated, identity) = rotate_orientations(&field, 0.0).unwrap();
        assert_eq!(identity, Rect::new(2, 1, 5, 7));
        assert_eq!(rotated.shape(), (5, 7));
        assert!((rotated.angle(0, 0).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rotation_turns_valid_angles_modulo_pi() {
        let field = uniform_field(9, 9, 3.0, 3, |_, _| true);
        let (rotated, _) = rotate_orientations(&field, 18.0).unwrap();
        let (w, h) = rotated.shape();
        let expected = wrap_half_turn(3.0 + 18f32.to_radians());
        let center = rotated.angle(w as i64 / 2, h as i64 / 2).unwrap();
        assert!((center - expected).abs() < 1e-4, "{center} vs {expected}");
        for &a in rotated.angles().data() {
            assert!((0.0..PI).contains(&a));
        }
    }

    #[test]
    fn empty_field_rotates_to_empty_identity() {
        let field = uniform_field(8, 8, 0.0, 4, |_, _| false);
        let (rotated, identity) = rotate_orientations(&field, 27.0).unwrap();
        assert!(identity.is_empty());
        assert!(rotated.is_empty());
    }

    #[test]
    fn identical_fields_score_one() {
        let field = uniform_field(32, 32, 1.0, 8, |_, _| true);
        let score = similarity(&field, Point::new(0, 0), &field, Point::new(0, 0), 8, 1.0);
        assert_eq!(score, Some(1.0));
        let crossed = uniform_field(32, 32, 1.0 + PI / 2.0, 8, |_, _| true);
        let score = similarity(&crossed, Point::new(0, 0), &field, Point::new(0, 0), 8, 1.0);
        assert!(score.unwrap().abs() < 1e-5);
    }

    #[test]
    fn small_overlap_is_negligible() {
        let field = uniform_field(32, 32, 1.0, 8, |_, _| true);
        let score = similarity(&field, Point::new(24, 24), &field, Point::new(0, 0), 8, 2.0);
        assert_eq!(score, None);
    }
}
