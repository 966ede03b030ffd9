//! Search for the line along which two aligned fingerprints are spliced.
//!
//! Candidate lines are scored on the overlap of both fingerprints by three
//! criteria: orientation agreement and frequency similarity of the blocks
//! within `dmax` of the line, and how evenly the line splits the minutiae
//! of both identities. The weighted sum of the three is the evaluation.

use std::f32::consts::PI;
use std::fmt;

use crate::fingerprint::{Fingerprint, FrequencyField, Minutia, OrientationField};
use crate::image::{Point, Rect};
use crate::morphing::align::{block_centers, orientation_agreement, AlignedFingerprint, Layout};
use crate::morphing::angles::AngleGrid;
use crate::trace::{trace_detail, trace_event, trace_span};
use crate::util::{FpMorphError, FpMorphResult};

/// Cutline search parameters.
#[derive(Clone, Debug)]
pub struct CutlineConfig {
    /// Angular step of the line search, radians.
    pub rotation_step: f32,
    /// Half width of the band around the line that is scored and blended.
    pub dmax: f32,
    /// Offset of the eight extra anchors in dynamic mode, pixels.
    pub search_area: i32,
    pub orientation_weight: f32,
    pub frequency_weight: f32,
    pub minutiae_weight: f32,
    /// Sigmoid shift `u` of the minutiae count score.
    pub sigmoid_shift: f32,
    /// Sigmoid slope `t` of the minutiae count score.
    pub sigmoid_slope: f32,
    /// Also tries anchors around the overlap centroid.
    pub dynamic: bool,
    /// Excludes minutiae within `dmax` of the line and combines both sides
    /// with an F1-style score instead of their mean.
    pub adaptive: bool,
}

impl Default for CutlineConfig {
    fn default() -> Self {
        Self {
            rotation_step: PI / 10.0,
            dmax: 32.0,
            search_area: 64,
            orientation_weight: 1.0 / 3.0,
            frequency_weight: 1.0 / 3.0,
            minutiae_weight: 1.0 / 3.0,
            sigmoid_shift: -15.0,
            sigmoid_slope: -0.3,
            dynamic: false,
            adaptive: false,
        }
    }
}

impl CutlineConfig {
    /// Saturating score of a minutiae count, `1 / (1 + exp(t * (n + u)))`.
    pub fn count_score(&self, count: usize) -> f32 {
        1.0 / (1.0 + (self.sigmoid_slope * (count as f32 + self.sigmoid_shift)).exp())
    }

    /// Combined score of one assignment of sides.
    pub fn separation_score(&self, positive: usize, negative: usize) -> f32 {
        let p = self.count_score(positive);
        let n = self.count_score(negative);
        if self.adaptive {
            if p + n > 0.0 {
                2.0 * p * n / (p + n)
            } else {
                0.0
            }
        } else {
            (p + n) / 2.0
        }
    }
}

/// Line `a*x + b*y + c = 0` in union coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Line {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl Line {
    /// Line at `rotation` radians through `(cx, cy)`.
    pub fn through(rotation: f32, cx: f32, cy: f32) -> Self {
        let a = rotation.sin();
        let b = rotation.cos();
        Self {
            a,
            b,
            c: -cx * a - cy * b,
        }
    }

    fn value(&self, x: f32, y: f32) -> f32 {
        self.a * x + self.b * y + self.c
    }

    /// Unsigned distance of `(x, y)` from the line.
    pub fn distance(&self, x: f32, y: f32) -> f32 {
        let norm = (self.a * self.a + self.b * self.b).sqrt();
        if norm > 0.0 {
            self.value(x, y).abs() / norm
        } else {
            0.0
        }
    }

    /// Positive side: `a*x + b*y + c < 0`.
    pub fn is_positive(&self, x: f32, y: f32) -> bool {
        self.value(x, y) < 0.0
    }

    pub fn distance_to(&self, p: Point) -> f32 {
        self.distance(p.x as f32, p.y as f32)
    }

    pub fn is_positive_at(&self, p: Point) -> bool {
        self.is_positive(p.x as f32, p.y as f32)
    }
}

/// Which identity takes which side of the line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Separation {
    /// No line scored above zero.
    #[default]
    Unknown,
    /// Partner on the positive side, aligned fingerprint on the negative.
    PosNeg,
    /// Aligned fingerprint on the positive side, partner on the negative.
    NegPos,
}

impl Separation {
    pub fn as_str(self) -> &'static str {
        match self {
            Separation::Unknown => "unknown",
            Separation::PosNeg => "pos-neg",
            Separation::NegPos => "neg-pos",
        }
    }
}

impl fmt::Display for Separation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minutiae of one fingerprint split by line side.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Partition {
    pub positive: Vec<Minutia>,
    pub negative: Vec<Minutia>,
}

impl Partition {
    fn relative_to(&self, origin: Point) -> Self {
        let shift = Point::new(-origin.x, -origin.y);
        let move_all = |list: &[Minutia]| -> Vec<Minutia> {
            list.iter().map(|m| m.translated(shift)).collect()
        };
        Self {
            positive: move_all(&self.positive),
            negative: move_all(&self.negative),
        }
    }
}

/// The chosen splice line with its partitions and scores.
///
/// Partition positions are relative to the overlap box origin; the line
/// itself stays in union coordinates. The three component scores are stored
/// already weighted so that they sum to `evaluation`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cutline {
    pub line: Line,
    /// Line angle, radians.
    pub rotation: f32,
    /// Point the line passes through, union coordinates.
    pub anchor: Point,
    pub dmax: f32,
    pub separation: Separation,
    /// Minutiae of the partner fingerprint.
    pub partner: Partition,
    /// Minutiae of the aligned fingerprint.
    pub aligned: Partition,
    pub orientation_score: f32,
    pub frequency_score: f32,
    pub minutiae_score: f32,
    pub evaluation: f32,
}

/// Inputs of the line scoring shared by every candidate.
struct Scorer<'a> {
    partner: &'a OrientationField,
    aligned: &'a OrientationField,
    partner_freq: &'a FrequencyField,
    aligned_freq: &'a FrequencyField,
    layout: Layout,
    block_size: usize,
    partner_minutiae: Vec<Minutia>,
    aligned_minutiae: Vec<Minutia>,
    freq_min: f32,
    freq_max: f32,
    cfg: &'a CutlineConfig,
}

impl<'a> Scorer<'a> {
    fn new(
        af: &'a AlignedFingerprint,
        partner: &'a Fingerprint,
        cfg: &'a CutlineConfig,
    ) -> FpMorphResult<Self> {
        let layout = af.layout(partner)?;
        let aligned_fp = af.fingerprint();
        let partner_freq = partner.frequencies()?;
        let aligned_freq = aligned_fp.frequencies()?;
        let mut scorer = Self {
            partner: partner.orientations()?,
            aligned: aligned_fp.orientations()?,
            partner_freq,
            aligned_freq,
            layout,
            block_size: partner.block_size(),
            partner_minutiae: Vec::new(),
            aligned_minutiae: Vec::new(),
            freq_min: partner_freq.min().min(aligned_freq.min()),
            freq_max: partner_freq.max().max(aligned_freq.max()),
            cfg,
        };
        scorer.partner_minutiae = scorer.morphed_area(partner.minutiae()?, layout.partner);
        scorer.aligned_minutiae = scorer.morphed_area(aligned_fp.minutiae()?, layout.aligned);
        Ok(scorer)
    }

    fn validity(&self, x: i64, y: i64) -> (f32, f32) {
        let a = self.layout.aligned;
        let p = self.layout.partner;
        (
            self.aligned.validity_at(x - a.x as i64, y - a.y as i64),
            self.partner.validity_at(x - p.x as i64, y - p.y as i64),
        )
    }

    /// Minutiae moved to union coordinates that lie strictly inside the
    /// overlap on valid orientation of both fingerprints.
    fn morphed_area(&self, minutiae: &[Minutia], origin: Point) -> Vec<Minutia> {
        minutiae
            .iter()
            .map(|m| m.translated(origin))
            .filter(|m| {
                let p = m.position;
                if !self.layout.overlap.contains_strictly(p) {
                    return false;
                }
                let (r1, r2) = self.validity(p.x as i64, p.y as i64);
                r1 > 0.0 && r2 > 0.0
            })
            .collect()
    }

    fn frequency_similarity(&self, v1: f32, v2: f32) -> f32 {
        let span = self.freq_max - self.freq_min;
        if span == 0.0 {
            1.0
        } else {
            1.0 - (v1 - v2).abs() / span
        }
    }

    fn partition(&self, line: &Line, minutiae: &[Minutia]) -> Partition {
        let mut out = Partition::default();
        for m in minutiae {
            if self.cfg.adaptive && line.distance_to(m.position) < self.cfg.dmax {
                continue;
            }
            if line.is_positive_at(m.position) {
                out.positive.push(m.clone());
            } else {
                out.negative.push(m.clone());
            }
        }
        out
    }

    /// Scores one line; partitions stay in union coordinates.
    fn score(&self, rotation: f32, anchor: Point) -> Cutline {
        let line = Line::through(rotation, anchor.x as f32, anchor.y as f32);
        let (a, p) = (self.layout.aligned, self.layout.partner);
        let mut o_num = 0.0f32;
        let mut o_den = 0.0f32;
        let mut v_num = 0.0f32;
        let mut v_den = 0.0f32;
        for (x, y) in block_centers(self.layout.overlap, self.block_size) {
            let (x, y) = (x as i64, y as i64);
            let (r1, r2) = self.validity(x, y);
            if line.distance(x as f32, y as f32) > self.cfg.dmax || r1 <= 0.0 || r2 <= 0.0 {
                continue;
            }
            let (ax, ay) = (x - a.x as i64, y - a.y as i64);
            let (px, py) = (x - p.x as i64, y - p.y as i64);
            let o1 = self.aligned.angle(ax, ay).unwrap_or(0.0);
            let o2 = self.partner.angle(px, py).unwrap_or(0.0);
            o_num += (r1 + r2) * orientation_agreement(o1, o2);
            o_den += r1 + r2;
            let v1 = self.aligned_freq.at(ax, ay);
            let v2 = self.partner_freq.at(px, py);
            v_num += self.frequency_similarity(v1, v2);
            v_den += 1.0;
        }

        let partner = self.partition(&line, &self.partner_minutiae);
        let aligned = self.partition(&line, &self.aligned_minutiae);
        let f_af = self
            .cfg
            .separation_score(partner.positive.len(), aligned.negative.len());
        let af_f = self
            .cfg
            .separation_score(aligned.positive.len(), partner.negative.len());
        let separation = if f_af >= af_f {
            Separation::PosNeg
        } else {
            Separation::NegPos
        };

        let s_o = if o_den > 0.0 { o_num / o_den } else { 0.0 };
        let s_v = if v_den > 0.0 { v_num / v_den } else { 0.0 };
        let s_m = f_af.max(af_f);
        let orientation_score = self.cfg.orientation_weight * s_o;
        let frequency_score = self.cfg.frequency_weight * s_v;
        let minutiae_score = self.cfg.minutiae_weight * s_m;
        Cutline {
            line,
            rotation,
            anchor,
            dmax: self.cfg.dmax,
            separation,
            partner,
            aligned,
            orientation_score,
            frequency_score,
            minutiae_score,
            evaluation: orientation_score + frequency_score + minutiae_score,
        }
    }

    /// Line anchors: the overlap centroid, plus its eight neighbours at
    /// `search_area` (clamped to the overlap) in dynamic mode.
    fn anchors(&self) -> Vec<Point> {
        const SHIFTS: [(i32, i32); 9] = [
            (0, 1),
            (-1, 1),
            (-1, 0),
            (-1, -1),
            (0, -1),
            (0, 0),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        let bb = self.layout.overlap;
        let centroid = bb.center();
        if !self.cfg.dynamic {
            return vec![centroid];
        }
        SHIFTS
            .iter()
            .map(|&(sx, sy)| {
                let x = (centroid.x + sx * self.cfg.search_area).clamp(bb.x as i32, bb.right() as i32);
                let y = (centroid.y + sy * self.cfg.search_area).clamp(bb.y as i32, bb.bottom() as i32);
                Point::new(x, y)
            })
            .collect()
    }

    fn finish(&self, mut cutline: Cutline) -> Cutline {
        let origin = self.layout.overlap.origin();
        cutline.partner = cutline.partner.relative_to(origin);
        cutline.aligned = cutline.aligned.relative_to(origin);
        cutline
    }
}

fn validate(cfg: &CutlineConfig) -> FpMorphResult<()> {
    if cfg.dmax.is_nan() || cfg.dmax < 0.0 {
        return Err(FpMorphError::InvalidConfig("cutline dmax must be non-negative"));
    }
    Ok(())
}

/// Scores a single line at `rotation` through `anchor` (union coordinates).
pub fn evaluate_line(
    af: &AlignedFingerprint,
    partner: &Fingerprint,
    rotation: f32,
    anchor: Point,
    cfg: &CutlineConfig,
) -> FpMorphResult<Cutline> {
    validate(cfg)?;
    let scorer = Scorer::new(af, partner, cfg)?;
    Ok(scorer.finish(scorer.score(rotation, anchor)))
}

/// Searches line angles (and anchors in dynamic mode) for the best cutline.
///
/// Requires both fingerprints to have minutiae and `af` to be aligned onto
/// `partner`. The first candidate with the strictly highest evaluation
/// wins; if none scores above zero the separation stays unknown.
pub fn estimate_cutline(
    af: &AlignedFingerprint,
    partner: &Fingerprint,
    cfg: &CutlineConfig,
) -> FpMorphResult<Cutline> {
    validate(cfg)?;
    let grid = AngleGrid::half_open(0.0, PI, cfg.rotation_step)?;
    let scorer = Scorer::new(af, partner, cfg)?;
    let _span = trace_span!(
        "estimate_cutline",
        angles = grid.len(),
        dynamic = cfg.dynamic,
        adaptive = cfg.adaptive
    )
    .entered();

    let overlap: Rect = scorer.layout.overlap;
    let mut best: Option<Cutline> = None;
    let mut best_eval = 0.0f32;
    for anchor in scorer.anchors() {
        for rotation in grid.iter() {
            let candidate = scorer.score(rotation, anchor);
            trace_detail!(
                "cutline_candidate",
                rotation = rotation,
                x = anchor.x,
                y = anchor.y,
                evaluation = candidate.evaluation
            );
            if candidate.evaluation > best_eval {
                best_eval = candidate.evaluation;
                best = Some(candidate);
            }
        }
    }

    let cutline = match best {
        Some(best) => scorer.finish(best),
        None => Cutline {
            anchor: overlap.center(),
            dmax: cfg.dmax,
            ..Cutline::default()
        },
    };
    trace_event!(
        "cutline",
        rotation = cutline.rotation,
        evaluation = cutline.evaluation,
        separation = cutline.separation.as_str()
    );
    Ok(cutline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_sides_follow_the_sign() {
        // rotation pi/2: a = 1, b ~ 0, so the line is the vertical x = cx.
        let vertical = Line::through(PI / 2.0, 10.0, 5.0);
        assert!(vertical.is_positive(3.0, 5.0));
        assert!(!vertical.is_positive(12.0, 5.0));
        assert!((vertical.distance(14.0, 0.0) - 4.0).abs() < 1e-4);

        let horizontal = Line::through(0.0, 10.0, 5.0);
        assert!(horizontal.is_positive(0.0, 2.0));
        assert!((horizontal.distance(0.0, 9.0) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn count_score_is_half_at_the_shift() {
        let cfg = CutlineConfig::default();
        assert!((cfg.count_score(15) - 0.5).abs() < 1e-6);
        assert!(cfg.count_score(40) > 0.99);
        assert!(cfg.count_score(0) < 0.02);
    }

    #[test]
    fn adaptive_score_punishes_imbalance() {
        let baseline = CutlineConfig::default();
        let adaptive = CutlineConfig {
            adaptive: true,
            ..CutlineConfig::default()
        };
        let even = adaptive.separation_score(20, 20);
        let skewed = adaptive.separation_score(40, 0);
        assert!((even - baseline.separation_score(20, 20)).abs() < 1e-6);
        assert!(skewed < baseline.separation_score(40, 0));
    }

    #[test]
    fn partitions_move_to_overlap_origin() {
        use crate::fingerprint::MinutiaKind;
        let m = Minutia::new(Point::new(30, 40), 0.0, 7.0, MinutiaKind::Ending);
        let part = Partition {
            positive: vec![m],
            negative: Vec::new(),
        };
        let moved = part.relative_to(Point::new(10, 15));
        assert_eq!(moved.positive[0].position, Point::new(20, 25));
    }
}
