//! Minutiae detection on the valley skeleton and direction estimation by
//! adaptive-length ridge tracing.

use crate::fingerprint::{Minutia, MinutiaKind, OrientationField};
use crate::image::{BinaryImage, Point};
use crate::processing::ridge::{
    closest_ridge, probe_ridge, starting_positions, trace_branches, Probe, Trace, RING,
};
use crate::trace::{trace_event, trace_span};
use crate::util::{FpMorphError, FpMorphResult};
use std::f32::consts::{FRAC_PI_2, PI};

/// Minutiae extraction parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinutiaeConfig {
    /// Block size of the border check; probes sit `2 * block_size` away.
    pub block_size: usize,
    /// Trace length of the first direction estimate.
    pub trace_threshold: f32,
    /// Trace length used when no neighbouring ridge is found.
    pub adaptive_default: f32,
    /// Farthest probe distance of the neighbouring ridge search (exclusive).
    pub adaptive_bound: i32,
    /// Trace length collecting the minutia's own ridge before the search.
    pub own_line_steps: usize,
}

impl Default for MinutiaeConfig {
    fn default() -> Self {
        Self {
            block_size: 11,
            trace_threshold: 20.0,
            adaptive_default: 7.0,
            adaptive_bound: 50,
            own_line_steps: 15,
        }
    }
}

/// Crossing number of the inverted 8-neighbourhood at `(x, y)`.
fn crossing_number(map: &BinaryImage, x: usize, y: usize) -> usize {
    // N, NE, E, SE, S, SW, W, NW with ridge pixels as 0.
    let ring = [
        map[(x, y - 1)],
        map[(x + 1, y - 1)],
        map[(x + 1, y)],
        map[(x + 1, y + 1)],
        map[(x, y + 1)],
        map[(x - 1, y + 1)],
        map[(x - 1, y)],
        map[(x - 1, y - 1)],
    ]
    .map(|v| u8::from(v != 1));
    let changes = (1..=8)
        .filter(|&n| ring[n % 8] != ring[n - 1])
        .count();
    changes / 2
}

/// Kind signalled by a crossing number of the valley skeleton.
pub fn kind_for_crossing(cn: usize) -> Option<MinutiaKind> {
    match cn {
        1 => Some(MinutiaKind::Bifurcation),
        n if n >= 3 => Some(MinutiaKind::Ending),
        _ => None,
    }
}

/// Rejects positions whose 8 probes at `2 * block_size` leave the
/// orientation field or land on invalid samples.
fn is_inside_region(orientations: &OrientationField, pos: Point, block_size: usize) -> bool {
    let reach = 2 * block_size as i64;
    RING.iter().all(|&(dx, dy)| {
        orientations.is_valid(pos.x as i64 + dx as i64 * reach, pos.y as i64 + dy as i64 * reach)
    })
}

/// Wrapped absolute difference used to pair ending branches.
fn branch_gap(a: f32, b: f32) -> f32 {
    let mut d = a - b;
    if d > PI {
        d -= 2.0 * PI;
    } else if d < -PI {
        d += 2.0 * PI;
    }
    d.abs()
}

/// Direction of an ending from its branch ends: the bisector of the two
/// closest branches, turned around.
fn ending_direction(pos: Point, ends: &[Point]) -> f32 {
    let dirs: Vec<f32> = ends.iter().map(|&e| pos.direction_to(e)).collect();
    let pair: &[usize] = match dirs.len() {
        0 => return Minutia::UNSET_DIRECTION,
        1 => &[0],
        2 => &[0, 1],
        _ => {
            let pairs = [[0, 1], [0, 2], [1, 2]];
            let mut best = 0;
            for (i, p) in pairs.iter().enumerate() {
                if branch_gap(dirs[p[0]], dirs[p[1]]) < branch_gap(dirs[pairs[best][0]], dirs[pairs[best][1]]) {
                    best = i;
                }
            }
            match best {
                0 => &[0, 1],
                1 => &[0, 2],
                _ => &[1, 2],
            }
        }
    };
    let y: f32 = pair.iter().map(|&i| dirs[i].sin()).sum();
    let x: f32 = pair.iter().map(|&i| dirs[i].cos()).sum();
    let avg = y.atan2(x);
    if avg > 0.0 {
        avg - PI
    } else {
        avg + PI
    }
}

/// Estimates a minutia direction by tracing `threshold` steps along each
/// branch leaving `pos`.
pub fn estimate_direction(map: &BinaryImage, pos: Point, kind: MinutiaKind, threshold: f32) -> f32 {
    let starts = starting_positions(map, pos);
    let trace = trace_branches(map, pos, &starts, threshold.max(0.0) as usize);
    match kind {
        MinutiaKind::Ending => ending_direction(pos, &trace.ends),
        MinutiaKind::Bifurcation => trace
            .ends
            .last()
            .map_or(Minutia::UNSET_DIRECTION, |&end| pos.direction_to(end)),
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Side {
    Searching,
    Found(f32),
    Failed,
}

fn search_side(
    map: &BinaryImage,
    pos: Point,
    bound: i32,
    direction: f32,
    own: &Trace,
) -> Side {
    match probe_ridge(map, pos, bound, direction, own) {
        Probe::OffImage => Side::Failed,
        Probe::NoRidge => Side::Searching,
        Probe::Ridge(ridge) => {
            let (closest, distance) = closest_ridge(map, pos, ridge);
            if closest == pos || own.contains(closest) {
                Side::Failed
            } else {
                Side::Found(distance)
            }
        }
    }
}

/// Distance to the nearest neighbouring ridge on either side of the
/// minutia, used as its tracing threshold.
///
/// One side finding a ridge gives its distance, both give the average and
/// neither gives the configured default.
pub fn adaptive_threshold(map: &BinaryImage, pos: Point, direction: f32, cfg: &MinutiaeConfig) -> f32 {
    let starts = starting_positions(map, pos);
    let own = trace_branches(map, pos, &starts, cfg.own_line_steps);
    let mut sides = [Side::Searching; 2];
    let offsets = [-FRAC_PI_2, FRAC_PI_2];

    for bound in 1..cfg.adaptive_bound {
        for (side, offset) in sides.iter_mut().zip(offsets) {
            if *side == Side::Searching {
                *side = search_side(map, pos, bound, direction + offset, &own);
            }
        }
        if sides.iter().all(|s| *s != Side::Searching) {
            break;
        }
    }

    match sides {
        [Side::Found(a), Side::Found(b)] => (a + b) / 2.0,
        [Side::Found(d), _] | [_, Side::Found(d)] => d,
        _ => cfg.adaptive_default,
    }
}

/// Finds endings and bifurcations on a thinned skeleton.
///
/// The skeleton is of the valleys between ridges, so a crossing number of 1
/// marks a ridge bifurcation and 3 or more a ridge ending. Candidates too
/// close to the region border are dropped. Each survivor gets a first
/// direction estimate, an adaptive threshold from it, and a final direction
/// traced with that threshold.
pub fn extract_minutiae(
    skeleton: &BinaryImage,
    orientations: &OrientationField,
    cfg: &MinutiaeConfig,
) -> FpMorphResult<Vec<Minutia>> {
    if skeleton.shape() != orientations.shape() {
        return Err(FpMorphError::ShapeMismatch {
            expected: skeleton.shape(),
            got: orientations.shape(),
        });
    }
    let _span = trace_span!("extract_minutiae", block = cfg.block_size).entered();
    let (width, height) = skeleton.shape();
    let mut minutiae = Vec::new();
    if width < 3 || height < 3 {
        return Ok(minutiae);
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            if skeleton[(x, y)] == 0 {
                continue;
            }
            let Some(kind) = kind_for_crossing(crossing_number(skeleton, x, y)) else {
                continue;
            };
            let pos = Point::new(x as i32, y as i32);
            if !is_inside_region(orientations, pos, cfg.block_size) {
                continue;
            }
            let first = estimate_direction(skeleton, pos, kind, cfg.trace_threshold);
            let threshold = adaptive_threshold(skeleton, pos, first, cfg);
            let direction = estimate_direction(skeleton, pos, kind, threshold);
            minutiae.push(Minutia::new(pos, direction, threshold, kind));
        }
    }
    trace_event!(
        "minutiae",
        count = minutiae.len(),
        endings = minutiae.iter().filter(|m| m.kind == MinutiaKind::Ending).count()
    );
    Ok(minutiae)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Grid;

    fn skeleton(rows: &[&str]) -> BinaryImage {
        let width = rows[0].len();
        Grid::from_fn(width, rows.len(), |x, y| u8::from(rows[y].as_bytes()[x] == b'#'))
    }

    #[test]
    fn crossing_number_classifies_line_end_and_junction() {
        let map = skeleton(&[
            ".......", //
            ".......", //
            "..####.", //
            "..#....", //
            "..#....", //
            ".......",
        ]);
        // (5, 2) is the end of a line: one run of ridge pixels in the ring
        assert_eq!(crossing_number(&map, 5, 2), 1);
        assert_eq!(kind_for_crossing(1), Some(MinutiaKind::Bifurcation));
        // (3, 2) has ridge pixels W and E, two runs
        assert_eq!(crossing_number(&map, 3, 2), 2);
        assert_eq!(kind_for_crossing(2), None);

        let junction = skeleton(&["#...#", ".#.#.", "..#..", "..#..", "....."]);
        assert_eq!(crossing_number(&junction, 2, 2), 3);
        assert_eq!(kind_for_crossing(3), Some(MinutiaKind::Ending));
    }

    #[test]
    fn line_end_direction_points_along_the_line() {
        let map = skeleton(&[
            "............", //
            "............", //
            "..#########.", //
            "............", //
            "............",
        ]);
        let dir = estimate_direction(&map, Point::new(2, 2), MinutiaKind::Bifurcation, 5.0);
        assert!(dir.abs() < 1e-6);
    }

    #[test]
    fn junction_direction_bisects_opposite_of_closest_branches() {
        // branches leave to NW, NE and S; NW and NE are closest
        let map = skeleton(&[
            "#.......#", //
            ".#.....#.", //
            "..#...#..", //
            "...#.#...", //
            "....#....", //
            "....#....", //
            "....#....", //
            "....#....", //
            ".........",
        ]);
        let dir = estimate_direction(&map, Point::new(4, 4), MinutiaKind::Ending, 3.0);
        assert!((dir - FRAC_PI_2).abs() < 1e-5, "direction {dir}");
    }

    #[test]
    fn adaptive_threshold_measures_neighbouring_ridges() {
        let map = skeleton(&[
            "...............", //
            "...............", //
            "...............", //
            "..###########..", //
            "...............", //
            "...............", //
            "...............", //
            "..#########....", //
            "...............", //
            "...............", //
            "...............", //
            "..###########..", //
            "...............", //
            "...............",
        ]);
        let cfg = MinutiaeConfig::default();
        let pos = Point::new(10, 7);
        let t = adaptive_threshold(&map, pos, PI, &cfg);
        assert!((t - 4.0).abs() < 1e-5, "threshold {t}");
    }
}
