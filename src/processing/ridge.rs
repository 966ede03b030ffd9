//! Skeleton walking primitives shared by minutiae extraction and the
//! fake-minutiae filter.

use crate::image::{BinaryImage, Point};
use std::collections::HashSet;

/// 8-neighbourhood as `(dx, dy)`: E, NE, N, NW, W, SW, S, SE (y down).
pub const RING: [(i32, i32); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Result of probing the skeleton at a location.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Probe {
    /// A skeleton pixel was found.
    Ridge(Point),
    /// The location is inside the image but holds no usable ridge.
    NoRidge,
    /// The location is outside the image.
    OffImage,
}

#[inline]
fn is_ridge(map: &BinaryImage, p: Point) -> bool {
    map.at_point(p) == Some(1)
}

/// Ring pixels that start a ridge branch: value 1 with a 0 predecessor.
/// At most three positions are returned.
pub fn starting_positions(map: &BinaryImage, base: Point) -> Vec<Point> {
    let mut positions = Vec::with_capacity(3);
    for i in 1..=RING.len() {
        let (dx, dy) = RING[i % RING.len()];
        let (px, py) = RING[i - 1];
        let candidate = base + Point::new(dx, dy);
        let previous = base + Point::new(px, py);
        if is_ridge(map, candidate) && map.at_point(previous) == Some(0) {
            positions.push(candidate);
            if positions.len() == 3 {
                break;
            }
        }
    }
    positions
}

/// Pixels visited by a branch trace, in visiting order.
#[derive(Clone, Debug, Default)]
pub struct Trace {
    /// Last pixel added while tracing each branch.
    pub ends: Vec<Point>,
    visited: Vec<Point>,
    seen: HashSet<Point>,
}

impl Trace {
    fn visit(&mut self, p: Point) {
        if self.seen.insert(p) {
            self.visited.push(p);
        }
    }

    /// Returns true when `p` was visited, the base included.
    pub fn contains(&self, p: Point) -> bool {
        self.seen.contains(&p)
    }

    /// Visited pixels in order, starting with the base.
    pub fn visited(&self) -> &[Point] {
        &self.visited
    }
}

/// Walks every branch breadth first for `steps` rings of neighbours.
///
/// Pixels already visited, start positions of other branches and pixels of
/// the current front are never revisited. Each branch records the last pixel
/// added to the walk as its end.
pub fn trace_branches(map: &BinaryImage, base: Point, starts: &[Point], steps: usize) -> Trace {
    walk(map, base, starts, steps, |_| false).0
}

/// Returns true when a walk of `steps` rings from `base` reaches `target`.
pub fn reaches(map: &BinaryImage, base: Point, target: Point, steps: usize) -> bool {
    let starts = starting_positions(map, base);
    walk(map, base, &starts, steps, |p| p == target).1
}

/// Shared breadth-first walk; stops early once `stop` accepts a pixel.
fn walk(
    map: &BinaryImage,
    base: Point,
    starts: &[Point],
    steps: usize,
    mut stop: impl FnMut(Point) -> bool,
) -> (Trace, bool) {
    let mut trace = Trace::default();
    trace.visit(base);
    let start_set: HashSet<Point> = starts.iter().copied().collect();

    for &start in starts {
        trace.visit(start);
        if stop(start) {
            return (trace, true);
        }
        let mut last = start;
        let mut front = vec![start];
        for _ in 0..steps {
            let mut next: Vec<Point> = Vec::new();
            for &current in &front {
                for &(dx, dy) in &RING {
                    let p = current + Point::new(dx, dy);
                    if trace.contains(p)
                        || start_set.contains(&p)
                        || next.contains(&p)
                        || front.contains(&p)
                        || !is_ridge(map, p)
                    {
                        continue;
                    }
                    if stop(p) {
                        return (trace, true);
                    }
                    next.push(p);
                }
            }
            for &p in &next {
                trace.visit(p);
                last = p;
            }
            if next.is_empty() {
                break;
            }
            front = next;
        }
        trace.ends.push(last);
    }
    (trace, false)
}

/// Probes `bound` pixels from `pos` along `direction` for a ridge that is not
/// part of `own`, checking the probe pixel and then its ring.
pub fn probe_ridge(map: &BinaryImage, pos: Point, bound: i32, direction: f32, own: &Trace) -> Probe {
    let (s, c) = direction.sin_cos();
    let probe = Point::new(
        pos.x + (bound as f32 * c) as i32,
        pos.y + (bound as f32 * s) as i32,
    );
    if !map.contains(probe.x as i64, probe.y as i64) {
        return Probe::OffImage;
    }
    let usable = |p: Point| is_ridge(map, p) && !own.contains(p);
    if usable(probe) {
        return Probe::Ridge(probe);
    }
    RING.iter()
        .map(|&(dx, dy)| probe + Point::new(dx, dy))
        .find(|&p| usable(p))
        .map_or(Probe::NoRidge, Probe::Ridge)
}

/// Slides from `ridge` along skeleton pixels as long as a ring neighbour is
/// strictly closer to `pos`; returns the final pixel and its distance.
pub fn closest_ridge(map: &BinaryImage, pos: Point, ridge: Point) -> (Point, f32) {
    let mut best = ridge;
    let mut distance = pos.distance(ridge);
    loop {
        let mut moved = false;
        for &(dx, dy) in &RING {
            let around = best + Point::new(dx, dy);
            if !is_ridge(map, around) {
                continue;
            }
            let d = pos.distance(around);
            if d < distance {
                distance = d;
                best = around;
                moved = true;
            }
        }
        if !moved {
            return (best, distance);
        }
    }
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
    fn starting_positions_follow_ring_transitions() {
        let map = skeleton(&[
            ".....", //
            ".#...", //
            "..#..", //
            "..###", //
            ".....",
        ]);
        let starts = starting_positions(&map, Point::new(2, 2));
        // E of base is 0; SE and S are adjacent, only the first in ring order after a 0 counts
        assert_eq!(starts, vec![Point::new(1, 1), Point::new(2, 3)]);
    }

    #[test]
    fn trace_follows_a_straight_branch() {
        let map = skeleton(&["..........", "..........", "##########", ".........."]);
        let base = Point::new(0, 2);
        let starts = starting_positions(&map, base);
        assert_eq!(starts, vec![Point::new(1, 2)]);
        let trace = trace_branches(&map, base, &starts, 4);
        assert_eq!(trace.ends, vec![Point::new(5, 2)]);
        assert!(trace.contains(base));
        assert_eq!(trace.visited().len(), 6);
    }

    #[test]
    fn reaches_stops_at_step_limit() {
        let map = skeleton(&["..........", "##########", ".........."]);
        let base = Point::new(0, 1);
        assert!(reaches(&map, base, Point::new(4, 1), 3));
        assert!(!reaches(&map, base, Point::new(5, 1), 3));
        assert!(reaches(&map, base, Point::new(1, 1), 0));
    }

    #[test]
    fn probe_reports_off_image_and_ridges() {
        let map = skeleton(&[".....", ".....", "#####", ".....", "....."]);
        let own = Trace::default();
        let down = std::f32::consts::FRAC_PI_2;
        assert_eq!(probe_ridge(&map, Point::new(2, 0), 2, down, &own), Probe::Ridge(Point::new(2, 2)));
        assert_eq!(probe_ridge(&map, Point::new(2, 0), 9, down, &own), Probe::OffImage);
        assert_eq!(probe_ridge(&map, Point::new(2, 4), 0, down, &own), Probe::NoRidge);
    }

    #[test]
    fn closest_ridge_descends_toward_position() {
        let map = skeleton(&["#......", ".#.....", "..#....", "...####", "......."]);
        let (p, d) = closest_ridge(&map, Point::new(0, 4), Point::new(6, 3));
        assert_eq!(p, Point::new(2, 2));
        assert!((d - 8f32.sqrt()).abs() < 1e-5);
    }
}
