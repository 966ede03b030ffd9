//! Minutiae and the adjacency bookkeeping used by the fake-minutiae filter.

use crate::image::Point;
use crate::util::math::angular_distance;
use std::collections::BTreeSet;
use std::fmt;

/// Kind of ridge discontinuity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MinutiaKind {
    /// A ridge that stops.
    Ending,
    /// A ridge that splits in two.
    Bifurcation,
}

impl MinutiaKind {
    /// The other kind.
    pub fn opposite(self) -> Self {
        match self {
            MinutiaKind::Ending => MinutiaKind::Bifurcation,
            MinutiaKind::Bifurcation => MinutiaKind::Ending,
        }
    }

    /// Numeric code used by record formats: 0 ending, 1 bifurcation.
    pub fn code(self) -> u8 {
        match self {
            MinutiaKind::Ending => 0,
            MinutiaKind::Bifurcation => 1,
        }
    }
}

impl fmt::Display for MinutiaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinutiaKind::Ending => f.write_str("ending"),
            MinutiaKind::Bifurcation => f.write_str("bifurcation"),
        }
    }
}

/// Partner identifiers split by the partner's kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Adjacency {
    endings: BTreeSet<usize>,
    bifurcations: BTreeSet<usize>,
}

impl Adjacency {
    fn set(&self, kind: MinutiaKind) -> &BTreeSet<usize> {
        match kind {
            MinutiaKind::Ending => &self.endings,
            MinutiaKind::Bifurcation => &self.bifurcations,
        }
    }

    /// Records partner `id` of the given kind.
    pub fn insert(&mut self, kind: MinutiaKind, id: usize) {
        match kind {
            MinutiaKind::Ending => self.endings.insert(id),
            MinutiaKind::Bifurcation => self.bifurcations.insert(id),
        };
    }

    /// Forgets partner `id` whatever its kind.
    pub fn remove(&mut self, id: usize) {
        self.endings.remove(&id);
        self.bifurcations.remove(&id);
    }

    /// Number of partners of the given kind.
    pub fn count(&self, kind: MinutiaKind) -> usize {
        self.set(kind).len()
    }

    /// Partner ids of the given kind in ascending order.
    pub fn ids(&self, kind: MinutiaKind) -> impl Iterator<Item = usize> + '_ {
        self.set(kind).iter().copied()
    }

    /// Returns true when no partner is recorded.
    pub fn is_empty(&self) -> bool {
        self.endings.is_empty() && self.bifurcations.is_empty()
    }

    /// Rewrites ids through `map`, dropping those it maps to `None`.
    pub(crate) fn remap(&mut self, map: impl Fn(usize) -> Option<usize>) {
        self.endings = self.endings.iter().filter_map(|&id| map(id)).collect();
        self.bifurcations = self.bifurcations.iter().filter_map(|&id| map(id)).collect();
    }
}

/// A ridge ending or bifurcation.
///
/// Adjacency sets hold indices into the list the minutia belongs to. Two
/// minutiae compare equal when position, kind and direction match; the
/// bookkeeping fields do not take part.
#[derive(Clone, Debug)]
pub struct Minutia {
    /// Pixel position in the owning image.
    pub position: Point,
    /// Direction in radians, y pointing down.
    pub direction: f32,
    /// Ridge tracing length used to estimate `direction`.
    pub threshold: f32,
    pub kind: MinutiaKind,
    /// Set when the minutia takes part in a suspicious structure.
    pub fake: bool,
    /// Partners facing this minutia across a ridge gap.
    pub facing: Adjacency,
    /// Partners reachable along the skeleton.
    pub connected: Adjacency,
}

impl Minutia {
    /// Default direction before estimation.
    pub const UNSET_DIRECTION: f32 = -1.0;
    /// Default tracing threshold before estimation.
    pub const DEFAULT_THRESHOLD: f32 = 10.0;

    /// Creates a minutia without adjacency.
    pub fn new(position: Point, direction: f32, threshold: f32, kind: MinutiaKind) -> Self {
        Self {
            position,
            direction,
            threshold,
            kind,
            fake: false,
            facing: Adjacency::default(),
            connected: Adjacency::default(),
        }
    }

    /// Returns a copy moved by `offset` with adjacency cleared.
    pub fn translated(&self, offset: Point) -> Self {
        Self::new(
            self.position + offset,
            self.direction,
            self.threshold,
            self.kind,
        )
    }

    /// Smallest angle between the two directions, in [0, pi].
    pub fn beta_with(&self, other: &Minutia) -> f32 {
        angular_distance(self.direction, other.direction)
    }

    /// Returns true when any adjacency was recorded.
    pub fn can_be_fake(&self) -> bool {
        !self.facing.is_empty() || !self.connected.is_empty()
    }

    /// Ending facing a bifurcation, or bifurcation connected to a
    /// bifurcation or facing an ending.
    pub fn is_fork(&self) -> bool {
        match self.kind {
            MinutiaKind::Ending => self.facing.count(MinutiaKind::Bifurcation) != 0,
            MinutiaKind::Bifurcation => {
                self.connected.count(MinutiaKind::Bifurcation) != 0
                    || self.facing.count(MinutiaKind::Ending) != 0
            }
        }
    }

    /// Connected to a minutia of the opposite kind.
    pub fn is_bur(&self) -> bool {
        self.connected.count(self.kind.opposite()) != 0
    }
}

impl PartialEq for Minutia {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
            && self.kind == other.kind
            && self.direction == other.direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn equality_ignores_bookkeeping() {
        let mut a = Minutia::new(Point::new(3, 4), 1.0, 7.0, MinutiaKind::Ending);
        let b = Minutia::new(Point::new(3, 4), 1.0, 12.0, MinutiaKind::Ending);
        a.fake = true;
        a.facing.insert(MinutiaKind::Ending, 2);
        assert_eq!(a, b);
        let c = Minutia::new(Point::new(3, 4), 1.0, 7.0, MinutiaKind::Bifurcation);
        assert_ne!(a, c);
    }

    #[test]
    fn beta_wraps_around_full_turn() {
        let a = Minutia::new(Point::default(), 0.1, 7.0, MinutiaKind::Ending);
        let b = Minutia::new(Point::default(), 2.0 * PI - 0.1, 7.0, MinutiaKind::Ending);
        assert!((a.beta_with(&b) - 0.2).abs() < 1e-5);
    }

    #[test]
    fn fork_and_bur_predicates() {
        let mut ending = Minutia::new(Point::default(), 0.0, 7.0, MinutiaKind::Ending);
        assert!(!ending.is_fork() && !ending.is_bur());
        ending.facing.insert(MinutiaKind::Bifurcation, 1);
        assert!(ending.is_fork());
        ending.connected.insert(MinutiaKind::Bifurcation, 1);
        assert!(ending.is_bur());

        let mut bif = Minutia::new(Point::default(), 0.0, 7.0, MinutiaKind::Bifurcation);
        bif.connected.insert(MinutiaKind::Bifurcation, 3);
        assert!(bif.is_fork());
        assert!(!bif.is_bur());
    }

    #[test]
    fn adjacency_remap_drops_missing_ids() {
        let mut adj = Adjacency::default();
        adj.insert(MinutiaKind::Ending, 1);
        adj.insert(MinutiaKind::Bifurcation, 4);
        adj.remap(|id| (id == 4).then_some(0));
        assert_eq!(adj.count(MinutiaKind::Ending), 0);
        assert_eq!(adj.ids(MinutiaKind::Bifurcation).collect::<Vec<_>>(), vec![0]);
    }
}
