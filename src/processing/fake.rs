//! Detection and removal of minutiae produced by broken ridges, forks and
//! spurs of the skeleton.
//!
//! Minutiae live in an arena addressed by their index in the input list.
//! Deleting a minutia tombstones its slot and strips its id from every live
//! adjacency set, so no id is invalidated while the repair passes run; a
//! final compaction rebuilds the list with remapped adjacency.

use crate::fingerprint::{Minutia, MinutiaKind};
use crate::image::BinaryImage;
use crate::processing::ridge::reaches;
use crate::trace::{trace_event, trace_span};
use std::f32::consts::FRAC_PI_2;

/// Fake-minutiae filter parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FakeFilterConfig {
    /// Lists longer than this are left untouched.
    pub max_minutiae: usize,
}

impl Default for FakeFilterConfig {
    fn default() -> Self {
        Self { max_minutiae: 65 }
    }
}

/// Trace length bounding the connectivity test from `m`.
fn connection_steps(m: &Minutia) -> usize {
    let length = match m.kind {
        MinutiaKind::Bifurcation => m.threshold * 2.0,
        MinutiaKind::Ending => m.threshold,
    };
    length.max(0.0).ceil() as usize
}

/// Flags facing and connected pairs, recording each pair on both minutiae.
///
/// Lists longer than the configured cutoff are left untouched. Previous
/// flags and adjacency are cleared first.
pub fn find_fake_minutiae(skeleton: &BinaryImage, minutiae: &mut [Minutia], cfg: &FakeFilterConfig) {
    if minutiae.len() > cfg.max_minutiae {
        return;
    }
    for m in minutiae.iter_mut() {
        *m = Minutia::new(m.position, m.direction, m.threshold, m.kind);
    }
    for a in 0..minutiae.len() {
        for b in 0..minutiae.len() {
            if a == b {
                continue;
            }
            let (ma, mb) = (&minutiae[a], &minutiae[b]);
            let connected = reaches(skeleton, ma.position, mb.position, connection_steps(ma));
            let facing = !connected
                && ma.position.distance(mb.position) < ma.threshold * 2.0
                && ma.beta_with(mb) > FRAC_PI_2;
            let (kind_a, kind_b) = (ma.kind, mb.kind);
            if facing {
                minutiae[a].facing.insert(kind_b, b);
                minutiae[b].facing.insert(kind_a, a);
            } else if connected {
                minutiae[a].connected.insert(kind_b, b);
                minutiae[b].connected.insert(kind_a, a);
            } else {
                continue;
            }
            minutiae[a].fake = true;
            minutiae[b].fake = true;
        }
    }
}

struct Arena {
    slots: Vec<Minutia>,
    alive: Vec<bool>,
}

impl Arena {
    fn new(slots: Vec<Minutia>) -> Self {
        let alive = vec![true; slots.len()];
        Self { slots, alive }
    }

    fn live(&self, id: usize) -> Option<&Minutia> {
        self.alive[id].then(|| &self.slots[id])
    }

    fn delete(&mut self, ids: &[usize]) {
        for &id in ids {
            self.alive[id] = false;
        }
        for (slot, alive) in self.slots.iter_mut().zip(&self.alive) {
            if !alive {
                continue;
            }
            for &id in ids {
                slot.facing.remove(id);
                slot.connected.remove(id);
            }
        }
    }

    /// Facing partner of `kind` with the largest direction difference; the
    /// first one wins ties.
    fn most_divergent_facing(&self, id: usize, kind: MinutiaKind) -> Option<usize> {
        let m = &self.slots[id];
        let mut best: Option<(usize, f32)> = None;
        for partner in m.facing.ids(kind) {
            let beta = m.beta_with(&self.slots[partner]);
            if best.map_or(true, |(_, b)| beta > b) {
                best = Some((partner, beta));
            }
        }
        best.map(|(partner, _)| partner)
    }

    fn repair_broken_ridges(&mut self) {
        let fake_ending_facing = |m: &Minutia| {
            (m.fake && m.kind == MinutiaKind::Ending).then(|| m.facing.count(MinutiaKind::Ending))
        };
        let mut level = (0..self.slots.len())
            .filter_map(|id| self.live(id).and_then(fake_ending_facing))
            .max()
            .unwrap_or(0);
        while level > 0 {
            for id in 0..self.slots.len() {
                if self.live(id).and_then(fake_ending_facing) != Some(level) {
                    continue;
                }
                let mut doomed: Vec<usize> = self
                    .most_divergent_facing(id, MinutiaKind::Ending)
                    .into_iter()
                    .collect();
                doomed.push(id);
                self.delete(&doomed);
            }
            level -= 1;
        }
    }

    fn repair_forks(&mut self) {
        for id in 0..self.slots.len() {
            let Some(m) = self.live(id) else { continue };
            if !(m.fake && m.is_fork()) {
                continue;
            }
            let mut doomed = Vec::new();
            match m.kind {
                MinutiaKind::Ending => {
                    doomed.extend(self.most_divergent_facing(id, MinutiaKind::Bifurcation));
                }
                MinutiaKind::Bifurcation => {
                    doomed.extend(m.connected.ids(MinutiaKind::Bifurcation));
                    doomed.extend(self.most_divergent_facing(id, MinutiaKind::Ending));
                }
            }
            doomed.push(id);
            self.delete(&doomed);
        }
    }

    fn remove_burs(&mut self) {
        for id in 0..self.slots.len() {
            let Some(m) = self.live(id) else { continue };
            if !(m.fake && m.is_bur()) {
                continue;
            }
            let mut doomed: Vec<usize> = m.connected.ids(m.kind.opposite()).collect();
            doomed.push(id);
            self.delete(&doomed);
        }
    }

    fn compact(self) -> Vec<Minutia> {
        let mut remap = vec![None; self.slots.len()];
        let mut next = 0;
        for (id, &alive) in self.alive.iter().enumerate() {
            if alive {
                remap[id] = Some(next);
                next += 1;
            }
        }
        self.slots
            .into_iter()
            .zip(self.alive)
            .filter(|(_, alive)| *alive)
            .map(|(mut m, _)| {
                m.facing.remap(|id| remap.get(id).copied().flatten());
                m.connected.remap(|id| remap.get(id).copied().flatten());
                m
            })
            .collect()
    }
}

/// Repairs broken ridges, then forks, then burs, and returns the survivors.
///
/// Broken ridges are handled starting from the fake endings with the most
/// facing endings: each removes its most divergent facing ending and itself.
/// A fake fork ending removes its most divergent facing bifurcation and
/// itself; a fake fork bifurcation removes its connected bifurcations, its
/// most divergent facing ending and itself. A fake bur removes its connected
/// partners of the opposite kind and itself.
pub fn remove_fake_minutiae(minutiae: Vec<Minutia>) -> Vec<Minutia> {
    let mut arena = Arena::new(minutiae);
    arena.repair_broken_ridges();
    arena.repair_forks();
    arena.remove_burs();
    arena.compact()
}

/// Runs detection followed by removal.
pub fn filter_fake_minutiae(
    skeleton: &BinaryImage,
    mut minutiae: Vec<Minutia>,
    cfg: &FakeFilterConfig,
) -> Vec<Minutia> {
    let _span = trace_span!("fake_minutiae", count = minutiae.len()).entered();
    let before = minutiae.len();
    find_fake_minutiae(skeleton, &mut minutiae, cfg);
    let flagged = minutiae.iter().filter(|m| m.fake).count();
    let kept = remove_fake_minutiae(minutiae);
    trace_event!("fake_minutiae", before = before, flagged = flagged, after = kept.len());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Grid, Point};
    use std::f32::consts::PI;

    fn minutia(x: i32, y: i32, direction: f32, kind: MinutiaKind) -> Minutia {
        Minutia::new(Point::new(x, y), direction, 7.0, kind)
    }

    #[test]
    fn facing_endings_across_a_gap_are_removed() {
        let skeleton = Grid::filled(40, 20, 0u8);
        let list = vec![
            minutia(10, 10, 0.0, MinutiaKind::Ending),
            minutia(16, 10, PI, MinutiaKind::Ending),
            minutia(30, 10, 0.5, MinutiaKind::Bifurcation),
        ];
        let kept = filter_fake_minutiae(&skeleton, list, &FakeFilterConfig::default());
        assert_eq!(kept, vec![minutia(30, 10, 0.5, MinutiaKind::Bifurcation)]);
        assert!(!kept[0].fake);
    }

    #[test]
    fn connected_ending_and_bifurcation_form_a_bur() {
        let skeleton = Grid::from_fn(30, 9, |x, y| u8::from(y == 4 && (5..=15).contains(&x)));
        let list = vec![
            minutia(5, 4, PI, MinutiaKind::Bifurcation),
            minutia(10, 4, 0.0, MinutiaKind::Ending),
        ];
        let mut flagged = list.clone();
        find_fake_minutiae(&skeleton, &mut flagged, &FakeFilterConfig::default());
        assert!(flagged[0].connected.count(MinutiaKind::Ending) == 1);
        assert!(flagged[1].is_bur());
        assert!(remove_fake_minutiae(flagged).is_empty());
    }

    #[test]
    fn cleaned_list_is_stable() {
        let skeleton = Grid::filled(60, 30, 0u8);
        let list = vec![
            minutia(5, 5, 0.0, MinutiaKind::Ending),
            minutia(9, 5, PI, MinutiaKind::Ending),
            minutia(40, 20, 1.0, MinutiaKind::Bifurcation),
            minutia(50, 8, 2.0, MinutiaKind::Ending),
        ];
        let cfg = FakeFilterConfig::default();
        let once = filter_fake_minutiae(&skeleton, list, &cfg);
        assert_eq!(once.len(), 2);
        let twice = filter_fake_minutiae(&skeleton, once.clone(), &cfg);
        assert_eq!(twice, once);
    }

    #[test]
    fn long_lists_are_left_alone() {
        let skeleton = Grid::filled(200, 10, 0u8);
        let list: Vec<_> = (0..66)
            .map(|i| minutia(i * 2, 5, if i % 2 == 0 { 0.0 } else { PI }, MinutiaKind::Ending))
            .collect();
        let mut flagged = list.clone();
        find_fake_minutiae(&skeleton, &mut flagged, &FakeFilterConfig::default());
        assert!(flagged.iter().all(|m| !m.fake));
    }

    #[test]
    fn compaction_remaps_adjacency() {
        let mut list = vec![
            minutia(0, 0, 0.0, MinutiaKind::Ending),
            minutia(50, 0, 0.0, MinutiaKind::Bifurcation),
            minutia(90, 0, 0.0, MinutiaKind::Bifurcation),
        ];
        // 1 and 2 face each other without forming a removable structure
        list[1].facing.insert(MinutiaKind::Bifurcation, 2);
        list[2].facing.insert(MinutiaKind::Bifurcation, 1);
        list[1].fake = true;
        list[2].fake = true;
        list[0].fake = true;
        list[0].connected.insert(MinutiaKind::Ending, 0);
        let mut arena = Arena::new(list);
        arena.delete(&[0]);
        let kept = arena.compact();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].facing.ids(MinutiaKind::Bifurcation).collect::<Vec<_>>(), vec![1]);
        assert_eq!(kept[1].facing.ids(MinutiaKind::Bifurcation).collect::<Vec<_>>(), vec![0]);
    }
}
