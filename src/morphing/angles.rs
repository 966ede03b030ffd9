//! Discrete angle grids for the rotation searches.

use crate::util::{FpMorphError, FpMorphResult};

/// Evenly spaced angles, in whatever unit the caller works in.
#[derive(Clone, Debug, PartialEq)]
pub struct AngleGrid {
    min: f32,
    step: f32,
    len: usize,
}

impl AngleGrid {
    /// Grid over `[min, max]`; `max` is included when the step lands on it.
    pub fn inclusive(min: f32, max: f32, step: f32) -> FpMorphResult<Self> {
        Self::build(min, max, step, true)
    }

    /// Grid over `[min, max)`.
    pub fn half_open(min: f32, max: f32, step: f32) -> FpMorphResult<Self> {
        Self::build(min, max, step, false)
    }

    fn build(min: f32, max: f32, step: f32, inclusive: bool) -> FpMorphResult<Self> {
        if !min.is_finite() || !max.is_finite() || !step.is_finite() {
            return Err(FpMorphError::InvalidAngleGrid {
                reason: "non-finite angle grid parameters",
            });
        }
        if step <= 0.0 {
            return Err(FpMorphError::InvalidAngleGrid {
                reason: "step must be > 0",
            });
        }
        if max < min || (!inclusive && max == min) {
            return Err(FpMorphError::InvalidAngleGrid {
                reason: "max must not be below min",
            });
        }

        // Tolerates accumulated rounding so that e.g. -90 + 20 * 9 still hits 90.
        let slack = step * 1e-4;
        let mut len = 0usize;
        loop {
            let angle = min + (len as f32) * step;
            let inside = if inclusive {
                angle <= max + slack
            } else {
                angle < max - slack
            };
            if !inside {
                break;
            }
            len += 1;
        }
        if len == 0 {
            return Err(FpMorphError::InvalidAngleGrid {
                reason: "angle grid produced no samples",
            });
        }
        Ok(Self { min, step, len })
    }

    /// Returns the number of discrete angles in the grid.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the grid has no angles.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the grid step.
    pub fn step(&self) -> f32 {
        self.step
    }

    /// Returns the angle for the given index.
    pub fn angle_at(&self, idx: usize) -> f32 {
        debug_assert!(idx < self.len);
        self.min + (idx as f32) * self.step
    }

    /// Iterates over all angles in the grid.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.len).map(|idx| self.angle_at(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn inclusive_grid_reaches_both_ends() {
        let grid = AngleGrid::inclusive(-90.0, 90.0, 9.0).unwrap();
        assert_eq!(grid.len(), 21);
        assert_eq!(grid.angle_at(0), -90.0);
        assert!((grid.angle_at(20) - 90.0).abs() < 1e-4);
        assert!((grid.angle_at(10)).abs() < 1e-4);
    }

    #[test]
    fn half_open_grid_excludes_max() {
        let grid = AngleGrid::half_open(0.0, PI, PI / 60.0).unwrap();
        assert_eq!(grid.len(), 60);
        assert!(grid.iter().all(|a| a < PI));
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(AngleGrid::inclusive(0.0, 10.0, 0.0).is_err());
        assert!(AngleGrid::inclusive(10.0, 0.0, 1.0).is_err());
        assert!(AngleGrid::half_open(0.0, 0.0, 1.0).is_err());
        assert!(AngleGrid::inclusive(f32::NAN, 1.0, 1.0).is_err());
        assert_eq!(AngleGrid::inclusive(5.0, 5.0, 1.0).unwrap().len(), 1);
    }
}
