//! Foreground region correction and trimming of a fingerprint to it.

use crate::fingerprint::Fingerprint;
use crate::image::{Grid, Rect};
use crate::trace::{trace_event, trace_span};
use crate::util::FpMorphResult;

/// Fills gaps in a block-level foreground grid and returns the bounding box
/// of the result as inclusive block indices `(x0, y0, x1, y1)`.
///
/// A row pass marks every block between the first and last foreground block
/// of each row, then a column pass does the same per column. Returns `None`
/// when no block is foreground.
pub fn correct_segmentation(blocks: &mut Grid<bool>) -> Option<(usize, usize, usize, usize)> {
    let (cols, rows) = blocks.shape();
    for y in 0..rows {
        let marked: Vec<usize> = (0..cols).filter(|&x| blocks[(x, y)]).collect();
        if let (Some(&lo), Some(&hi)) = (marked.first(), marked.last()) {
            for x in lo..=hi {
                blocks[(x, y)] = true;
            }
        }
    }
    for x in 0..cols {
        let marked: Vec<usize> = (0..rows).filter(|&y| blocks[(x, y)]).collect();
        if let (Some(&lo), Some(&hi)) = (marked.first(), marked.last()) {
            for y in lo..=hi {
                blocks[(x, y)] = true;
            }
        }
    }

    let mut bbox: Option<(usize, usize, usize, usize)> = None;
    for y in 0..rows {
        for x in 0..cols {
            if !blocks[(x, y)] {
                continue;
            }
            bbox = Some(match bbox {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }
    bbox
}

/// Pixel rectangle covered by inclusive block indices, clipped to the image.
pub(crate) fn block_rect(
    (x0, y0, x1, y1): (usize, usize, usize, usize),
    block_size: usize,
    width: usize,
    height: usize,
) -> Rect {
    Rect::from_corners(
        x0 * block_size,
        y0 * block_size,
        ((x1 + 1) * block_size).min(width),
        ((y1 + 1) * block_size).min(height),
    )
}

/// Trims the raw, normalized and orientation data of a fingerprint to its
/// foreground region and replaces the orientation validity with the mask.
///
/// Requires the normalize, orientation and frequency stages to have run.
pub fn apply_region_mask(fingerprint: &mut Fingerprint) -> FpMorphResult<()> {
    let mask = fingerprint.region_mask()?.clone();
    let region = mask.region();
    let _span = trace_span!(
        "apply_region_mask",
        x = region.x,
        y = region.y,
        width = region.width,
        height = region.height
    )
    .entered();

    let raw = fingerprint.raw().crop(region)?;
    let normalized = fingerprint.normalized()?.crop(region)?;
    let orientations = fingerprint
        .orientations()?
        .crop(region)?
        .with_validity(mask.mask().clone())?;

    fingerprint
        .set_raw(raw)
        .set_normalized(normalized)
        .set_orientations(orientations);
    trace_event!("region_applied", foreground_blocks = fingerprint.foreground_blocks()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&str]) -> Grid<bool> {
        let width = rows[0].len();
        Grid::from_fn(width, rows.len(), |x, y| rows[y].as_bytes()[x] == b'#')
    }

    #[test]
    fn fills_row_then_column_gaps() {
        let mut blocks = grid(&[
            "......", //
            ".#..#.", //
            "......", //
            "..#...", //
            "......",
        ]);
        let bbox = correct_segmentation(&mut blocks);
        assert_eq!(bbox, Some((1, 1, 4, 3)));
        assert!(blocks[(2, 1)] && blocks[(3, 1)]);
        // column 2 spans rows 1..=3 after the row pass
        assert!(blocks[(2, 2)]);
        assert!(!blocks[(1, 3)]);
        assert!(!blocks[(0, 0)]);
    }

    #[test]
    fn empty_grid_has_no_region() {
        let mut blocks = grid(&["...", "..."]);
        assert_eq!(correct_segmentation(&mut blocks), None);
    }

    #[test]
    fn block_rect_clips_last_block() {
        let rect = block_rect((1, 0, 2, 1), 8, 20, 30);
        assert_eq!(rect, Rect::new(8, 0, 12, 16));
    }
}
