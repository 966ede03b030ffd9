//! Global binarization and Zhang-Suen skeletonization.

use crate::image::{BinaryImage, Image};
use crate::trace::{trace_event, trace_span};

/// Gray level (0-255) a sample must exceed to become foreground.
pub const BINARIZE_LEVEL: u8 = 80;

/// Maps `floor(v * 255) > 80` to 1 and everything else to 0.
pub fn binarize(enhanced: &Image) -> BinaryImage {
    enhanced.map(|v| {
        let level = (v * 255.0).floor().clamp(0.0, 255.0) as u8;
        u8::from(level > BINARIZE_LEVEL)
    })
}

/// Neighbours `p2..p9` clockwise from north.
#[inline]
fn neighbours(img: &BinaryImage, x: usize, y: usize) -> [u8; 8] {
    [
        img[(x, y - 1)],
        img[(x + 1, y - 1)],
        img[(x + 1, y)],
        img[(x + 1, y + 1)],
        img[(x, y + 1)],
        img[(x - 1, y + 1)],
        img[(x - 1, y)],
        img[(x - 1, y - 1)],
    ]
}

/// One subiteration; returns the number of removed pixels.
fn thinning_pass(img: &mut BinaryImage, second: bool) -> usize {
    let (width, height) = img.shape();
    if width < 3 || height < 3 {
        return 0;
    }
    let mut marked = Vec::new();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            if img[(x, y)] != 1 {
                continue;
            }
            let p = neighbours(img, x, y);
            let b: u8 = p.iter().sum();
            if !(2..=7).contains(&b) {
                continue;
            }
            let [p2, _, p4, _, p6, p7, p8, p9] = p;
            let a = (0..8).filter(|&i| p[i] == 0 && p[(i + 1) % 8] == 1).count();
            let (m1, m2) = if second {
                (p2 * p4 * p8, p2 * p6 * p8)
            } else {
                (p2 * p4 * p6, p4 * p6 * p8)
            };
            let n1 = p2 * p4 == 1 && p6 + p7 + p8 == 0;
            let n2 = p4 * p6 == 1 && p2 + p8 + p9 == 0;
            if (a == 1 && m1 == 0 && m2 == 0) || (a == 2 && (n1 || n2)) {
                marked.push((x, y));
            }
        }
    }
    for &(x, y) in &marked {
        img[(x, y)] = 0;
    }
    marked.len()
}

/// Thins the foreground (value 1) of a binary image to a one pixel wide
/// skeleton, repeating both subiterations until nothing changes.
///
/// Border pixels are never removed.
pub fn thin(binary: &BinaryImage) -> BinaryImage {
    let _span = trace_span!("thin", width = binary.width(), height = binary.height()).entered();
    let mut img = binary.clone();
    let mut iterations = 0usize;
    loop {
        iterations += 1;
        let removed = thinning_pass(&mut img, false) + thinning_pass(&mut img, true);
        if removed == 0 {
            break;
        }
    }
    trace_event!("thinned", iterations = iterations);
    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Grid;

    fn from_rows(rows: &[&str]) -> BinaryImage {
        let width = rows[0].len();
        Grid::from_fn(width, rows.len(), |x, y| u8::from(rows[y].as_bytes()[x] == b'#'))
    }

    #[test]
    fn binarize_uses_floor_of_gray_level() {
        let img = Grid::from_vec(vec![0.0, 80.5 / 255.0, 81.5 / 255.0, 1.0], 4, 1).unwrap();
        assert_eq!(binarize(&img).data(), &[0, 0, 1, 1]);
    }

    #[test]
    fn thick_bar_thins_to_single_line() {
        let img = from_rows(&[
            "..........",
            ".########.",
            ".########.",
            ".########.",
            "..........",
        ]);
        let out = thin(&img);
        for y in [0, 1, 3, 4] {
            assert!(out.row(y).iter().all(|&v| v == 0), "row {y}");
        }
        assert_eq!(out.row(2), &[0, 0, 1, 1, 1, 1, 1, 0, 0, 0]);
    }

    #[test]
    fn thinning_is_idempotent() {
        let img = from_rows(&[
            "............",
            ".####.......",
            ".#######....",
            "...######...",
            "....#####...",
            "....###.....",
            "............",
        ]);
        let once = thin(&img);
        assert_eq!(thin(&once), once);
    }
}
