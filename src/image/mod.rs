//! Image views, owned sample grids and the filters built on them.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows. `Grid` is the owned,
//! contiguous counterpart used for every derived field of a fingerprint; it
//! may be empty (0x0) so a fully-background region can flow through the
//! pipeline without special cases.

use crate::util::{FpMorphError, FpMorphResult};
use std::ops::{Index, IndexMut};

pub mod filter;
mod geometry;
#[cfg(feature = "image-io")]
pub mod io;
pub mod rotate;

pub use geometry::{Point, Rect};

/// Single-channel floating point image with samples in [0, 1].
pub type Image = Grid<f32>;
/// Binary image holding 0/1 samples.
pub type BinaryImage = Grid<u8>;
/// Three-channel floating point image, channels in RGB order.
pub type RgbImage = Grid<[f32; 3]>;

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> FpMorphResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> FpMorphResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(FpMorphError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// Returns a zero-copy view of `rect` into the same backing buffer.
    pub fn roi(&self, rect: Rect) -> FpMorphResult<ImageView<'a, T>> {
        if rect.is_empty() {
            return Err(FpMorphError::InvalidDimensions {
                width: rect.width,
                height: rect.height,
            });
        }
        if rect.right() > self.width || rect.bottom() > self.height {
            return Err(rect.out_of_bounds(self.width, self.height));
        }
        let start = rect.y * self.stride + rect.x;
        let data = self
            .data
            .get(start..)
            .ok_or(FpMorphError::BufferTooSmall {
                needed: start.saturating_add(1),
                got: self.data.len(),
            })?;
        ImageView::new(data, rect.width, rect.height, self.stride)
    }
}

impl<T: Copy> ImageView<'_, T> {
    /// Copies the view into an owned contiguous grid.
    pub fn to_grid(&self) -> Grid<T> {
        let mut data = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            let start = y * self.stride;
            data.extend_from_slice(&self.data[start..start + self.width]);
        }
        Grid {
            data,
            width: self.width,
            height: self.height,
        }
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> FpMorphResult<usize> {
    if width == 0 || height == 0 {
        return Err(FpMorphError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(FpMorphError::InvalidStride { width, stride });
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(FpMorphError::InvalidDimensions { width, height })
}

/// Owned contiguous 2D grid of samples, indexed as `grid[(x, y)]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Grid<T> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Copy> Grid<T> {
    /// Creates a grid filled with `value`.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    /// Wraps a row-major buffer of exactly `width * height` samples.
    pub fn from_vec(data: Vec<T>, width: usize, height: usize) -> FpMorphResult<Self> {
        let needed = width
            .checked_mul(height)
            .ok_or(FpMorphError::InvalidDimensions { width, height })?;
        if data.len() < needed {
            return Err(FpMorphError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        if data.len() > needed {
            return Err(FpMorphError::InvalidDimensions { width, height });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Builds a grid by evaluating `f(x, y)` for every sample.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Creates a 0x0 grid.
    pub fn default_empty() -> Self {
        Self {
            data: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    /// Returns the grid width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the grid height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns `(width, height)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Returns true when the grid holds no samples.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the row-major samples.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Returns the row-major samples mutably.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the grid and returns its buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Returns the sample at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.width + x).copied()
    }

    /// Returns the sample at signed coordinates, `None` outside the grid.
    pub fn get_signed(&self, x: i64, y: i64) -> Option<T> {
        if x < 0 || y < 0 {
            return None;
        }
        self.get(x as usize, y as usize)
    }

    /// Returns the sample at a point, `None` outside the grid.
    pub fn at_point(&self, p: Point) -> Option<T> {
        self.get_signed(p.x as i64, p.y as i64)
    }

    /// Returns true when signed coordinates address a sample.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Returns row `y`.
    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Borrows the grid as a strided view; fails for empty grids.
    pub fn view(&self) -> FpMorphResult<ImageView<'_, T>> {
        ImageView::from_slice(&self.data, self.width, self.height)
    }

    /// Returns a new grid with `f` applied to every sample.
    pub fn map<U: Copy>(&self, f: impl FnMut(T) -> U) -> Grid<U> {
        Grid {
            data: self.data.iter().copied().map(f).collect(),
            width: self.width,
            height: self.height,
        }
    }

    /// Copies `rect` out of the grid. Empty rectangles yield an empty grid.
    pub fn crop(&self, rect: Rect) -> FpMorphResult<Self> {
        if rect.right() > self.width || rect.bottom() > self.height {
            return Err(rect.out_of_bounds(self.width, self.height));
        }
        if rect.is_empty() {
            return Ok(Self::default_empty());
        }
        Ok(Self::from_fn(rect.width, rect.height, |x, y| {
            self[(rect.x + x, rect.y + y)]
        }))
    }

    /// Copies a rectangle given in signed coordinates, filling samples
    /// outside the grid with `fill`.
    pub fn crop_padded(&self, x0: i64, y0: i64, width: usize, height: usize, fill: T) -> Self {
        Self::from_fn(width, height, |x, y| {
            self.get_signed(x0 + x as i64, y0 + y as i64).unwrap_or(fill)
        })
    }

    /// Writes `value` into every sample of `rect` that lies inside the grid.
    pub fn fill_rect(&mut self, rect: Rect, value: T) {
        let right = rect.right().min(self.width);
        let bottom = rect.bottom().min(self.height);
        for y in rect.y..bottom {
            for x in rect.x..right {
                self[(x, y)] = value;
            }
        }
    }
}

impl<T> Index<(usize, usize)> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &T {
        debug_assert!(x < self.width && y < self.height);
        &self.data[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        debug_assert!(x < self.width && y < self.height);
        &mut self.data[y * self.width + x]
    }
}

/// Relative span below which [`Grid::rescaled`] treats a grid as flat.
const FLAT_SPAN: f32 = 1e-5;

impl Grid<f32> {
    /// Scales an 8-bit view, such as a padded scanner buffer, into [0, 1].
    pub fn from_gray_view(view: ImageView<'_, u8>) -> Self {
        Self::from_fn(view.width(), view.height(), |x, y| {
            view.get(x, y).map_or(0.0, |&v| v as f32 / 255.0)
        })
    }

    /// Returns the smallest and largest sample, `None` when empty.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let first = *self.data.first()?;
        Some(
            self.data
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }

    /// Linearly rescales samples so they span [0, 1].
    ///
    /// A grid whose span is below `1e-5 * max(|hi|, 1)` counts as flat and
    /// maps to all zeros.
    pub fn rescaled(&self) -> Self {
        match self.min_max() {
            Some((lo, hi)) if hi - lo > FLAT_SPAN * hi.abs().max(1.0) => {
                self.map(|v| (v - lo) / (hi - lo))
            }
            _ => self.map(|_| 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_crop_copies_expected_samples() {
        let grid = Grid::from_fn(5, 4, |x, y| (y * 5 + x) as u8);
        let crop = grid.crop(Rect::new(1, 2, 3, 2)).unwrap();
        assert_eq!(crop.shape(), (3, 2));
        assert_eq!(crop.row(0), &[11, 12, 13]);
        assert_eq!(crop.row(1), &[16, 17, 18]);

        let empty = grid.crop(Rect::new(2, 2, 0, 0)).unwrap();
        assert!(empty.is_empty());

        let err = grid.crop(Rect::new(3, 3, 3, 3)).unwrap_err();
        assert!(matches!(err, FpMorphError::RoiOutOfBounds { .. }));
    }

    #[test]
    fn crop_padded_fills_outside_samples() {
        let grid = Grid::filled(2, 2, 1.0f32);
        let padded = grid.crop_padded(-1, 0, 4, 2, 0.5);
        assert_eq!(padded.row(0), &[0.5, 1.0, 1.0, 0.5]);
    }

    #[test]
    fn view_roundtrips_through_roi() {
        let grid = Grid::from_fn(4, 4, |x, y| (y * 4 + x) as u8);
        let view = grid.view().unwrap();
        let roi = view.roi(Rect::new(1, 1, 2, 2)).unwrap();
        assert_eq!(roi.stride(), 4);
        assert_eq!(roi.row(1).unwrap(), &[9u8, 10u8]);
        assert_eq!(roi.to_grid().data(), &[5, 6, 9, 10]);
        assert!(Grid::<u8>::default_empty().view().is_err());
    }

    #[test]
    fn gray_view_skips_row_padding() {
        let buffer = [0u8, 255, 9, 51, 102, 9];
        let view = ImageView::new(&buffer, 2, 2, 3).unwrap();
        let img = Grid::from_gray_view(view);
        assert_eq!(img.shape(), (2, 2));
        assert_eq!(img.data(), &[0.0, 1.0, 0.2, 0.4]);
    }

    #[test]
    fn rescaled_handles_constant_input() {
        let grid = Grid::from_vec(vec![2.0f32, 4.0, 6.0], 3, 1).unwrap();
        assert_eq!(grid.rescaled().data(), &[0.0, 0.5, 1.0]);
        assert_eq!(Grid::filled(2, 2, 3.0f32).rescaled().data(), &[0.0; 4]);

        // Round-off left by resampling a constant image stays flat.
        let residue = Grid::from_fn(4, 1, |x, _| 0.8 + x as f32 * 6e-8);
        assert_eq!(residue.rescaled().data(), &[0.0; 4]);
        let faint = Grid::from_fn(3, 1, |x, _| 0.5 + x as f32 * 0.005);
        let stretched = faint.rescaled();
        assert!((stretched[(2, 0)] - 1.0).abs() < 1e-5);
    }
}
