use nalgebra::SVector;

use crate::error::GridError;
use crate::{real, Real};

/// Cartesian index into a grid, ghost layer included (index 0 is a ghost).
pub type Index<const D: usize> = [usize; D];

/// Index space of `dims` interior cells plus one ghost cell per face per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid<const D: usize> {
    shape: [usize; D],
}

/// Where a quantity lives on the staggered grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Center,
    /// Lower face of the cell, normal to the given axis.
    Face(usize),
}

impl<const D: usize> Grid<D> {
    /// Two-dimensional layout of a 3x2 grid. `•` pressure at cell centres,
    /// `→` x-velocity on the lower x-face, `↑` y-velocity on the lower y-face.
    /// Index 0 and `n+1` on each axis are ghosts.
    ///
    /// ```text
    ///     ┆       ┆       ┆       ┆       ┆
    ///     → ghost →   ↑   →   ↑   → ghost →
    ///     ┆       ┆       ┆       ┆       ┆
    /// ┄┄┄┄┼───↑───┼───↑───┼───↑───┼───────┼┄┄┄
    ///     →   •   →   •   →   •   →       →
    ///     │       │       │       │       │
    /// ┄┄┄┄┼───↑───┼───↑───┼───↑───┼───────┼┄┄┄
    ///     →   •   →   •   →   •   →       →
    ///     │       │       │       │       │
    /// ┄┄┄┄┼───↑───┼───↑───┼───↑───┼───────┼┄┄┄
    ///     ┆ ghost ┆       ┆       ┆       ┆
    /// ```
    pub fn new(dims: [usize; D]) -> Result<Self, GridError> {
        if !(2..=3).contains(&D) {
            return Err(GridError::InvalidGridSize(format!(
                "only 2D and 3D grids are supported, got {D}D"
            )));
        }
        if let Some(axis) = dims.iter().position(|&n| n < 1) {
            return Err(GridError::InvalidGridSize(format!(
                "grid dimension along axis {axis} must be at least 1, got {dims:?}"
            )));
        }
        Ok(Self { shape: dims.map(|n| n + 2) })
    }

    pub(crate) fn from_shape(shape: [usize; D]) -> Self {
        Self { shape }
    }

    /// Interior cell counts.
    pub fn dims(&self) -> [usize; D] {
        self.shape.map(|n| n - 2)
    }

    /// Storage extents including ghosts.
    pub fn shape(&self) -> [usize; D] {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat storage offset, first axis fastest.
    #[inline]
    pub fn offset(&self, index: &Index<D>) -> usize {
        let mut k = 0;
        let mut stride = 1;
        for a in 0..D {
            k += index[a] * stride;
            stride *= self.shape[a];
        }
        k
    }

    #[inline]
    pub fn index_of(&self, mut k: usize) -> Index<D> {
        let mut index = [0; D];
        for a in 0..D {
            index[a] = k % self.shape[a];
            k /= self.shape[a];
        }
        index
    }

    /// Every index, ghosts included.
    pub fn all(&self) -> Region<D> {
        Region::new([0; D], self.shape)
    }

    /// Cells excluding the ghost layer.
    pub fn inside(&self) -> Region<D> {
        Region::new([1; D], self.shape.map(|n| n - 1))
    }

    /// Faces normal to `axis` strictly inside the domain (domain boundary faces excluded).
    pub fn inside_u(&self, axis: usize) -> Region<D> {
        let mut region = self.inside();
        region.lo[axis] = 2;
        region
    }

    /// Plane `at` across `axis`, full extent in the other axes.
    pub fn slice(&self, axis: usize, at: usize) -> Region<D> {
        self.all().at(axis, at)
    }

    /// Every interior dimension even and at least 4, so the halved level keeps two cells.
    pub fn is_coarsenable(&self) -> bool {
        self.dims().iter().all(|&n| n % 2 == 0 && n >= 4)
    }

    /// Grid with half the interior cells along every axis.
    pub fn coarsen(&self) -> Option<Self> {
        self.is_coarsenable()
            .then(|| Self::from_shape(self.shape.map(|n| 1 + n / 2)))
    }
}

/// Half-open box of indices `lo..hi` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region<const D: usize> {
    pub lo: Index<D>,
    pub hi: Index<D>,
}

impl<const D: usize> Region<D> {
    pub fn new(lo: Index<D>, hi: Index<D>) -> Self {
        Self { lo, hi }
    }

    /// Restricts `axis` to the single plane `v`.
    pub fn at(mut self, axis: usize, v: usize) -> Self {
        self.lo[axis] = v;
        self.hi[axis] = v + 1;
        self
    }

    #[inline]
    pub fn contains(&self, index: &Index<D>) -> bool {
        (0..D).all(|a| self.lo[a] <= index[a] && index[a] < self.hi[a])
    }

    pub fn len(&self) -> usize {
        (0..D).map(|a| self.hi[a].saturating_sub(self.lo[a])).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> RegionIter<D> {
        RegionIter {
            region: *self,
            next: (!self.is_empty()).then_some(self.lo),
        }
    }
}

impl<const D: usize> IntoIterator for Region<D> {
    type Item = Index<D>;
    type IntoIter = RegionIter<D>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct RegionIter<const D: usize> {
    region: Region<D>,
    next: Option<Index<D>>,
}

impl<const D: usize> Iterator for RegionIter<D> {
    type Item = Index<D>;

    fn next(&mut self) -> Option<Index<D>> {
        let current = self.next?;
        let mut following = current;
        let mut axis = 0;
        self.next = loop {
            if axis == D {
                break None;
            }
            following[axis] += 1;
            if following[axis] < self.region.hi[axis] {
                break Some(following);
            }
            following[axis] = self.region.lo[axis];
            axis += 1;
        };
        Some(current)
    }
}

/// Neighbour one cell up along `axis`.
#[inline]
pub fn plus<const D: usize>(mut index: Index<D>, axis: usize) -> Index<D> {
    index[axis] += 1;
    index
}

/// Neighbour one cell down along `axis`. Callers never pass index 0.
#[inline]
pub fn minus<const D: usize>(mut index: Index<D>, axis: usize) -> Index<D> {
    index[axis] -= 1;
    index
}

#[inline]
pub fn with_axis<const D: usize>(mut index: Index<D>, axis: usize, v: usize) -> Index<D> {
    index[axis] = v;
    index
}

/// Physical position of a cell centre or face. Cell `I` spans `[I-1, I]` on each axis.
#[inline]
pub fn loc<T: Real, const D: usize>(at: Location, index: &Index<D>) -> SVector<T, D> {
    SVector::from_fn(|a, _| {
        let centre = real::<T>(index[a] as f64 - 0.5);
        match at {
            Location::Face(i) if i == a => centre - real(0.5),
            _ => centre,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_creation() {
        let grid = Grid::new([5, 3]).unwrap();
        assert_eq!(grid.dims(), [5, 3]);
        assert_eq!(grid.shape(), [7, 5]);
        assert_eq!(grid.len(), 35);
        assert_eq!(grid.inside().len(), 15);
    }

    #[test]
    fn test_grid_creation_invalid_size() {
        assert!(Grid::new([0, 5]).is_err());
        assert!(Grid::new([5, 0]).is_err());
        assert!(Grid::new([4]).is_err());
    }

    #[test]
    fn test_offset_round_trip() {
        let grid = Grid::new([3, 4, 2]).unwrap();
        for k in 0..grid.len() {
            assert_eq!(grid.offset(&grid.index_of(k)), k);
        }
        assert_eq!(grid.offset(&[1, 0, 0]), 1);
        assert_eq!(grid.offset(&[0, 1, 0]), 5);
    }

    #[test]
    fn test_region_iteration_visits_every_index_once() {
        let grid = Grid::new([3, 2]).unwrap();
        let cells: Vec<_> = grid.inside().iter().collect();
        assert_eq!(cells.len(), 6);
        assert_eq!(cells[0], [1, 1]);
        assert_eq!(cells[1], [2, 1]);
        assert_eq!(cells[5], [3, 2]);
        assert!(cells.iter().all(|i| grid.inside().contains(i)));
    }

    #[test]
    fn test_inside_u_skips_boundary_face() {
        let grid = Grid::new([4, 4]).unwrap();
        let region = grid.inside_u(0);
        assert_eq!(region.lo, [2, 1]);
        assert_eq!(region.hi, [5, 5]);
        assert_eq!(grid.slice(1, 0).len(), 6);
    }

    #[test]
    fn test_coarsen() {
        let grid = Grid::new([8, 4]).unwrap();
        let coarse = grid.coarsen().unwrap();
        assert_eq!(coarse.dims(), [4, 2]);
        assert!(coarse.coarsen().is_none());
        assert!(Grid::new([6, 4]).unwrap().coarsen().is_some());
        assert!(Grid::new([5, 4]).unwrap().coarsen().is_none());
    }

    #[test]
    fn test_loc_is_staggered() {
        let centre: SVector<f64, 2> = loc(Location::Center, &[1, 1]);
        assert_relative_eq!(centre, SVector::<f64, 2>::new(0.5, 0.5));
        let face: SVector<f64, 2> = loc(Location::Face(0), &[1, 3]);
        assert_relative_eq!(face, SVector::<f64, 2>::new(0.0, 2.5));
    }
}
