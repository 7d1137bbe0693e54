use std::ops::{Index as IndexOp, IndexMut};

use crate::domain::grid::{Grid, Index};
use crate::Real;

/// Cell-centred scalar (pressure, divergence, distance). Ghost cells hold boundary values.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField<T, const D: usize> {
    grid: Grid<D>,
    data: Vec<T>,
}

impl<T: Real, const D: usize> ScalarField<T, D> {
    pub fn zeros(grid: Grid<D>) -> Self {
        Self::filled(grid, T::zero())
    }

    pub fn filled(grid: Grid<D>, value: T) -> Self {
        Self { grid, data: vec![value; grid.len()] }
    }

    pub fn grid(&self) -> &Grid<D> {
        &self.grid
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn copy_from(&mut self, other: &Self) {
        self.data.copy_from_slice(&other.data);
    }

    /// Sum of squares over interior cells.
    pub fn l2(&self) -> T {
        self.grid
            .inside()
            .iter()
            .fold(T::zero(), |s, i| s + self[i] * self[i])
    }

    /// Interior values, first axis fastest.
    pub fn interior(&self) -> Vec<T> {
        self.grid.inside().iter().map(|i| self[i]).collect()
    }
}

impl<T, const D: usize> IndexOp<Index<D>> for ScalarField<T, D> {
    type Output = T;

    #[inline]
    fn index(&self, index: Index<D>) -> &T {
        &self.data[self.grid.offset(&index)]
    }
}

impl<T, const D: usize> IndexMut<Index<D>> for ScalarField<T, D> {
    #[inline]
    fn index_mut(&mut self, index: Index<D>) -> &mut T {
        let k = self.grid.offset(&index);
        &mut self.data[k]
    }
}

/// Staggered multi-component field. Component `i` of a vector lives on the
/// lower face normal to axis `i`. A tensor field stores `D*D` components,
/// row `i` on the faces of axis `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField<T, const D: usize> {
    grid: Grid<D>,
    comps: Vec<Vec<T>>,
}

impl<T: Real, const D: usize> VectorField<T, D> {
    pub fn zeros(grid: Grid<D>) -> Self {
        Self::filled(grid, T::zero())
    }

    pub fn filled(grid: Grid<D>, value: T) -> Self {
        Self::with_components(grid, D, value)
    }

    /// `D x D` tensor per face, used for the first kernel moment.
    pub fn tensor(grid: Grid<D>) -> Self {
        Self::with_components(grid, D * D, T::zero())
    }

    fn with_components(grid: Grid<D>, n: usize, value: T) -> Self {
        Self { grid, comps: vec![vec![value; grid.len()]; n] }
    }

    pub fn grid(&self) -> &Grid<D> {
        &self.grid
    }

    pub fn ncomp(&self) -> usize {
        self.comps.len()
    }

    pub fn component(&self, i: usize) -> &[T] {
        &self.comps[i]
    }

    pub fn component_mut(&mut self, i: usize) -> &mut [T] {
        &mut self.comps[i]
    }

    pub fn fill(&mut self, value: T) {
        self.comps.iter_mut().for_each(|c| c.fill(value));
    }

    pub fn copy_from(&mut self, other: &Self) {
        for (dst, src) in self.comps.iter_mut().zip(&other.comps) {
            dst.copy_from_slice(src);
        }
    }

    #[inline]
    pub fn get(&self, index: &Index<D>, i: usize) -> T {
        self.comps[i][self.grid.offset(index)]
    }

    /// Tensor entry `(i, j)` at face `i` of `index`.
    #[inline]
    pub fn get_ij(&self, index: &Index<D>, i: usize, j: usize) -> T {
        self.comps[i * D + j][self.grid.offset(index)]
    }

    #[inline]
    pub fn set_ij(&mut self, index: &Index<D>, i: usize, j: usize, value: T) {
        let k = self.grid.offset(index);
        self.comps[i * D + j][k] = value;
    }
}

impl<T, const D: usize> IndexOp<(Index<D>, usize)> for VectorField<T, D> {
    type Output = T;

    #[inline]
    fn index(&self, (index, i): (Index<D>, usize)) -> &T {
        &self.comps[i][self.grid.offset(&index)]
    }
}

impl<T, const D: usize> IndexMut<(Index<D>, usize)> for VectorField<T, D> {
    #[inline]
    fn index_mut(&mut self, (index, i): (Index<D>, usize)) -> &mut T {
        let k = self.grid.offset(&index);
        &mut self.comps[i][k]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scalar_field_indexing() {
        let grid = Grid::new([3, 3]).unwrap();
        let mut p = ScalarField::<f64, 2>::zeros(grid);
        p[[2, 1]] = 4.0;
        assert_eq!(p.as_slice()[grid.offset(&[2, 1])], 4.0);
        assert_relative_eq!(p.l2(), 16.0);
    }

    #[test]
    fn test_l2_excludes_ghosts() {
        let grid = Grid::new([2, 2]).unwrap();
        let mut p = ScalarField::<f64, 2>::filled(grid, 1.0);
        p[[0, 0]] = 100.0;
        assert_relative_eq!(p.l2(), 4.0);
        assert_eq!(p.interior().len(), 4);
    }

    #[test]
    fn test_vector_and_tensor_fields() {
        let grid = Grid::new([2, 2, 2]).unwrap();
        let mut u = VectorField::<f64, 3>::zeros(grid);
        assert_eq!(u.ncomp(), 3);
        u[([1, 2, 1], 2)] = 1.5;
        assert_eq!(u.get(&[1, 2, 1], 2), 1.5);

        let mut mu1 = VectorField::<f64, 3>::tensor(grid);
        assert_eq!(mu1.ncomp(), 9);
        mu1.set_ij(&[1, 1, 1], 2, 0, 0.25);
        assert_eq!(mu1.get_ij(&[1, 1, 1], 2, 0), 0.25);
        assert_eq!(mu1.get_ij(&[1, 1, 1], 0, 2), 0.0);
    }
}
