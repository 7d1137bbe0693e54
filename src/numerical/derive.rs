use crate::domain::field::{ScalarField, VectorField};
use crate::domain::grid::{minus, plus, Index};
use crate::Real;

/// Backward difference of a cell-centred scalar along `axis`: the gradient on the lower face of `index`.
#[inline]
pub fn partial<T: Real, const D: usize>(axis: usize, index: &Index<D>, f: &ScalarField<T, D>) -> T {
    f[*index] - f[minus(*index, axis)]
}

/// Divergence of a staggered field over cell `index` (unit spacing).
#[inline]
pub fn div<T: Real, const D: usize>(index: &Index<D>, u: &VectorField<T, D>) -> T {
    (0..D).fold(T::zero(), |s, i| s + u[(plus(*index, i), i)] - u[(*index, i)])
}

/// Total outgoing flux through the faces of cell `index`.
#[inline]
pub fn flux_out<T: Real, const D: usize>(index: &Index<D>, u: &VectorField<T, D>) -> T {
    (0..D).fold(T::zero(), |s, i| {
        s + u[(plus(*index, i), i)].max(T::zero()) + (-u[(*index, i)]).max(T::zero())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::grid::Grid;
    use approx::assert_relative_eq;

    #[test]
    fn test_partial() {
        let grid = Grid::new([4, 4]).unwrap();
        let mut p = ScalarField::<f64, 2>::zeros(grid);
        for index in grid.all() {
            p[index] = 2.0 * index[0] as f64 + 3.0 * index[1] as f64;
        }
        assert_relative_eq!(partial(0, &[2, 2], &p), 2.0);
        assert_relative_eq!(partial(1, &[2, 2], &p), 3.0);
    }

    #[test]
    fn test_div_of_linear_field() {
        let grid = Grid::new([4, 4, 4]).unwrap();
        let mut u = VectorField::<f64, 3>::zeros(grid);
        for index in grid.all() {
            u[(index, 0)] = index[0] as f64;
            u[(index, 1)] = -0.5 * index[1] as f64;
            u[(index, 2)] = 7.0;
        }
        assert_relative_eq!(div(&[2, 2, 2], &u), 0.5);
    }

    #[test]
    fn test_flux_out_counts_only_outgoing() {
        let grid = Grid::new([3, 3]).unwrap();
        let mut u = VectorField::<f64, 2>::zeros(grid);
        u[([2, 2], 0)] = -1.0; // leaves through the lower x face
        u[([3, 2], 0)] = -1.0; // enters through the upper x face
        u[([2, 3], 1)] = 0.25;
        assert_relative_eq!(flux_out(&[2, 2], &u), 1.25);
    }
}
