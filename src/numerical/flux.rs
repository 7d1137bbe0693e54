use crate::domain::field::{ScalarField, VectorField};
use crate::domain::grid::{minus, plus, with_axis, Index};
use crate::exec::Backend;
use crate::numerical::interpolate::{face_average, Limiter};
use crate::{real, Real};

/// Convection-diffusion rate of a staggered velocity field.
///
/// For every component `i` and direction `j` the total flux `Φ` through
/// the faces normal to `j` is written into the scratch field `flux`, then
/// each cell receives the difference of its lower and upper face fluxes.
/// `r` is overwritten.
pub fn conv_diff<T: Real, const D: usize>(
    r: &mut VectorField<T, D>,
    u: &VectorField<T, D>,
    flux: &mut ScalarField<T, D>,
    nu: T,
    periodic: &[bool; D],
    limiter: Limiter,
    exec: Backend,
) {
    let grid = *u.grid();
    r.fill(T::zero());
    for i in 0..D {
        for j in 0..D {
            let mut faces = grid.inside();
            faces.hi[j] = grid.shape()[j];
            exec.for_each(&grid, &faces, flux.as_mut_slice(), |index, phi| {
                *phi = face_flux(u, i, j, index, nu, periodic[j], limiter);
            });

            let phi = &*flux;
            exec.for_each(&grid, &grid.inside(), r.component_mut(i), |index, ri| {
                *ri += phi[index] - phi[plus(index, j)];
            });
        }
    }
}

/// Convective minus diffusive flux of component `i` through the lower `j`-face of `index`.
fn face_flux<T: Real, const D: usize>(
    u: &VectorField<T, D>,
    i: usize,
    j: usize,
    index: Index<D>,
    nu: T,
    periodic: bool,
    limiter: Limiter,
) -> T {
    let n = u.grid().shape()[j];
    if periodic && index[j] == n - 1 {
        return face_flux(u, i, j, with_axis(index, j, 1), nu, periodic, limiter);
    }

    let f = |k: Index<D>| u[(k, i)];
    let uf = face_average(i, &index, u, j);
    let lo = minus(index, j);
    let central = (f(index) + f(lo)) * real(0.5);
    let downwind = || limiter.face(f(plus(index, j)), f(index), f(lo));
    let upwind = || limiter.face(f(minus(lo, j)), f(lo), f(index));

    let convective = if index[j] == 1 {
        if uf > T::zero() {
            if periodic {
                uf * limiter.face(f(with_axis(index, j, n - 3)), f(lo), f(index))
            } else {
                uf * central
            }
        } else {
            uf * downwind()
        }
    } else if index[j] == n - 1 {
        if uf < T::zero() {
            uf * central
        } else {
            uf * upwind()
        }
    } else if uf > T::zero() {
        uf * upwind()
    } else {
        uf * downwind()
    };

    convective - nu * (f(index) - f(lo))
}
