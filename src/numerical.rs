pub mod derive;
pub mod flux;
pub mod interpolate;

use crate::boundary::bc::{BoundaryVelocity, ComponentFn};
use crate::domain::field::VectorField;
use crate::exec::Backend;
use crate::{real, Real};

pub use derive::{div, flux_out, partial};
pub use flux::conv_diff;
pub use interpolate::Limiter;

/// Central-difference step for a smooth function evaluated near `x`.
#[inline]
pub fn fd_step<T: Real>(x: T) -> T {
    T::default_epsilon().powf(real(1.0 / 3.0)) * x.abs().max(T::one())
}

/// Adds the uniform acceleration `gᵢ(t) + dUᵢ/dt` to every face of `r`.
pub fn accelerate<T: Real, const D: usize>(
    r: &mut VectorField<T, D>,
    t: T,
    g: Option<&ComponentFn<T>>,
    boundary: &BoundaryVelocity<T, D>,
) {
    if g.is_none() && !boundary.is_varying() {
        return;
    }
    for i in 0..D {
        let a = g.map_or(T::zero(), |g| g(i, t)) + boundary.rate(i, t);
        r.component_mut(i).iter_mut().for_each(|v| *v += a);
    }
}

/// Stable time step from the largest outgoing face flux of any cell.
pub fn cfl<T: Real, const D: usize>(u: &VectorField<T, D>, nu: T, exec: Backend) -> T {
    let grid = *u.grid();
    let max_flux = exec.max(&grid, &grid.inside(), T::zero(), |index| flux_out(&index, u));
    let dt_max: T = real(10.0);
    dt_max.min(T::one() / (max_flux + real::<T>(5.0) * nu))
}
