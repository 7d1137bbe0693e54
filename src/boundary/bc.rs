use std::fmt;
use std::sync::Arc;

use nalgebra::SVector;

use crate::domain::field::{ScalarField, VectorField};
use crate::domain::grid::{minus, with_axis, Grid};
use crate::error::BoundaryError;
use crate::numerical::fd_step;
use crate::{real, Real};

/// How the ghost layer of one velocity component is filled on the domain
/// faces normal to one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryCondition {
    /// Prescribed value; used for the component normal to the face.
    Dirichlet,
    /// Zero gradient; used for tangential components.
    Neumann,
    Periodic,
}

impl BoundaryCondition {
    pub fn for_component(component: usize, axis: usize, periodic: bool) -> Self {
        if periodic {
            BoundaryCondition::Periodic
        } else if component == axis {
            BoundaryCondition::Dirichlet
        } else {
            BoundaryCondition::Neumann
        }
    }
}

pub type ComponentFn<T> = Arc<dyn Fn(usize, T) -> T + Send + Sync>;

/// Domain boundary velocity: constant, or `U(i, t)` per component.
#[derive(Clone)]
pub enum BoundaryVelocity<T: Real, const D: usize> {
    Uniform(SVector<T, D>),
    Varying(ComponentFn<T>),
}

impl<T: Real, const D: usize> BoundaryVelocity<T, D> {
    pub fn uniform(values: SVector<T, D>) -> Self {
        BoundaryVelocity::Uniform(values)
    }

    pub fn varying(f: impl Fn(usize, T) -> T + Send + Sync + 'static) -> Self {
        BoundaryVelocity::Varying(Arc::new(f))
    }

    pub fn from_slice(values: &[T]) -> Result<Self, BoundaryError> {
        if values.len() != D {
            return Err(BoundaryError::ComponentMismatch { expected: D, found: values.len() });
        }
        Ok(BoundaryVelocity::Uniform(SVector::from_fn(|i, _| values[i])))
    }

    /// Boundary values at time `t`.
    pub fn at(&self, t: T) -> SVector<T, D> {
        match self {
            BoundaryVelocity::Uniform(u) => *u,
            BoundaryVelocity::Varying(f) => SVector::from_fn(|i, _| f(i, t)),
        }
    }

    /// `dUᵢ/dt`, zero for a uniform boundary.
    pub fn rate(&self, i: usize, t: T) -> T {
        match self {
            BoundaryVelocity::Uniform(_) => T::zero(),
            BoundaryVelocity::Varying(f) => {
                let h = fd_step(t);
                (f(i, t + h) - f(i, t - h)) / (h + h)
            }
        }
    }

    pub fn is_varying(&self) -> bool {
        matches!(self, BoundaryVelocity::Varying(_))
    }
}

impl<T: Real, const D: usize> fmt::Debug for BoundaryVelocity<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryVelocity::Uniform(u) => f.debug_tuple("Uniform").field(u).finish(),
            BoundaryVelocity::Varying(_) => f.write_str("Varying(<fn>)"),
        }
    }
}

/// Fills the ghost layer of a staggered vector field.
///
/// The normal component gets `values[i]` on the ghost face and on the
/// boundary face itself; tangential components copy their interior
/// neighbour. With `exit` set the upper face of the first axis is left for
/// [`apply_exit`]. Periodic axes wrap.
pub fn apply_vector_bc<T: Real, const D: usize>(
    a: &mut VectorField<T, D>,
    values: &SVector<T, D>,
    exit: bool,
    periodic: &[bool; D],
) {
    let grid = *a.grid();
    for i in 0..D {
        let comp = a.component_mut(i);
        for j in 0..D {
            let n = grid.shape()[j];
            match BoundaryCondition::for_component(i, j, periodic[j]) {
                BoundaryCondition::Periodic => {
                    copy_plane(comp, &grid, j, 0, n - 2);
                    copy_plane(comp, &grid, j, n - 1, 1);
                }
                BoundaryCondition::Dirichlet => {
                    let mut faces = vec![0, 1];
                    if !(exit && i == 0) {
                        faces.push(n - 1);
                    }
                    for at in faces {
                        for index in grid.slice(j, at) {
                            comp[grid.offset(&index)] = values[i];
                        }
                    }
                }
                BoundaryCondition::Neumann => {
                    copy_plane(comp, &grid, j, 0, 1);
                    copy_plane(comp, &grid, j, n - 1, n - 2);
                }
            }
        }
    }
}

fn copy_plane<T: Copy, const D: usize>(comp: &mut [T], grid: &Grid<D>, axis: usize, at: usize, from: usize) {
    for index in grid.slice(axis, at) {
        comp[grid.offset(&index)] = comp[grid.offset(&with_axis(index, axis, from))];
    }
}

/// Wraps the ghost cells of a scalar along periodic axes.
pub fn apply_periodic<T: Real, const D: usize>(a: &mut ScalarField<T, D>, periodic: &[bool; D]) {
    let grid = *a.grid();
    for j in (0..D).filter(|&j| periodic[j]) {
        let n = grid.shape()[j];
        for (at, from) in [(0, n - 2), (n - 1, 1)] {
            for index in grid.slice(j, at) {
                a[index] = a[with_axis(index, j, from)];
            }
        }
    }
}

/// Convective outflow on the upper face of the first axis.
///
/// The exit face is advected with a first-order upwind step at the
/// boundary speed, then shifted uniformly so the outflow matches the inflow.
pub fn apply_exit<T: Real, const D: usize>(
    u: &mut VectorField<T, D>,
    u0: &VectorField<T, D>,
    values: &SVector<T, D>,
    dt: T,
) {
    let grid = *u.grid();
    let exit = grid.inside().at(0, grid.shape()[0] - 1);
    let speed = values[0];
    for index in exit {
        let upwind = u0[(index, 0)] - u0[(minus(index, 0), 0)];
        u[(index, 0)] = u0[(index, 0)] - speed * dt * upwind;
    }
    let total = exit.iter().fold(T::zero(), |s, index| s + u[(index, 0)]);
    let imbalance = total / real(exit.len() as f64) - speed;
    for index in exit {
        u[(index, 0)] -= imbalance;
    }
}
