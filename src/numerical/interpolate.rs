use serde::{Deserialize, Serialize};

use crate::domain::field::VectorField;
use crate::domain::grid::{minus, Index};
use crate::{real, Real};

/// Face value reconstruction for the convective flux.
///
/// Each limiter maps the upwind, centre and downwind values `(u, c, d)`
/// to the value on the face between `c` and `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Limiter {
    /// Third-order upwind, bounded by a median limiter.
    #[default]
    Quick,
    VanLeer,
    Central,
}

impl Limiter {
    #[inline]
    pub fn face<T: Real>(self, u: T, c: T, d: T) -> T {
        match self {
            Limiter::Quick => quick(u, c, d),
            Limiter::VanLeer => van_leer(u, c, d),
            Limiter::Central => (c + d) * real(0.5),
        }
    }
}

#[inline]
fn median<T: Real>(a: T, b: T, c: T) -> T {
    a.min(b).max(c.min(a.max(b)))
}

#[inline]
pub fn quick<T: Real>(u: T, c: T, d: T) -> T {
    let five: T = real(5.0);
    let two: T = real(2.0);
    let six: T = real(6.0);
    let nine: T = real(9.0);
    let ten: T = real(10.0);
    median((five * c + two * d - u) / six, c, median(ten * c - nine * u, c, d))
}

#[inline]
pub fn van_leer<T: Real>(u: T, c: T, d: T) -> T {
    if c <= u.min(d) || c >= u.max(d) {
        c
    } else {
        c + (d - c) * (c - u) / (d - u)
    }
}

/// Component `comp` averaged onto the lower face of `index` along `axis`.
#[inline]
pub fn face_average<T: Real, const D: usize>(
    axis: usize,
    index: &Index<D>,
    u: &VectorField<T, D>,
    comp: usize,
) -> T {
    (u[(*index, comp)] + u[(minus(*index, axis), comp)]) * real(0.5)
}
