pub mod auto_body;
pub mod bodies;

use nalgebra::SVector;

use crate::{real, Real};

pub use auto_body::AutoBody;
pub use bodies::{Bodies, SdfOp};

/// Distance, unit outward normal and surface velocity at a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement<T: Real, const D: usize> {
    pub d: T,
    pub n: SVector<T, D>,
    pub v: SVector<T, D>,
}

impl<T: Real, const D: usize> Measurement<T, D> {
    /// Distance only; normal and velocity left at zero.
    pub fn far(d: T) -> Self {
        Self { d, n: SVector::zeros(), v: SVector::zeros() }
    }
}

/// Immersed geometry.
///
/// `sdf` only has to be exact in sign and zero level set. `measure` may
/// return [`Measurement::far`] once `d² > fastd2`; callers never rely on the
/// normal or velocity that far from the surface.
pub trait Body<T: Real, const D: usize>: Send + Sync {
    fn sdf(&self, x: &SVector<T, D>, t: T) -> T;

    fn measure(&self, x: &SVector<T, D>, t: T, fastd2: T) -> Measurement<T, D>;
}

/// Empty domain: every point is infinitely far from a surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBody;

impl<T: Real, const D: usize> Body<T, D> for NoBody {
    fn sdf(&self, _x: &SVector<T, D>, _t: T) -> T {
        real(f64::MAX)
    }

    fn measure(&self, x: &SVector<T, D>, t: T, _fastd2: T) -> Measurement<T, D> {
        Measurement::far(Body::<T, D>::sdf(self, x, t))
    }
}

impl<T: Real, const D: usize> Body<T, D> for Box<dyn Body<T, D>> {
    fn sdf(&self, x: &SVector<T, D>, t: T) -> T {
        (**self).sdf(x, t)
    }

    fn measure(&self, x: &SVector<T, D>, t: T, fastd2: T) -> Measurement<T, D> {
        (**self).measure(x, t, fastd2)
    }
}
