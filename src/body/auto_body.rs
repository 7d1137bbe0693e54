use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector, SVector};

use crate::body::{Body, Measurement};
use crate::numerical::fd_step;
use crate::Real;

pub type SdfFn<T, const D: usize> = Arc<dyn Fn(&SVector<T, D>, T) -> T + Send + Sync>;
pub type MapFn<T, const D: usize> = Arc<dyn Fn(&SVector<T, D>, T) -> SVector<T, D> + Send + Sync>;

/// Body defined by a signed distance function and a coordinate map.
///
/// The map takes a point of the fixed domain to the body frame at time `t`;
/// with `compose` set the distance is evaluated as `sdf(map(x, t), t)`.
/// Normals and the map Jacobian come from central differences.
#[derive(Clone)]
pub struct AutoBody<T: Real, const D: usize> {
    sdf: SdfFn<T, D>,
    map: MapFn<T, D>,
    compose: bool,
}

impl<T: Real, const D: usize> AutoBody<T, D> {
    /// Static body with the identity map.
    pub fn new(sdf: impl Fn(&SVector<T, D>, T) -> T + Send + Sync + 'static) -> Self {
        Self { sdf: Arc::new(sdf), map: Arc::new(|x: &SVector<T, D>, _: T| *x), compose: true }
    }

    pub fn with_map(mut self, map: impl Fn(&SVector<T, D>, T) -> SVector<T, D> + Send + Sync + 'static) -> Self {
        self.map = Arc::new(map);
        self
    }

    /// Whether `sdf` is evaluated in the mapped frame. Without composition
    /// the map only supplies the surface velocity.
    pub fn compose(mut self, compose: bool) -> Self {
        self.compose = compose;
        self
    }

    fn gradient(&self, x: &SVector<T, D>, t: T) -> SVector<T, D> {
        SVector::from_fn(|a, _| {
            let h = fd_step(x[a]);
            let mut hi = *x;
            let mut lo = *x;
            hi[a] += h;
            lo[a] -= h;
            (Body::sdf(self, &hi, t) - Body::sdf(self, &lo, t)) / (h + h)
        })
    }

    /// Surface velocity `-J⁻¹ ∂ₜmap`, or zero where the map is singular.
    fn velocity(&self, x: &SVector<T, D>, t: T) -> SVector<T, D> {
        let mut jacobian = DMatrix::zeros(D, D);
        for b in 0..D {
            let h = fd_step(x[b]);
            let mut hi = *x;
            let mut lo = *x;
            hi[b] += h;
            lo[b] -= h;
            let column = ((self.map)(&hi, t) - (self.map)(&lo, t)) / (h + h);
            for a in 0..D {
                jacobian[(a, b)] = column[a];
            }
        }
        let h = fd_step(t);
        let rate = ((self.map)(x, t + h) - (self.map)(x, t - h)) / (h + h);
        let rhs = DVector::from_iterator(D, rate.iter().map(|&r| -r));
        match jacobian.lu().solve(&rhs) {
            Some(v) => SVector::from_fn(|a, _| v[a]),
            None => SVector::zeros(),
        }
    }
}

impl<T: Real, const D: usize> Body<T, D> for AutoBody<T, D> {
    fn sdf(&self, x: &SVector<T, D>, t: T) -> T {
        if self.compose {
            (self.sdf)(&(self.map)(x, t), t)
        } else {
            (self.sdf)(x, t)
        }
    }

    fn measure(&self, x: &SVector<T, D>, t: T, fastd2: T) -> Measurement<T, D> {
        let d = Body::sdf(self, x, t);
        if d * d > fastd2 {
            return Measurement::far(d);
        }

        let n = self.gradient(x, t);
        let m = n.norm();
        if n.iter().any(|c| !c.is_finite()) || m <= T::zero() {
            return Measurement::far(d);
        }
        // pseudo-distance: rescale by the gradient magnitude
        Measurement { d: d / m, n: n / m, v: self.velocity(x, t) }
    }
}

impl<T: Real, const D: usize> fmt::Debug for AutoBody<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoBody").field("compose", &self.compose).finish_non_exhaustive()
    }
}
