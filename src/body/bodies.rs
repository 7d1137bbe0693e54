use std::fmt;

use nalgebra::SVector;

use crate::body::{Body, Measurement};
use crate::Real;

/// Boolean combination applied between the running result and the next body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdfOp {
    /// `min(a, b)`
    Union,
    /// `max(a, b)`
    Intersection,
    /// `max(a, -b)`
    Difference,
}

/// Composite body built from a flat list of bodies and operators.
///
/// `bodies[0] ops[0] bodies[1] ops[1] ...` is folded left to right in a
/// loop, so arbitrarily long compositions never deepen the call stack.
/// Measurements delegate to whichever body decides the combined distance
/// at the query point.
pub struct Bodies<T: Real, const D: usize> {
    bodies: Vec<Box<dyn Body<T, D>>>,
    ops: Vec<SdfOp>,
}

impl<T: Real, const D: usize> Bodies<T, D> {
    pub fn new(first: impl Body<T, D> + 'static) -> Self {
        Self { bodies: vec![Box::new(first)], ops: Vec::new() }
    }

    pub fn push(mut self, op: SdfOp, body: impl Body<T, D> + 'static) -> Self {
        self.bodies.push(Box::new(body));
        self.ops.push(op);
        self
    }

    pub fn union(self, body: impl Body<T, D> + 'static) -> Self {
        self.push(SdfOp::Union, body)
    }

    pub fn intersect(self, body: impl Body<T, D> + 'static) -> Self {
        self.push(SdfOp::Intersection, body)
    }

    pub fn subtract(self, body: impl Body<T, D> + 'static) -> Self {
        self.push(SdfOp::Difference, body)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Combined distance, the index of the deciding body and the sign
    /// its own distance carries in the result.
    fn reduce(&self, x: &SVector<T, D>, t: T) -> (T, usize, T) {
        let mut d = self.bodies[0].sdf(x, t);
        let mut winner = 0;
        let mut sign = T::one();
        for (k, (op, body)) in self.ops.iter().zip(&self.bodies[1..]).enumerate() {
            let b = body.sdf(x, t);
            let (candidate, s) = match op {
                SdfOp::Union if b < d => (b, T::one()),
                SdfOp::Intersection if b > d => (b, T::one()),
                SdfOp::Difference if -b > d => (-b, -T::one()),
                _ => continue,
            };
            d = candidate;
            winner = k + 1;
            sign = s;
        }
        (d, winner, sign)
    }
}

impl<T: Real, const D: usize> Body<T, D> for Bodies<T, D> {
    fn sdf(&self, x: &SVector<T, D>, t: T) -> T {
        self.reduce(x, t).0
    }

    fn measure(&self, x: &SVector<T, D>, t: T, fastd2: T) -> Measurement<T, D> {
        let (_, winner, sign) = self.reduce(x, t);
        let m = self.bodies[winner].measure(x, t, fastd2);
        Measurement { d: m.d * sign, n: m.n * sign, v: m.v }
    }
}

impl<T: Real, const D: usize> fmt::Debug for Bodies<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bodies").field("len", &self.bodies.len()).field("ops", &self.ops).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::AutoBody;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    fn circle(cx: f64, cy: f64, r: f64) -> AutoBody<f64, 2> {
        AutoBody::new(move |x: &Vector2<f64>, _| (x - Vector2::new(cx, cy)).norm() - r)
    }

    #[test]
    fn test_union_is_commutative() {
        let ab = Bodies::new(circle(0.0, 0.0, 1.0)).union(circle(3.0, 0.0, 1.5));
        let ba = Bodies::new(circle(3.0, 0.0, 1.5)).union(circle(0.0, 0.0, 1.0));
        for x in [-2.0, 0.0, 1.2, 1.6, 2.5, 5.0] {
            let p = Vector2::new(x, 0.7);
            assert_eq!(ab.sdf(&p, 0.0), ba.sdf(&p, 0.0));
            assert_eq!(ab.measure(&p, 0.0, 100.0).d, ba.measure(&p, 0.0, 100.0).d);
        }
    }

    #[test]
    fn test_intersection() {
        let lens = Bodies::new(circle(-0.5, 0.0, 1.0)).intersect(circle(0.5, 0.0, 1.0));
        assert!(lens.sdf(&Vector2::new(0.0, 0.0), 0.0) < 0.0);
        assert!(lens.sdf(&Vector2::new(-1.2, 0.0), 0.0) > 0.0);
    }

    #[test]
    fn test_difference_flips_the_subtracted_surface() {
        let ring = Bodies::new(circle(0.0, 0.0, 4.0)).subtract(circle(0.0, 0.0, 1.0));
        // the hole is fluid, its boundary faces inward
        let m = ring.measure(&Vector2::new(0.5, 0.0), 0.0, 100.0);
        assert_relative_eq!(m.d, 0.5, epsilon = 1e-6);
        assert_relative_eq!(m.n, Vector2::new(-1.0, 0.0), epsilon = 1e-6);
        assert!(ring.sdf(&Vector2::new(2.0, 0.0), 0.0) < 0.0);
        assert!(ring.sdf(&Vector2::new(5.0, 0.0), 0.0) > 0.0);
    }

    #[test]
    fn test_long_composition_is_evaluated_iteratively() {
        let mut row = Bodies::new(circle(0.0, 0.0, 0.25));
        for k in 1..20_000 {
            row = row.union(circle(k as f64, 0.0, 0.25));
        }
        assert_eq!(row.len(), 20_000);
        let d = row.sdf(&Vector2::new(1234.0, 1.0), 0.0);
        assert_relative_eq!(d, 0.75, epsilon = 1e-12);
    }
}
