//! Immersion of a [`Body`] into the flow's BDIM moments.
//!
//! Each face gets the zeroth moment `mu0` (fluid fraction of the kernel
//! support), the first moment `mu1` along the surface normal, and the body
//! velocity `v`. Both moments are smoothed over a half-width `eps`.

use std::f64::consts::PI;

use nalgebra::SVector;
use tracing::debug;

use crate::body::Body;
use crate::boundary::bc::apply_vector_bc;
use crate::domain::field::ScalarField;
use crate::domain::grid::{loc, Location};
use crate::flow::Flow;
use crate::{real, Real};

/// Regularised Heaviside on the unit kernel support.
fn kern0<T: Real>(d: T) -> T {
    let pi: T = real(PI);
    let half: T = real(0.5);
    half + half * d + half * (pi * d).sin() / pi
}

/// First moment of the unit kernel.
fn kern1<T: Real>(d: T) -> T {
    let pi: T = real(PI);
    let half: T = real(0.5);
    let quarter: T = real(0.25);
    quarter * (T::one() - d * d) - half * (d * (pi * d).sin() + (T::one() + (pi * d).cos()) / pi) / pi
}

/// Fluid fraction at signed distance `d`: 0 for `d <= -eps`, 1 for `d >= eps`.
pub fn mu0<T: Real>(d: T, eps: T) -> T {
    let x = d / eps;
    if x <= -T::one() {
        T::zero()
    } else if x >= T::one() {
        T::one()
    } else {
        kern0(x)
    }
}

/// First-moment magnitude, vanishing outside `|d| < eps`.
pub fn mu1<T: Real>(d: T, eps: T) -> T {
    let x = d / eps;
    if x <= -T::one() || x >= T::one() {
        T::zero()
    } else {
        eps * kern1(x)
    }
}

enum Cell<T: Real, const D: usize> {
    Fluid,
    Solid,
    /// Per face: `mu0`, `mu1` vector and the normal body velocity.
    Cut([(T, SVector<T, D>, T); D]),
}

/// Measures `body` at time `t` into `flow.mu0`, `flow.mu1`, `flow.v`, and
/// its cell-centre distance into `flow.sigma`.
///
/// Cells farther than `2 + eps` from the surface are classified by the sign
/// of the centre distance alone.
pub fn measure<T, const D: usize, B>(flow: &mut Flow<T, D>, body: &B, t: T, eps: T)
where
    T: Real,
    B: Body<T, D> + ?Sized,
{
    let grid = *flow.grid();
    let band = real::<T>(2.0) + eps;
    let cut = band * band;

    flow.v.fill(T::zero());
    flow.mu0.fill(T::one());
    flow.mu1.fill(T::zero());
    flow.sigma.fill(T::zero());

    let cells = flow.exec.map(&grid.inside(), |index| {
        let d = body.sdf(&loc(Location::Center, &index), t);
        let cell = if d * d < cut {
            Cell::Cut(std::array::from_fn(|i| {
                let m = body.measure(&loc(Location::Face(i), &index), t, cut);
                (mu0(m.d, eps), m.n * mu1(m.d, eps), m.v[i])
            }))
        } else if d < T::zero() {
            Cell::Solid
        } else {
            Cell::Fluid
        };
        (d, cell)
    });

    let mut cut_faces = 0;
    for (index, (d, cell)) in cells {
        flow.sigma[index] = d;
        match cell {
            Cell::Fluid => {}
            Cell::Solid => (0..D).for_each(|i| flow.mu0[(index, i)] = T::zero()),
            Cell::Cut(faces) => {
                for (i, (m0, m1, v)) in faces.into_iter().enumerate() {
                    flow.mu0[(index, i)] = m0;
                    flow.v[(index, i)] = v;
                    for j in 0..D {
                        flow.mu1.set_ij(&index, i, j, m1[j]);
                    }
                    if m0 > T::zero() && m0 < T::one() {
                        cut_faces += 1;
                    }
                }
            }
        }
    }
    debug!(cut_faces, "measured body");

    let zeros = SVector::zeros();
    apply_vector_bc(&mut flow.mu0, &zeros, false, &flow.periodic);
    apply_vector_bc(&mut flow.v, &zeros, flow.exit_bc, &flow.periodic);
}

/// Fills the interior of `a` with the distance to `body` at cell centres.
pub fn measure_sdf<T, const D: usize, B>(a: &mut ScalarField<T, D>, body: &B, t: T)
where
    T: Real,
    B: Body<T, D> + ?Sized,
{
    let grid = *a.grid();
    for index in grid.inside() {
        a[index] = body.sdf(&loc(Location::Center, &index), t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{AutoBody, NoBody};
    use crate::boundary::bc::BoundaryVelocity;
    use crate::config::FlowConfig;
    use crate::exec::Backend;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::Vector2;

    fn flow(dims: [usize; 2], exec: Backend) -> Flow<f64, 2> {
        let config = FlowConfig { exec, ..FlowConfig::new(dims, BoundaryVelocity::uniform(Vector2::new(1.0, 0.0))) };
        Flow::new(config).unwrap()
    }

    fn disc(cx: f64, cy: f64, r: f64) -> AutoBody<f64, 2> {
        AutoBody::new(move |x: &Vector2<f64>, _| (x - Vector2::new(cx, cy)).norm() - r)
    }

    #[test]
    fn test_kernels() {
        assert_eq!(mu0(-3.0, 1.0), 0.0);
        assert_eq!(mu0(3.0, 1.0), 1.0);
        assert_relative_eq!(mu0(0.0, 2.0), 0.5);
        assert_eq!(mu1(1.5, 1.0), 0.0);
        assert_relative_eq!(mu1(0.0, 1.0), 0.25 - 1.0 / (PI * PI), epsilon = 1e-12);
        // continuous at the support edge
        assert_abs_diff_eq!(kern0(1.0_f64), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kern1(-1.0_f64), 0.0, epsilon = 1e-12);
        let mut last = 0.0;
        for k in -20..=20 {
            let m = mu0(k as f64 * 0.1, 1.5);
            assert!(m >= last && (0.0..=1.0).contains(&m));
            last = m;
        }
    }

    #[test]
    fn test_body_outside_domain_leaves_fluid() {
        let mut f = flow([8, 8], Backend::Serial);
        measure(&mut f, &disc(100.0, 100.0, 2.0), 0.0, 1.0);
        for i in 0..2 {
            for index in f.grid().inside_u(i) {
                assert_eq!(f.mu0[(index, i)], 1.0);
                assert_eq!(f.v[(index, i)], 0.0);
            }
            assert_eq!(f.mu0[([1, 1], i)], 0.0);
        }
        assert!(f.mu1.component(0).iter().all(|&m| m == 0.0));

        let mut g = flow([8, 8], Backend::Serial);
        measure(&mut g, &NoBody, 0.0, 1.0);
        assert_eq!(f.mu0, g.mu0);
    }

    #[test]
    fn test_disc_moments() {
        let mut f = flow([32, 32], Backend::Serial);
        measure(&mut f, &disc(16.0, 16.0, 5.0), 0.0, 1.0);

        // centre of the disc is solid, the far corner is fluid
        assert_eq!(f.mu0[([17, 17], 0)], 0.0);
        assert_eq!(f.mu0[([4, 4], 1)], 1.0);
        assert!(f.sigma[[17, 17]] < 0.0 && f.sigma[[4, 4]] > 0.0);
        for i in 0..2 {
            assert!(f.mu0.component(i).iter().all(|&m| (0.0..=1.0).contains(&m)));
        }

        // face (x = 21, y = 15.5) sits just outside the surface, normal close to +x
        let face = [22, 16];
        let d = 5.0_f64.hypot(0.5) - 5.0;
        assert_relative_eq!(f.mu0[(face, 0)], mu0(d, 1.0), epsilon = 1e-6);
        assert!(f.mu0[(face, 0)] > 0.5 && f.mu0[(face, 0)] < 1.0);
        assert!(f.mu1.get_ij(&face, 0, 0) > 0.0);
        assert_abs_diff_eq!(f.mu1.get_ij(&face, 0, 1), f.mu1.get_ij(&face, 0, 0) * -0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_moving_body_velocity() {
        let mut f = flow([16, 16], Backend::Threaded);
        let body = disc(8.0, 8.0, 3.0).with_map(|x, t| x - Vector2::new(0.0, 0.5 * t));
        measure(&mut f, &body, 2.0, 1.0);
        let mut touched = 0;
        for index in f.grid().inside() {
            if f.mu0[(index, 1)] > 0.0 && f.mu0[(index, 1)] < 1.0 {
                assert_relative_eq!(f.v[(index, 1)], 0.5, epsilon = 1e-6);
                touched += 1;
            }
            if f.mu0[(index, 0)] > 0.0 && f.mu0[(index, 0)] < 1.0 {
                assert_abs_diff_eq!(f.v[(index, 0)], 0.0, epsilon = 1e-6);
            }
        }
        assert!(touched > 0);
    }

    #[test]
    fn test_backends_agree() {
        let body = disc(9.3, 7.1, 3.7);
        let mut serial = flow([16, 16], Backend::Serial);
        let mut threaded = flow([16, 16], Backend::Threaded);
        measure(&mut serial, &body, 0.0, 1.5);
        measure(&mut threaded, &body, 0.0, 1.5);
        assert_eq!(serial.mu0, threaded.mu0);
        assert_eq!(serial.mu1, threaded.mu1);
        assert_eq!(serial.v, threaded.v);
    }

    #[test]
    fn test_measure_sdf() {
        let grid = crate::domain::grid::Grid::new([8, 8]).unwrap();
        let mut a = ScalarField::zeros(grid);
        measure_sdf(&mut a, &disc(4.0, 4.0, 1.0), 0.0);
        assert_relative_eq!(a[[5, 5]], 0.5_f64.hypot(0.5) - 1.0, epsilon = 1e-12);
        assert_eq!(a[[0, 0]], 0.0);
    }
}
