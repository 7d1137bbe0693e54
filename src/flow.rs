use nalgebra::SVector;
use tracing::{debug, warn};

use crate::boundary::bc::{apply_exit, apply_vector_bc, BoundaryVelocity, ComponentFn};
use crate::config::FlowConfig;
use crate::domain::field::{ScalarField, VectorField};
use crate::domain::grid::{loc, minus, plus, Grid, Location, Region};
use crate::error::{ConfigError, ConvergenceWarning};
use crate::exec::Backend;
use crate::numerical::{accelerate, cfl, conv_diff, div, partial, Limiter};
use crate::poisson::{PoissonSolver, SolveReport};
use crate::{real, Real};

/// Pressure solves of one [`Flow::mom_step`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport<T> {
    /// Step size that was taken.
    pub dt: T,
    /// Time after the step.
    pub time: T,
    pub predictor: SolveReport,
    pub corrector: SolveReport,
}

impl<T> StepReport<T> {
    /// Non-converged pressure solves of this step.
    pub fn warnings(&self) -> Vec<ConvergenceWarning> {
        [&self.predictor, &self.corrector].into_iter().filter_map(SolveReport::warning).collect()
    }
}

/// Velocity, pressure and immersion state on a staggered grid.
///
/// `mu0`, `mu1` and `v` are the BDIM moments written by
/// [`measure`](crate::measure::measure). `dt` holds every step size taken,
/// with the next one last.
#[derive(Clone)]
pub struct Flow<T: Real, const D: usize> {
    pub u: VectorField<T, D>,
    pub u0: VectorField<T, D>,
    pub f: VectorField<T, D>,
    pub p: ScalarField<T, D>,
    /// Scratch: body distance after measuring, face fluxes during a step.
    pub sigma: ScalarField<T, D>,
    pub v: VectorField<T, D>,
    pub mu0: VectorField<T, D>,
    pub mu1: VectorField<T, D>,
    pub boundary: BoundaryVelocity<T, D>,
    pub dt: Vec<T>,
    pub nu: T,
    pub g: Option<ComponentFn<T>>,
    pub exit_bc: bool,
    pub periodic: [bool; D],
    pub limiter: Limiter,
    pub exec: Backend,
}

impl<T: Real, const D: usize> Flow<T, D> {
    pub fn new(config: FlowConfig<T, D>) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = Grid::new(config.dims)?;

        let start = config.boundary.at(T::zero());
        let mut u = VectorField::zeros(grid);
        for i in 0..D {
            for index in grid.all() {
                u[(index, i)] = match &config.initial_velocity {
                    Some(f) => f(i, &loc(Location::Face(i), &index)),
                    None => start[i],
                };
            }
        }
        apply_vector_bc(&mut u, &start, config.exit_bc, &config.periodic);

        let mut mu0 = VectorField::filled(grid, T::one());
        apply_vector_bc(&mut mu0, &SVector::zeros(), false, &config.periodic);

        Ok(Self {
            u0: u.clone(),
            u,
            f: VectorField::zeros(grid),
            p: ScalarField::zeros(grid),
            sigma: ScalarField::zeros(grid),
            v: VectorField::zeros(grid),
            mu0,
            mu1: VectorField::tensor(grid),
            boundary: config.boundary,
            dt: vec![config.dt],
            nu: config.nu,
            g: config.acceleration,
            exit_bc: config.exit_bc,
            periodic: config.periodic,
            limiter: config.limiter,
            exec: config.exec,
        })
    }

    pub fn grid(&self) -> &Grid<D> {
        self.u.grid()
    }

    /// Time reached so far: every step size except the pending one.
    pub fn time(&self) -> T {
        let taken = self.dt.len().saturating_sub(1);
        self.dt[..taken].iter().fold(T::zero(), |s, &dt| s + dt)
    }

    /// Size of the next step.
    pub fn dt_next(&self) -> T {
        self.dt.last().copied().unwrap_or_else(T::zero)
    }

    /// Faces of component `i` updated by the momentum step. The domain
    /// boundary face is excluded unless the axis wraps.
    fn faces(&self, i: usize) -> Region<D> {
        let mut region = self.grid().inside_u(i);
        if self.periodic[i] {
            region.lo[i] = 1;
        }
        region
    }

    fn scale_u(&mut self, k: T) {
        let grid = *self.grid();
        for i in 0..D {
            let region = self.faces(i);
            self.exec.for_each(&grid, &region, self.u.component_mut(i), |_, u| *u *= k);
        }
    }

    /// Blends the fluid update `u0 + dt·f` toward the body velocity by the
    /// kernel moments and adds the result to `u`.
    fn bdim(&mut self) {
        let grid = *self.grid();
        let dt = self.dt_next();
        let half: T = real(0.5);
        for i in 0..D {
            let (u0, v) = (&self.u0, &self.v);
            self.exec.for_each(&grid, &grid.all(), self.f.component_mut(i), |index, f| {
                *f = u0[(index, i)] + dt * *f - v[(index, i)];
            });
        }
        for i in 0..D {
            let region = self.faces(i);
            let (f, v, mu0, mu1) = (&self.f, &self.v, &self.mu0, &self.mu1);
            self.exec.for_each(&grid, &region, self.u.component_mut(i), |index, u| {
                let ddn = (0..D).fold(T::zero(), |s, j| {
                    s + mu1.get_ij(&index, i, j) * (f[(plus(index, j), i)] - f[(minus(index, j), i)])
                });
                *u += ddn * half + v[(index, i)] + mu0[(index, i)] * f[(index, i)];
            });
        }
    }

    /// Removes the divergence of `u` with a pressure solve over the
    /// fraction `w` of the step. The pressure is kept as the initial guess
    /// of the next solve.
    pub fn project<P: PoissonSolver<T, D> + ?Sized>(&mut self, pois: &mut P, w: T) -> SolveReport {
        let grid = *self.grid();
        let inside = grid.inside();
        let dt = w * self.dt_next();
        {
            let b = pois.finest_mut();
            let u = &self.u;
            self.exec.for_each(&grid, &inside, b.z.as_mut_slice(), |index, z| *z = div(&index, u));
            for (x, p) in b.x.as_mut_slice().iter_mut().zip(self.p.as_slice()) {
                *x = *p * dt;
            }
        }

        let report = pois.solve();
        debug!(iterations = report.iterations, residual = report.residual, "pressure solve");
        if let Some(warning) = report.warning() {
            warn!("{warning}");
        }

        let b = pois.finest();
        for i in 0..D {
            self.exec.for_each(&grid, &inside, self.u.component_mut(i), |index, u| {
                *u -= b.l[(index, i)] * partial(i, &index, &b.x);
            });
        }
        for (p, x) in self.p.as_mut_slice().iter_mut().zip(b.x.as_slice()) {
            *p = *x / dt;
        }
        report
    }

    fn apply_bc(&mut self, values: &SVector<T, D>) {
        apply_vector_bc(&mut self.u, values, self.exit_bc, &self.periodic);
    }

    /// One Heun step: an explicit predictor projected over the full step,
    /// then a corrector averaged with it and projected over half the step.
    /// Boundary values are taken at the start of the step in the predictor
    /// and at its end in the corrector.
    /// The next step size is chosen from the new velocity.
    pub fn mom_step<P: PoissonSolver<T, D> + ?Sized>(&mut self, pois: &mut P) -> StepReport<T> {
        let dt = self.dt_next();
        let t0 = self.time();
        let t1 = t0 + dt;
        let start = self.boundary.at(t0);
        let end = self.boundary.at(t1);

        self.u0.copy_from(&self.u);
        self.scale_u(T::zero());

        // predictor
        conv_diff(&mut self.f, &self.u0, &mut self.sigma, self.nu, &self.periodic, self.limiter, self.exec);
        accelerate(&mut self.f, t0, self.g.as_ref(), &self.boundary);
        self.bdim();
        self.apply_bc(&start);
        if self.exit_bc {
            apply_exit(&mut self.u, &self.u0, &start, dt);
        }
        let predictor = self.project(pois, T::one());
        self.apply_bc(&start);

        // corrector
        conv_diff(&mut self.f, &self.u, &mut self.sigma, self.nu, &self.periodic, self.limiter, self.exec);
        accelerate(&mut self.f, t1, self.g.as_ref(), &self.boundary);
        self.bdim();
        self.scale_u(real(0.5));
        self.apply_bc(&end);
        let corrector = self.project(pois, real(0.5));
        self.apply_bc(&end);

        self.dt.push(cfl(&self.u, self.nu, self.exec));
        StepReport { dt, time: self.time(), predictor, corrector }
    }

    /// Sum of squared cell divergences.
    pub fn divergence_l2(&self) -> T {
        let grid = *self.grid();
        self.exec.sum(&grid, &grid.inside(), |index| {
            let d = div(&index, &self.u);
            d * d
        })
    }
}
