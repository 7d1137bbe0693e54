//! Geometric multigrid for the pressure Poisson system.
//!
//! Each level halves the interior cells of the one above it. Residuals are
//! restricted by summing the `2^D` fine cells of a coarse cell, conductances
//! by averaging the two (or four) fine faces that tile a coarse face, and
//! coarse corrections are prolongated piecewise-constant.

use nalgebra::SVector;
use tracing::debug;

use crate::boundary::bc::{apply_periodic, apply_vector_bc};
use crate::domain::field::VectorField;
use crate::domain::grid::{Index, Region};
use crate::error::{ConfigError, GridError};
use crate::exec::Backend;
use crate::poisson::{Poisson, PoissonSolver, SolveReport, SolverSettings};
use crate::{real, to_f64, Real};

/// Levels kept below the finest one.
pub const MAX_LEVELS: usize = 10;

/// Fine cells covered by coarse cell `index`, or with `face` set, the
/// fine faces tiling its lower face normal to that axis.
fn up<const D: usize>(index: &Index<D>, face: Option<usize>) -> Region<D> {
    let lo = index.map(|c| 2 * c - 1);
    let mut hi = index.map(|c| 2 * c + 1);
    if let Some(axis) = face {
        hi[axis] = lo[axis] + 1;
    }
    Region::new(lo, hi)
}

/// The fine cell's parent on the next coarser level.
#[inline]
fn down<const D: usize>(index: &Index<D>) -> Index<D> {
    index.map(|c| (c + 1) / 2)
}

impl<T: Real, const D: usize> Poisson<T, D> {
    /// The next coarser level, or `None` if the grid cannot be halved.
    pub fn coarsen(&self) -> Option<Self> {
        let coarse = self.l.grid().coarsen()?;
        let mut l = VectorField::zeros(coarse);
        restrict_l(&mut l, &self.l, &self.periodic);
        Some(Poisson::new(&l, self.periodic, self.exec, self.settings))
    }

    /// `r` of this level summed from the finer level's residual.
    fn restrict_from(&mut self, fine: &Poisson<T, D>) {
        let grid = *self.r.grid();
        self.exec.for_each(&grid, &grid.inside(), self.r.as_mut_slice(), |index, r| {
            *r = up(&index, None).iter().fold(T::zero(), |s, j| s + fine.r[j]);
        });
    }

    /// `eps` of this level from the coarser level's solution.
    fn prolongate_from(&mut self, coarse: &Poisson<T, D>) {
        let grid = *self.eps.grid();
        self.exec.for_each(&grid, &grid.inside(), self.eps.as_mut_slice(), |index, e| {
            *e = coarse.x[down(&index)];
        });
    }
}

fn restrict_l<T: Real, const D: usize>(coarse: &mut VectorField<T, D>, fine: &VectorField<T, D>, periodic: &[bool; D]) {
    let grid = *coarse.grid();
    let half: T = real(0.5);
    for i in 0..D {
        for index in grid.inside() {
            let sum = up(&index, Some(i)).iter().fold(T::zero(), |s, j| s + fine[(j, i)]);
            coarse[(index, i)] = sum * half;
        }
    }
    apply_vector_bc(coarse, &SVector::zeros(), false, periodic);
}

/// One V-cycle over `levels[0]` and everything coarser.
fn v_cycle<T: Real, const D: usize>(levels: &mut [Poisson<T, D>]) {
    let Some((fine, rest)) = levels.split_first_mut() else {
        return;
    };
    if rest.is_empty() {
        return;
    }

    fine.jacobi(1);
    rest[0].restrict_from(fine);
    rest[0].x.fill(T::zero());

    if rest.len() > 1 {
        v_cycle(rest);
    }
    rest[0].smooth();

    fine.prolongate_from(&rest[0]);
    fine.increment();
}

/// Hierarchy of Poisson systems, finest first.
#[derive(Debug, Clone)]
pub struct MultiLevelPoisson<T: Real, const D: usize> {
    pub levels: Vec<Poisson<T, D>>,
    pub settings: SolverSettings,
    iterations: Vec<usize>,
}

impl<T: Real, const D: usize> MultiLevelPoisson<T, D> {
    /// Builds every level from the face conductances `mu0`.
    ///
    /// Fails unless the grid can be halved at least once.
    pub fn new(
        mu0: &VectorField<T, D>,
        periodic: [bool; D],
        exec: Backend,
        settings: SolverSettings,
    ) -> Result<Self, ConfigError> {
        let mut levels = vec![Poisson::new(mu0, periodic, exec, settings)];
        while levels.len() <= MAX_LEVELS {
            let Some(coarse) = levels.last().and_then(Poisson::coarsen) else {
                break;
            };
            levels.push(coarse);
        }
        if levels.len() < 2 {
            return Err(GridError::NotCoarsenable(format!(
                "interior dimensions {:?} must be even and at least 4 to build a multigrid hierarchy",
                mu0.grid().dims()
            ))
            .into());
        }
        debug!(levels = levels.len(), "built multigrid hierarchy");
        Ok(Self { levels, settings, iterations: Vec::new() })
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Reassembles the finest level from `mu0` and restricts it down.
    pub fn update(&mut self, mu0: &VectorField<T, D>) {
        self.levels[0].update(mu0);
        for k in 1..self.levels.len() {
            let (above, below) = self.levels.split_at_mut(k);
            let fine = &above[k - 1];
            let coarse = &mut below[0];
            restrict_l(&mut coarse.l, &fine.l, &fine.periodic);
            coarse.set_diag();
        }
    }

    /// V-cycles followed by a fine smoothing pass until the finest
    /// residual satisfies `r·r <= tol` or `max_iter` cycles ran.
    pub fn solve(&mut self) -> SolveReport {
        let settings = self.settings;
        let tol: T = real(settings.tol);
        self.levels[0].residual();
        let mut r2 = self.levels[0].l2();
        let mut history = Vec::new();
        let mut n = 0;
        while r2 > tol && n < settings.max_iter {
            v_cycle(&mut self.levels);
            self.levels[0].smooth();
            r2 = self.levels[0].l2();
            n += 1;
            if settings.record_history {
                history.push(to_f64(r2));
            }
        }
        let fine = &mut self.levels[0];
        apply_periodic(&mut fine.x, &fine.periodic);
        self.iterations.push(n);
        SolveReport::new(n, to_f64(r2), settings.tol, history)
    }
}

impl<T: Real, const D: usize> PoissonSolver<T, D> for MultiLevelPoisson<T, D> {
    fn finest(&self) -> &Poisson<T, D> {
        &self.levels[0]
    }

    fn finest_mut(&mut self) -> &mut Poisson<T, D> {
        &mut self.levels[0]
    }

    fn update(&mut self, mu0: &VectorField<T, D>) {
        MultiLevelPoisson::update(self, mu0);
    }

    fn solve(&mut self) -> SolveReport {
        MultiLevelPoisson::solve(self)
    }

    fn iterations(&self) -> &[usize] {
        &self.iterations
    }
}
