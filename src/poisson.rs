use serde::{Deserialize, Serialize};

use crate::boundary::bc::apply_periodic;
use crate::domain::field::{ScalarField, VectorField};
use crate::domain::grid::{minus, plus, Index};
use crate::error::ConvergenceWarning;
use crate::exec::Backend;
use crate::{real, to_f64, Real};

/// Relaxation applied between residual evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Smoother {
    /// Jacobi-preconditioned conjugate gradient, capped at `iterations`.
    Pcg { iterations: usize },
    Jacobi { iterations: usize },
}

impl Default for Smoother {
    fn default() -> Self {
        Smoother::Pcg { iterations: 6 }
    }
}

/// Convergence policy of a pressure solve. `tol` bounds the squared
/// residual norm `r·r` over interior cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub tol: f64,
    pub max_iter: usize,
    pub smoother: Smoother,
    /// Keep the residual after every iteration in [`SolveReport::history`].
    pub record_history: bool,
}

impl SolverSettings {
    pub fn single_level() -> Self {
        Self { tol: 1e-4, max_iter: 1000, smoother: Smoother::default(), record_history: false }
    }

    pub fn multigrid() -> Self {
        Self { tol: 2e-4, max_iter: 32, smoother: Smoother::default(), record_history: false }
    }
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self::multigrid()
    }
}

/// Outcome of one pressure solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    pub residual: f64,
    pub tolerance: f64,
    pub converged: bool,
    pub history: Vec<f64>,
}

impl SolveReport {
    pub(crate) fn new(iterations: usize, residual: f64, tolerance: f64, history: Vec<f64>) -> Self {
        Self { iterations, residual, tolerance, converged: residual <= tolerance, history }
    }

    pub fn warning(&self) -> Option<ConvergenceWarning> {
        (!self.converged).then(|| ConvergenceWarning {
            iterations: self.iterations,
            residual: self.residual,
            tolerance: self.tolerance,
        })
    }
}

/// A pressure solver the momentum step can project with.
pub trait PoissonSolver<T: Real, const D: usize> {
    /// The full-resolution system: its `x`, `z` and `l` are the solution,
    /// source and face conductances seen by the flow.
    fn finest(&self) -> &Poisson<T, D>;

    fn finest_mut(&mut self) -> &mut Poisson<T, D>;

    /// Reassembles the operator after `mu0` changed.
    fn update(&mut self, mu0: &VectorField<T, D>);

    fn solve(&mut self) -> SolveReport;

    /// Iteration count of every solve so far.
    fn iterations(&self) -> &[usize];
}

/// Variable-coefficient Poisson system `A x = z` on a staggered grid.
///
/// Only the face conductances `l` and the diagonal are stored; `A x` is
/// evaluated as a stencil. Rows with zero diagonal (cells sealed off by
/// zero-conductance faces) are degenerate and keep a zero residual.
#[derive(Debug, Clone)]
pub struct Poisson<T: Real, const D: usize> {
    pub l: VectorField<T, D>,
    pub diag: ScalarField<T, D>,
    pub inv_diag: ScalarField<T, D>,
    pub x: ScalarField<T, D>,
    pub z: ScalarField<T, D>,
    pub r: ScalarField<T, D>,
    pub eps: ScalarField<T, D>,
    q: ScalarField<T, D>,
    pub periodic: [bool; D],
    pub exec: Backend,
    pub settings: SolverSettings,
    degenerate: usize,
    iterations: Vec<usize>,
}

/// `(A x)[I]`
#[inline]
fn mult<T: Real, const D: usize>(
    l: &VectorField<T, D>,
    diag: &ScalarField<T, D>,
    x: &ScalarField<T, D>,
    index: Index<D>,
) -> T {
    (0..D).fold(x[index] * diag[index], |s, i| {
        let up = plus(index, i);
        s + x[minus(index, i)] * l[(index, i)] + x[up] * l[(up, i)]
    })
}

impl<T: Real, const D: usize> Poisson<T, D> {
    pub fn new(l: &VectorField<T, D>, periodic: [bool; D], exec: Backend, settings: SolverSettings) -> Self {
        let grid = *l.grid();
        let mut p = Self {
            l: l.clone(),
            diag: ScalarField::zeros(grid),
            inv_diag: ScalarField::zeros(grid),
            x: ScalarField::zeros(grid),
            z: ScalarField::zeros(grid),
            r: ScalarField::zeros(grid),
            eps: ScalarField::zeros(grid),
            q: ScalarField::zeros(grid),
            periodic,
            exec,
            settings,
            degenerate: 0,
            iterations: Vec::new(),
        };
        p.set_diag();
        p
    }

    /// Recomputes the diagonal `-Σᵢ (L[I,i] + L[I+δᵢ,i])` and its inverse.
    pub fn set_diag(&mut self) {
        let grid = *self.l.grid();
        let inside = grid.inside();
        let l = &self.l;
        self.exec.for_each(&grid, &inside, self.diag.as_mut_slice(), |index, d| {
            *d = -(0..D).fold(T::zero(), |s, i| s + l[(index, i)] + l[(plus(index, i), i)]);
        });
        let cutoff = T::default_epsilon() * real(2.0);
        let diag = &self.diag;
        self.exec.for_each(&grid, &inside, self.inv_diag.as_mut_slice(), |index, inv| {
            let d = diag[index];
            *inv = if d * d < cutoff { T::zero() } else { T::one() / d };
        });
        self.degenerate = inside.iter().filter(|&index| self.inv_diag[index] == T::zero()).count();
    }

    /// Copies new face conductances and reassembles.
    pub fn update(&mut self, l: &VectorField<T, D>) {
        self.l.copy_from(l);
        self.set_diag();
    }

    /// Interior rows whose diagonal vanished.
    pub fn degenerate_rows(&self) -> usize {
        self.degenerate
    }

    /// `out = A x` over interior cells. Ghost values of `x` are used as given.
    pub fn apply(&self, x: &ScalarField<T, D>, out: &mut ScalarField<T, D>) {
        let grid = *x.grid();
        self.exec.for_each(&grid, &grid.inside(), out.as_mut_slice(), |index, o| {
            *o = mult(&self.l, &self.diag, x, index);
        });
    }

    fn dot(&self, a: &ScalarField<T, D>, b: &ScalarField<T, D>) -> T {
        let grid = *a.grid();
        self.exec.sum(&grid, &grid.inside(), |index| a[index] * b[index])
    }

    /// Squared residual norm over interior cells.
    pub fn l2(&self) -> T {
        self.dot(&self.r, &self.r)
    }

    /// `r = z - A x`, zero on degenerate rows, then shifted so the
    /// non-degenerate residuals sum to zero. The shift makes the singular
    /// Neumann or periodic system solvable; `x` then solves `A x = z - mean`.
    pub fn residual(&mut self) {
        apply_periodic(&mut self.x, &self.periodic);
        let grid = *self.x.grid();
        let inside = grid.inside();
        self.exec.for_each(&grid, &inside, self.r.as_mut_slice(), |index, r| {
            *r = if self.inv_diag[index] == T::zero() {
                T::zero()
            } else {
                self.z[index] - mult(&self.l, &self.diag, &self.x, index)
            };
        });

        let active = inside.len() - self.degenerate;
        if active == 0 {
            return;
        }
        let mean = self.exec.sum(&grid, &inside, |index| self.r[index]) / real(active as f64);
        if mean.abs() <= T::default_epsilon() * real(2.0) {
            return;
        }
        self.exec.for_each(&grid, &inside, self.r.as_mut_slice(), |index, r| {
            if self.inv_diag[index] != T::zero() {
                *r -= mean;
            }
        });
    }

    /// Applies the correction `eps`: `r -= A eps`, `x += eps`.
    pub fn increment(&mut self) {
        apply_periodic(&mut self.eps, &self.periodic);
        let grid = *self.x.grid();
        let inside = grid.inside();
        self.exec.for_each(&grid, &inside, self.r.as_mut_slice(), |index, r| {
            *r -= mult(&self.l, &self.diag, &self.eps, index);
        });
        self.exec.for_each(&grid, &inside, self.x.as_mut_slice(), |index, x| {
            *x += self.eps[index];
        });
    }

    pub fn jacobi(&mut self, iterations: usize) {
        let grid = *self.x.grid();
        let inside = grid.inside();
        for _ in 0..iterations {
            self.exec.for_each(&grid, &inside, self.eps.as_mut_slice(), |index, e| {
                *e = self.r[index] * self.inv_diag[index];
            });
            self.increment();
        }
    }

    /// Conjugate gradient preconditioned with the inverse diagonal.
    ///
    /// Stops after `iterations` steps, once the step length drops below 1%
    /// of the first one, or once `r·D⁻¹r` is below `1e-8`.
    pub fn pcg(&mut self, iterations: usize) {
        let grid = *self.x.grid();
        let inside = grid.inside();
        let small: T = real(1e-8);
        let exec = self.exec;

        exec.for_each(&grid, &inside, self.q.as_mut_slice(), |index, q| {
            *q = self.r[index] * self.inv_diag[index];
        });
        self.eps.copy_from(&self.q);
        let mut rho = self.dot(&self.r, &self.q);
        if rho.abs() < small {
            return;
        }

        let mut first_alpha = None;
        for i in 1..=iterations {
            apply_periodic(&mut self.eps, &self.periodic);
            exec.for_each(&grid, &inside, self.q.as_mut_slice(), |index, q| {
                *q = mult(&self.l, &self.diag, &self.eps, index);
            });
            let curvature = self.dot(&self.q, &self.eps);
            if curvature == T::zero() {
                return;
            }
            let alpha = rho / curvature;
            exec.for_each(&grid, &inside, self.x.as_mut_slice(), |index, x| {
                *x += alpha * self.eps[index];
            });
            exec.for_each(&grid, &inside, self.r.as_mut_slice(), |index, r| {
                *r -= alpha * self.q[index];
            });

            let alpha0: T = *first_alpha.get_or_insert(alpha);
            if i == iterations || alpha.abs() < alpha0.abs() * real(0.01) {
                return;
            }

            exec.for_each(&grid, &inside, self.q.as_mut_slice(), |index, q| {
                *q = self.r[index] * self.inv_diag[index];
            });
            let rho2 = self.dot(&self.r, &self.q);
            if rho2.abs() < small {
                return;
            }
            let beta = rho2 / rho;
            exec.for_each(&grid, &inside, self.eps.as_mut_slice(), |index, e| {
                *e = beta * *e + self.q[index];
            });
            rho = rho2;
        }
    }

    pub fn smooth(&mut self) {
        match self.settings.smoother {
            Smoother::Pcg { iterations } => self.pcg(iterations),
            Smoother::Jacobi { iterations } => self.jacobi(iterations),
        }
    }

    /// Smooths until `r·r <= tol` or `max_iter` sweeps, starting from the current `x`.
    pub fn solve(&mut self) -> SolveReport {
        let settings = self.settings;
        let tol: T = real(settings.tol);
        self.residual();
        let mut r2 = self.l2();
        let mut history = Vec::new();
        let mut n = 0;
        while r2 > tol && n < settings.max_iter {
            self.smooth();
            r2 = self.l2();
            n += 1;
            if settings.record_history {
                history.push(to_f64(r2));
            }
        }
        apply_periodic(&mut self.x, &self.periodic);
        self.iterations.push(n);
        SolveReport::new(n, to_f64(r2), settings.tol, history)
    }
}

impl<T: Real, const D: usize> PoissonSolver<T, D> for Poisson<T, D> {
    fn finest(&self) -> &Poisson<T, D> {
        self
    }

    fn finest_mut(&mut self) -> &mut Poisson<T, D> {
        self
    }

    fn update(&mut self, mu0: &VectorField<T, D>) {
        Poisson::update(self, mu0);
    }

    fn solve(&mut self) -> SolveReport {
        Poisson::solve(self)
    }

    fn iterations(&self) -> &[usize] {
        &self.iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::bc::apply_vector_bc;
    use crate::domain::grid::Grid;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::SVector;
    use rsparse::data::{Sprs, Trpl};
    use rsparse::lusol;

    /// Smoothly varying conductances, zero on the domain boundary faces.
    fn conductance(dims: [usize; 2]) -> VectorField<f64, 2> {
        let grid = Grid::new(dims).unwrap();
        let mut l = VectorField::zeros(grid);
        for i in 0..2 {
            for index in grid.all() {
                let (x, y) = (index[0] as f64, index[1] as f64);
                l[(index, i)] = 1.0 + 0.4 * (0.7 * x + 0.3 * y + i as f64).sin();
            }
        }
        apply_vector_bc(&mut l, &SVector::zeros(), false, &[false, false]);
        l
    }

    fn source(grid: Grid<2>) -> ScalarField<f64, 2> {
        let mut z = ScalarField::zeros(grid);
        for index in grid.inside() {
            z[index] = (index[0] as f64 * 0.9).cos() * (index[1] as f64 * 0.4).sin();
        }
        let mean = z.interior().iter().sum::<f64>() / grid.inside().len() as f64;
        for index in grid.inside() {
            z[index] -= mean;
        }
        z
    }

    fn tight() -> SolverSettings {
        SolverSettings { tol: 1e-20, max_iter: 1000, ..SolverSettings::single_level() }
    }

    #[test]
    fn test_constant_is_in_the_null_space() {
        let l = conductance([8, 6]);
        let p = Poisson::new(&l, [false, false], Backend::Serial, SolverSettings::default());
        let ones = ScalarField::filled(*l.grid(), 1.0);
        let mut out = ScalarField::zeros(*l.grid());
        p.apply(&ones, &mut out);
        for index in l.grid().inside() {
            assert_abs_diff_eq!(out[index], 0.0, epsilon = 1e-12);
        }
        assert_eq!(p.degenerate_rows(), 0);
    }

    #[test]
    fn test_residual_sums_to_zero() {
        let l = conductance([6, 6]);
        let grid = *l.grid();
        let mut p = Poisson::new(&l, [false, false], Backend::Serial, SolverSettings::default());
        for index in grid.inside() {
            p.z[index] = 1.0 + index[0] as f64;
        }
        p.residual();
        let total: f64 = p.r.interior().iter().sum();
        assert_abs_diff_eq!(total, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sealed_cell_is_degenerate() {
        let mut l = conductance([6, 6]);
        let cell = [3, 3];
        l[(cell, 0)] = 0.0;
        l[([4, 3], 0)] = 0.0;
        l[(cell, 1)] = 0.0;
        l[([3, 4], 1)] = 0.0;
        let mut p = Poisson::new(&l, [false, false], Backend::Serial, SolverSettings::default());
        assert_eq!(p.degenerate_rows(), 1);
        p.z[cell] = 5.0;
        p.residual();
        assert_eq!(p.r[cell], 0.0);
    }

    #[test]
    fn test_jacobi_reduces_residual() {
        let l = conductance([8, 8]);
        let settings = SolverSettings { smoother: Smoother::Jacobi { iterations: 1 }, ..tight() };
        let mut p = Poisson::new(&l, [false, false], Backend::Serial, settings);
        p.z.copy_from(&source(*l.grid()));
        p.residual();
        let before = p.l2();
        p.jacobi(20);
        assert!(p.l2() < before);
    }

    #[test]
    fn test_solve_matches_sparse_lu() {
        let dims = [8, 6];
        let l = conductance(dims);
        let grid = *l.grid();
        let z = source(grid);

        let settings = SolverSettings { smoother: Smoother::Jacobi { iterations: 20 }, ..tight() };
        let mut p = Poisson::new(&l, [false, false], Backend::Serial, settings);
        p.z.copy_from(&z);
        let report = p.solve();
        assert!(report.converged);

        // same operator assembled as a sparse matrix, first row pinned
        let cells: Vec<_> = grid.inside().iter().collect();
        let k = |index: &Index<2>| (index[0] - 1) + (index[1] - 1) * dims[0];
        let mut trpl = Trpl::<f64> { m: cells.len(), n: cells.len(), p: Vec::new(), i: Vec::new(), x: Vec::new() };
        let mut push = |row: usize, col: usize, v: f64| {
            trpl.i.push(row);
            trpl.p.push(col as isize);
            trpl.x.push(v);
        };
        for index in &cells {
            let row = k(index);
            if row == 0 {
                push(0, 0, 1.0);
                continue;
            }
            push(row, row, p.diag[*index]);
            for i in 0..2 {
                if index[i] > 1 {
                    push(row, k(&minus(*index, i)), l[(*index, i)]);
                }
                if index[i] < dims[i] {
                    let up = plus(*index, i);
                    push(row, k(&up), l[(up, i)]);
                }
            }
        }
        let mut a = Sprs::<f64>::new();
        a.from_trpl(&trpl);
        let mut f: Vec<f64> = cells.iter().map(|index| z[*index]).collect();
        f[0] = 0.0;
        assert!(lusol(&a, &mut f, 1, 1e-10).is_ok());

        let shift = p.x[cells[0]];
        for index in &cells {
            assert_relative_eq!(p.x[*index] - shift, f[k(index)], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_converged_solve_is_idempotent() {
        let l = conductance([8, 8]);
        let mut p = Poisson::new(&l, [false, false], Backend::Threaded, SolverSettings::single_level());
        p.z.copy_from(&source(*l.grid()));
        p.solve();
        let first = p.x.clone();
        let report = p.solve();
        assert_eq!(report.iterations, 0);
        assert_eq!(p.x, first);
        assert_eq!(PoissonSolver::iterations(&p).len(), 2);
    }

    #[test]
    fn test_report_warning() {
        let report = SolveReport::new(32, 1e-3, 2e-4, Vec::new());
        assert!(!report.converged);
        assert_eq!(report.warning().unwrap().iterations, 32);
        assert!(SolveReport::new(3, 1e-5, 2e-4, Vec::new()).warning().is_none());
    }

    #[test]
    fn test_settings_from_json() {
        let s: SolverSettings = serde_json::from_str(r#"{"tol": 1e-6, "smoother": {"kind": "jacobi", "iterations": 2}}"#).unwrap();
        assert_eq!(s.tol, 1e-6);
        assert_eq!(s.max_iter, 32);
        assert_eq!(s.smoother, Smoother::Jacobi { iterations: 2 });
    }
}
