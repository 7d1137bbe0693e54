//! Immersed-boundary incompressible flow on a staggered Cartesian grid.
//!
//! Solid bodies are immersed with the Boundary Data Immersion Method (BDIM):
//! a body's signed distance is measured into smoothed kernel moments, which
//! weight both the momentum update and the pressure Poisson operator. The
//! pressure is solved with a geometric multigrid / conjugate-gradient hybrid.

pub mod body;
pub mod boundary;
pub mod config;
pub mod domain;
pub mod error;
pub mod exec;
pub mod flow;
pub mod json_io;
pub mod measure;
pub mod multigrid;
pub mod numerical;
pub mod poisson;
pub mod solver;

use nalgebra::RealField;

pub use body::{AutoBody, Bodies, Body, Measurement, NoBody, SdfOp};
pub use boundary::bc::BoundaryVelocity;
pub use config::{FlowConfig, SimulationConfig, SimulationFile};
pub use domain::field::{ScalarField, VectorField};
pub use domain::grid::{Grid, Location, Region};
pub use error::{BoundaryError, ConfigError, ConvergenceWarning, GridError, SolverError};
pub use exec::Backend;
pub use flow::{Flow, StepReport};
pub use json_io::{FlowSnapshot, JsonOutputManager};
pub use multigrid::MultiLevelPoisson;
pub use poisson::{Poisson, PoissonSolver, SolveReport, SolverSettings, Smoother};
pub use solver::Simulation;

/// Floating-point element type of every field.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Converts an `f64` constant into the working precision.
#[inline]
pub fn real<T: Real>(v: f64) -> T {
    nalgebra::convert(v)
}

/// Lossy conversion back to `f64` for reports and logs.
#[inline]
pub(crate) fn to_f64<T: Real>(v: T) -> f64 {
    v.to_subset().unwrap_or(f64::NAN)
}
