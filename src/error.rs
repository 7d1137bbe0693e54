use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Invalid grid size: {0}")]
    InvalidGridSize(String),

    #[error("Grid cannot be coarsened for multigrid: {0}")]
    NotCoarsenable(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundaryError {
    #[error("Invalid boundary condition for {0}")]
    InvalidBoundaryCondition(String),

    #[error("Boundary velocity has {found} components, expected {expected}")]
    ComponentMismatch { expected: usize, found: usize },

    #[error("Periodic axis {axis} is out of range for a {dims}D grid")]
    PeriodicAxisOutOfRange { axis: usize, dims: usize },
}

/// Construction-time failures. Fatal to the constructor that raised them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot does not match the flow: {0}")]
    SnapshotMismatch(String),
}

/// A pressure solve that stopped at its iteration cap above tolerance.
///
/// Never returned as `Err`: the step still completes with the best available
/// correction. It is carried on the solve report and logged.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("pressure solve not converged after {iterations} iterations (residual {residual:.3e} > tolerance {tolerance:.3e})")]
pub struct ConvergenceWarning {
    pub iterations: usize,
    pub residual: f64,
    pub tolerance: f64,
}
