use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

use crate::boundary::bc::{BoundaryVelocity, ComponentFn};
use crate::error::{BoundaryError, ConfigError, GridError, SolverError};
use crate::exec::Backend;
use crate::numerical::Limiter;
use crate::poisson::SolverSettings;
use crate::{real, Real};

/// Initial velocity `u(i, x)`: component `i` at the face location `x`.
pub type VelocityFn<T, const D: usize> = Arc<dyn Fn(usize, &SVector<T, D>) -> T + Send + Sync>;

/// Everything a [`Flow`](crate::Flow) is built from.
#[derive(Clone)]
pub struct FlowConfig<T: Real, const D: usize> {
    /// Interior cells per axis.
    pub dims: [usize; D],
    pub boundary: BoundaryVelocity<T, D>,
    /// First time step.
    pub dt: T,
    /// Kinematic viscosity in grid units.
    pub nu: T,
    /// Uniform body force `g(i, t)`.
    pub acceleration: Option<ComponentFn<T>>,
    /// Defaults to the boundary velocity at `t = 0`.
    pub initial_velocity: Option<VelocityFn<T, D>>,
    pub periodic: [bool; D],
    /// Convective outflow on the upper face of the first axis.
    pub exit_bc: bool,
    pub limiter: Limiter,
    pub exec: Backend,
}

impl<T: Real, const D: usize> FlowConfig<T, D> {
    pub fn new(dims: [usize; D], boundary: BoundaryVelocity<T, D>) -> Self {
        Self {
            dims,
            boundary,
            dt: real(0.25),
            nu: T::zero(),
            acceleration: None,
            initial_velocity: None,
            periodic: [false; D],
            exit_bc: false,
            limiter: Limiter::default(),
            exec: Backend::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt > T::zero()) {
            return Err(ConfigError::InvalidParameter(format!("time step must be positive, got {}", self.dt)));
        }
        if self.nu < T::zero() {
            return Err(ConfigError::InvalidParameter(format!("viscosity must be non-negative, got {}", self.nu)));
        }
        if self.exit_bc && self.periodic[0] {
            return Err(BoundaryError::InvalidBoundaryCondition(
                "exit boundary on a periodic axis".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

/// [`FlowConfig`] plus what the [`Simulation`](crate::Simulation) wrapper needs.
#[derive(Clone)]
pub struct SimulationConfig<T: Real, const D: usize> {
    pub flow: FlowConfig<T, D>,
    /// Length scale `L` for non-dimensional time.
    pub length_scale: T,
    /// Velocity scale `U`; defaults to the magnitude of the boundary velocity.
    pub velocity_scale: Option<T>,
    /// BDIM kernel half-width in cells.
    pub epsilon: T,
    pub solver: SolverSettings,
}

impl<T: Real, const D: usize> SimulationConfig<T, D> {
    pub fn new(flow: FlowConfig<T, D>, length_scale: T) -> Self {
        Self {
            flow,
            length_scale,
            velocity_scale: None,
            epsilon: T::one(),
            solver: SolverSettings::multigrid(),
        }
    }

    /// Resolves `U`. A time-varying boundary needs it given explicitly.
    pub fn velocity_scale(&self) -> Result<T, ConfigError> {
        let u = match (self.velocity_scale, &self.flow.boundary) {
            (Some(u), _) => u,
            (None, BoundaryVelocity::Uniform(values)) => values.norm(),
            (None, BoundaryVelocity::Varying(_)) => {
                return Err(ConfigError::InvalidParameter(
                    "velocity scale must be given for a time-varying boundary".to_string(),
                ))
            }
        };
        if !(u > T::zero()) {
            return Err(ConfigError::InvalidParameter(format!(
                "velocity scale must be positive, got {u}; set it explicitly when the boundary is at rest"
            )));
        }
        Ok(u)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.flow.validate()?;
        if !(self.length_scale > T::zero()) {
            return Err(ConfigError::InvalidParameter(format!(
                "length scale must be positive, got {}",
                self.length_scale
            )));
        }
        if !(self.epsilon > T::zero()) {
            return Err(ConfigError::InvalidParameter(format!("kernel width must be positive, got {}", self.epsilon)));
        }
        self.velocity_scale().map(|_| ())
    }
}

fn default_dt() -> f64 {
    0.25
}

fn default_epsilon() -> f64 {
    1.0
}

/// On-disk form of a [`SimulationConfig`], read from JSON.
///
/// ```json
/// { "dims": [128, 64], "inflow": [1.0, 0.0], "length_scale": 16.0, "nu": 0.016 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationFile {
    pub dims: Vec<usize>,
    pub inflow: Vec<f64>,
    pub length_scale: f64,
    #[serde(default)]
    pub velocity_scale: Option<f64>,
    #[serde(default = "default_dt")]
    pub dt: f64,
    #[serde(default)]
    pub nu: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Periodic axes by index.
    #[serde(default)]
    pub periodic: Vec<usize>,
    #[serde(default)]
    pub exit_bc: bool,
    /// Constant body force per component.
    #[serde(default)]
    pub acceleration: Option<Vec<f64>>,
    #[serde(default)]
    pub limiter: Limiter,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub solver: SolverSettings,
}

impl SimulationFile {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SolverError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Checks every length against `D` and builds the typed configuration.
    pub fn into_config<const D: usize>(self) -> Result<SimulationConfig<f64, D>, ConfigError> {
        let dims: [usize; D] = self.dims.as_slice().try_into().map_err(|_| {
            GridError::InvalidGridSize(format!("expected {D} dimensions, got {:?}", self.dims))
        })?;
        let boundary = BoundaryVelocity::from_slice(&self.inflow)?;

        let mut periodic = [false; D];
        for &axis in &self.periodic {
            if axis >= D {
                return Err(BoundaryError::PeriodicAxisOutOfRange { axis, dims: D }.into());
            }
            periodic[axis] = true;
        }

        let acceleration = match self.acceleration {
            Some(g) if g.len() != D => {
                return Err(BoundaryError::ComponentMismatch { expected: D, found: g.len() }.into())
            }
            Some(g) => Some(Arc::new(move |i: usize, _t: f64| g[i]) as ComponentFn<f64>),
            None => None,
        };

        let flow = FlowConfig {
            dt: self.dt,
            nu: self.nu,
            acceleration,
            periodic,
            exit_bc: self.exit_bc,
            limiter: self.limiter,
            exec: self.backend,
            ..FlowConfig::new(dims, boundary)
        };
        let config = SimulationConfig {
            velocity_scale: self.velocity_scale,
            epsilon: self.epsilon,
            solver: self.solver,
            ..SimulationConfig::new(flow, self.length_scale)
        };
        config.validate()?;
        Ok(config)
    }
}
