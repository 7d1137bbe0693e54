use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use crate::body::Body;
use crate::config::SimulationConfig;
use crate::error::ConfigError;
use crate::flow::{Flow, StepReport};
use crate::measure::measure;
use crate::multigrid::MultiLevelPoisson;
use crate::poisson::PoissonSolver;
use crate::{to_f64, Real};

/// A [`Flow`] together with its immersed body and pressure solver.
///
/// Time is reported both in grid units ([`time`](Self::time)) and scaled by
/// `U/L` ([`sim_time`](Self::sim_time)).
pub struct Simulation<T: Real, const D: usize> {
    pub flow: Flow<T, D>,
    pub pois: MultiLevelPoisson<T, D>,
    pub body: Box<dyn Body<T, D>>,
    pub length_scale: T,
    pub velocity_scale: T,
    pub epsilon: T,
}

impl<T: Real, const D: usize> Simulation<T, D> {
    /// Builds the flow, measures `body` at `t = 0` and assembles the
    /// multigrid hierarchy from the measured conductances.
    pub fn new(config: SimulationConfig<T, D>, body: impl Body<T, D> + 'static) -> Result<Self, ConfigError> {
        config.validate()?;
        let velocity_scale = config.velocity_scale()?;
        let mut flow = Flow::new(config.flow)?;
        measure(&mut flow, &body, T::zero(), config.epsilon);
        let pois = MultiLevelPoisson::new(&flow.mu0, flow.periodic, flow.exec, config.solver)?;
        debug!(degenerate = pois.finest().degenerate_rows(), "pressure operator assembled");
        info!(
            dims = ?flow.grid().dims(),
            levels = pois.len(),
            "simulation ready"
        );
        Ok(Self {
            flow,
            pois,
            body: Box::new(body),
            length_scale: config.length_scale,
            velocity_scale,
            epsilon: config.epsilon,
        })
    }

    /// Time in grid units.
    pub fn time(&self) -> T {
        self.flow.time()
    }

    /// Convective time `t U / L`.
    pub fn sim_time(&self) -> T {
        self.time() * self.velocity_scale / self.length_scale
    }

    /// Remeasures the body at `t` and rebuilds the pressure operator.
    pub fn measure(&mut self, t: T) {
        measure(&mut self.flow, &self.body, t, self.epsilon);
        self.pois.update(&self.flow.mu0);
        debug!(degenerate = self.pois.finest().degenerate_rows(), "pressure operator assembled");
    }

    /// One momentum step. A moving body should be remeasured, at the time
    /// the step ends.
    pub fn step(&mut self, remeasure: bool) -> StepReport<T> {
        if remeasure {
            let t = self.time() + self.flow.dt_next();
            self.measure(t);
        }
        let report = self.flow.mom_step(&mut self.pois);
        for warning in report.warnings() {
            warn!(time = to_f64(report.time), "{warning}");
        }
        report
    }

    /// Steps until `sim_time()` reaches `t_end` or `max_steps` were taken.
    pub fn sim_step(&mut self, t_end: T, remeasure: bool, max_steps: usize) -> Vec<StepReport<T>> {
        let mut reports = Vec::new();
        while self.sim_time() < t_end && reports.len() < max_steps {
            reports.push(self.step(remeasure));
        }
        reports
    }

    /// Takes `num_steps` steps on a static body, logging progress.
    pub fn run(&mut self, num_steps: usize) -> Vec<StepReport<T>> {
        let _run_span = info_span!("simulation_run", num_steps).entered();
        info!("Starting simulation with {} steps", num_steps);
        let start = Instant::now();

        let mut reports = Vec::with_capacity(num_steps);
        for i in 0..num_steps {
            let _step_span = info_span!("time_step", step = i + 1).entered();
            let step_start = Instant::now();
            let report = self.step(false);
            info!(
                "Step {}: time={:.4}, dt={:.4}, div={:.3e}, elapsed={:.2}ms",
                i + 1,
                to_f64(self.sim_time()),
                to_f64(report.dt),
                to_f64(self.flow.divergence_l2()),
                step_start.elapsed().as_millis()
            );
            reports.push(report);
        }

        info!("Simulation finished in {:.2}s", start.elapsed().as_secs_f64());
        reports
    }
}
