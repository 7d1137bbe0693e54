use std::env;

use bdim_flow::{
    AutoBody, BoundaryVelocity, FlowConfig, JsonOutputManager, Simulation, SimulationConfig, SimulationFile,
};
use nalgebra::Vector2;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const REYNOLDS: f64 = 250.0;
const END_TIME: f64 = 2.0;
const MAX_STEPS: usize = 2000;

/// Flow past a circle of diameter `L` a quarter of the way down a channel.
fn default_config() -> SimulationConfig<f64, 2> {
    let length = 16.0;
    let flow = FlowConfig {
        nu: length / REYNOLDS,
        exit_bc: true,
        ..FlowConfig::new([8 * length as usize, 4 * length as usize], BoundaryVelocity::uniform(Vector2::new(1.0, 0.0)))
    };
    SimulationConfig::new(flow, length)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            SimulationFile::from_path(path)?.into_config::<2>()?
        }
        None => default_config(),
    };

    let [nx, ny] = config.flow.dims;
    let centre = Vector2::new(nx as f64 / 4.0, ny as f64 / 2.0);
    let radius = config.length_scale / 2.0;
    let circle = AutoBody::new(move |x: &Vector2<f64>, _| (x - centre).norm() - radius);

    let mut sim = Simulation::new(config, circle)?;
    let mut output = JsonOutputManager::new("output/flow.json", Some(100))?;

    let mut step = 0;
    output.collect(step, &sim.flow);
    while sim.sim_time() < END_TIME && step < MAX_STEPS {
        let report = sim.step(false);
        step += 1;
        if !report.warnings().is_empty() {
            warn!("Step {} finished with an unconverged pressure solve", step);
        }
        let is_final = sim.sim_time() >= END_TIME || step == MAX_STEPS;
        if step % 50 == 0 || is_final {
            info!(
                "Step {}: time={:.4}, dt={:.4}, div={:.3e}",
                step,
                sim.sim_time(),
                report.dt,
                sim.flow.divergence_l2()
            );
        }
        if output.should_collect(step, is_final) {
            output.collect(step, &sim.flow);
        }
    }

    output.write()?;
    Ok(())
}
