use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SolverError;
use crate::flow::Flow;
use crate::{real, to_f64, Real};

/// Field buffers of a [`Flow`], ghosts included, plus its step history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub dims: Vec<usize>,
    pub time: f64,
    /// Every step size taken, the pending one last.
    pub dt: Vec<f64>,
    /// One flat array per velocity component, in grid order.
    pub velocity: Vec<Vec<f64>>,
    pub pressure: Vec<f64>,
}

fn to_vec<T: Real>(values: &[T]) -> Vec<f64> {
    values.iter().map(|&v| to_f64(v)).collect()
}

impl FlowSnapshot {
    pub fn from_flow<T: Real, const D: usize>(flow: &Flow<T, D>) -> Self {
        Self {
            dims: flow.grid().dims().to_vec(),
            time: to_f64(flow.time()),
            dt: to_vec(&flow.dt),
            velocity: (0..D).map(|i| to_vec(flow.u.component(i))).collect(),
            pressure: to_vec(flow.p.as_slice()),
        }
    }

    /// Overwrites the velocity, pressure and step history of `flow`.
    pub fn restore<T: Real, const D: usize>(&self, flow: &mut Flow<T, D>) -> Result<(), SolverError> {
        let dims = flow.grid().dims();
        if self.dims != dims {
            return Err(SolverError::SnapshotMismatch(format!(
                "snapshot grid {:?}, flow grid {:?}",
                self.dims, dims
            )));
        }
        let len = flow.grid().len();
        if self.velocity.len() != D
            || self.pressure.len() != len
            || self.velocity.iter().any(|c| c.len() != len)
        {
            return Err(SolverError::SnapshotMismatch(format!(
                "field lengths do not match {len} cells per component"
            )));
        }
        if self.dt.is_empty() {
            return Err(SolverError::SnapshotMismatch("empty step history".to_string()));
        }

        for (i, values) in self.velocity.iter().enumerate() {
            for (u, &v) in flow.u.component_mut(i).iter_mut().zip(values) {
                *u = real(v);
            }
        }
        flow.u0.copy_from(&flow.u);
        for (p, &v) in flow.p.as_mut_slice().iter_mut().zip(&self.pressure) {
            *p = real(v);
        }
        flow.dt = self.dt.iter().map(|&dt| real(dt)).collect();
        Ok(())
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), SolverError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, SolverError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[derive(Serialize)]
struct SimulationOutput<'a> {
    output_frequency: Option<usize>,
    snapshots: &'a [(usize, FlowSnapshot)],
}

/// Collects snapshots during a run and writes them to one JSON file.
#[derive(Debug)]
pub struct JsonOutputManager {
    pub output_filepath: PathBuf,
    /// Collect every `n` steps; `Some(0)` keeps only the first and last,
    /// `None` keeps every step.
    pub output_frequency: Option<usize>,
    pub collected: Vec<(usize, FlowSnapshot)>,
}

impl JsonOutputManager {
    /// Creates the parent directory of `output_filepath` if needed.
    pub fn new<P: Into<PathBuf>>(output_filepath: P, output_frequency: Option<usize>) -> Result<Self, SolverError> {
        let output_filepath = output_filepath.into();
        if let Some(parent) = output_filepath.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
            info!("Ensured output directory exists: {}", parent.display());
        }
        Ok(Self { output_filepath, output_frequency, collected: Vec::new() })
    }

    pub fn should_collect(&self, step: usize, is_final_step: bool) -> bool {
        match self.output_frequency {
            Some(0) => step == 0 || is_final_step,
            Some(freq) => step == 0 || step % freq == 0 || is_final_step,
            None => true,
        }
    }

    pub fn collect<T: Real, const D: usize>(&mut self, step: usize, flow: &Flow<T, D>) {
        info!("Collecting data for step {} (time {:.4})", step, to_f64(flow.time()));
        self.collected.push((step, FlowSnapshot::from_flow(flow)));
    }

    pub fn write(&self) -> Result<(), SolverError> {
        if self.collected.is_empty() {
            info!("No data collected, skipping JSON output to {}", self.output_filepath.display());
            return Ok(());
        }
        info!("Writing collected data to JSON file: {}", self.output_filepath.display());
        let start = Instant::now();
        let output = SimulationOutput { output_frequency: self.output_frequency, snapshots: &self.collected };
        let mut writer = BufWriter::new(File::create(&self.output_filepath)?);
        serde_json::to_writer_pretty(&mut writer, &output)?;
        writer.flush()?;
        info!("JSON output finished in {:.2}ms", start.elapsed().as_millis());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::bc::BoundaryVelocity;
    use crate::config::FlowConfig;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;
    use tempfile::tempdir;

    fn flow(dims: [usize; 2]) -> Flow<f64, 2> {
        Flow::new(FlowConfig::new(dims, BoundaryVelocity::uniform(Vector2::new(1.0, 0.5)))).unwrap()
    }

    #[test]
    fn test_snapshot_restores_fields() -> Result<(), SolverError> {
        let dir = tempdir()?;
        let path = dir.path().join("snapshot.json");
        let mut source = flow([8, 4]);
        source.p.fill(3.0);
        source.dt.push(0.5);
        FlowSnapshot::from_flow(&source).write(&path)?;

        let snapshot = FlowSnapshot::read(&path)?;
        assert_eq!(snapshot.dims, vec![8, 4]);
        assert_relative_eq!(snapshot.time, 0.25);

        let mut target = flow([8, 4]);
        target.u.fill(0.0);
        snapshot.restore(&mut target)?;
        assert_eq!(target.u, source.u);
        assert_eq!(target.u0, source.u);
        assert_eq!(target.p, source.p);
        assert_eq!(target.dt, vec![0.25, 0.5]);
        Ok(())
    }

    #[test]
    fn test_restore_rejects_other_grid() {
        let snapshot = FlowSnapshot::from_flow(&flow([8, 4]));
        let mut other = flow([4, 8]);
        assert!(matches!(snapshot.restore(&mut other), Err(SolverError::SnapshotMismatch(_))));

        let mut truncated = snapshot.clone();
        truncated.pressure.pop();
        assert!(matches!(truncated.restore(&mut flow([8, 4])), Err(SolverError::SnapshotMismatch(_))));
    }

    #[test]
    fn test_manager_new_creates_dir() -> Result<(), SolverError> {
        let dir = tempdir()?;
        let path = dir.path().join("subdir").join("output.json");
        assert!(!dir.path().join("subdir").exists());
        let _manager = JsonOutputManager::new(&path, Some(10))?;
        assert!(dir.path().join("subdir").exists());
        Ok(())
    }

    #[test]
    fn test_should_collect_logic() {
        let every_ten = JsonOutputManager { output_filepath: PathBuf::new(), output_frequency: Some(10), collected: vec![] };
        assert!(every_ten.should_collect(0, false));
        assert!(!every_ten.should_collect(1, false));
        assert!(every_ten.should_collect(10, false));
        assert!(every_ten.should_collect(99, true));

        let ends = JsonOutputManager { output_frequency: Some(0), ..every_ten };
        assert!(ends.should_collect(0, false));
        assert!(!ends.should_collect(10, false));
        assert!(ends.should_collect(100, true));

        let all = JsonOutputManager { output_frequency: None, ..ends };
        assert!(all.should_collect(7, false));
    }

    #[test]
    fn test_collect_and_write() -> Result<(), SolverError> {
        let dir = tempdir()?;
        let path = dir.path().join("run.json");
        let mut manager = JsonOutputManager::new(&path, None)?;
        manager.write()?;
        assert!(!path.exists());

        let mut f = flow([4, 4]);
        manager.collect(0, &f);
        f.p.fill(5.0);
        manager.collect(1, &f);
        manager.write()?;

        let output: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        let snapshots = output["snapshots"].as_array().unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[1][0], 1);
        assert_relative_eq!(snapshots[1][1]["pressure"][0].as_f64().unwrap(), 5.0);
        Ok(())
    }
}
