//! Append-only trajectory destinations.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::evaluator::{Trajectory, TrajectoryRow};

/// Somewhere completed trajectories can be appended.
pub trait TrajectorySink: Send {
    fn append(&mut self, traj: &Trajectory) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct Line<'a> {
    t: usize,
    system: &'a str,
    arm: usize,
    reward: u8,
    cum_reward: u64,
    inst_regret: f64,
    cum_regret: f64,
    switched: bool,
}

impl<'a> Line<'a> {
    fn new(system: &'a str, r: &TrajectoryRow) -> Self {
        Self {
            t: r.t,
            system,
            arm: r.arm,
            reward: r.reward,
            cum_reward: r.cum_reward,
            inst_regret: r.inst_regret,
            cum_regret: r.cum_regret,
            switched: r.switched,
        }
    }
}

/// One JSON object per trajectory row, newline-delimited.
#[derive(Debug)]
pub struct JsonlSink<W: Write> {
    out: W,
    rows: u64,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, rows: 0 }
    }

    /// Rows written so far.
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> TrajectorySink for JsonlSink<W> {
    fn append(&mut self, traj: &Trajectory) -> Result<()> {
        for r in traj.rows() {
            let line = Line::new(traj.system(), r);
            serde_json::to_writer(&mut self.out, &line).map_err(Error::Encode)?;
            self.out.write_all(b"\n")?;
            self.rows += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps every appended trajectory in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub trajectories: Vec<Trajectory>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrajectorySink for MemorySink {
    fn append(&mut self, traj: &Trajectory) -> Result<()> {
        self.trajectories.push(traj.clone());
        Ok(())
    }
}

/// Shared sink, so a caller can keep a handle while the orchestrator writes.
impl<S: TrajectorySink> TrajectorySink for Arc<Mutex<S>> {
    fn append(&mut self, traj: &Trajectory) -> Result<()> {
        self.lock()
            .map_err(|_| std::io::Error::other("trajectory sink lock poisoned"))?
            .append(traj)
    }

    fn flush(&mut self) -> Result<()> {
        self.lock()
            .map_err(|_| std::io::Error::other("trajectory sink lock poisoned"))?
            .flush()
    }
}
