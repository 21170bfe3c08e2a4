// Runs a command and polls its CPU and memory usage until it exits

use std::process::Stdio;
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::{Result, SolverError};
use crate::formulation::resource_tuning::UsageProfile;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One poll of the child process
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UsageSample {
    /// Seconds since the command was spawned
    pub elapsed: f64,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SampledRun {
    pub samples: Vec<UsageSample>,
    /// Wall-clock seconds from spawn to exit
    pub execution_time: f64,
    pub success: bool,
}

impl SampledRun {
    pub fn peak_cpu_percent(&self) -> f64 {
        self.samples.iter().map(|s| s.cpu_percent).fold(0.0, f64::max)
    }

    pub fn peak_memory_mb(&self) -> f64 {
        self.samples.iter().map(|s| s.memory_mb).fold(0.0, f64::max)
    }

    pub fn profile(&self) -> UsageProfile {
        UsageProfile {
            execution_time: self.execution_time,
            peak_cpu_percent: self.peak_cpu_percent(),
            peak_memory_mb: self.peak_memory_mb(),
        }
    }
}

/// Polls a spawned command's own process; grandchildren are not counted.
#[derive(Debug, Clone)]
pub struct ResourceSampler {
    interval: Duration,
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

    pub fn new() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn `program` with `args` and sample it until it exits.
    ///
    /// The command's stdout is discarded. A non-zero exit is reported through
    /// `SampledRun::success`, not as an error.
    pub async fn run(&self, program: &str, args: &[String]) -> Result<SampledRun> {
        if program.trim().is_empty() {
            return Err(SolverError::InvalidInput("command must not be empty".into()));
        }
        if self.interval.is_zero() {
            return Err(SolverError::InvalidInput(
                "sampling interval must be positive".into(),
            ));
        }

        let started = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| SolverError::Sampling(format!("failed to start '{program}': {err}")))?;
        let pid = child
            .id()
            .map(Pid::from_u32)
            .ok_or_else(|| SolverError::Sampling(format!("'{program}' exited before sampling")))?;
        info!(program, pid = pid.as_u32(), "sampling command");

        let mut system = System::new();
        let mut samples = Vec::new();
        let mut ticker = tokio::time::interval(self.interval);
        let status = loop {
            ticker.tick().await;
            let polled = child
                .try_wait()
                .map_err(|err| SolverError::Sampling(format!("failed to poll '{program}': {err}")))?;
            if let Some(status) = polled {
                break status;
            }
            if let Some(sample) = sample_process(&mut system, pid, started.elapsed()) {
                samples.push(sample);
            }
        };

        let run = SampledRun {
            samples,
            execution_time: started.elapsed().as_secs_f64(),
            success: status.success(),
        };
        debug!(
            samples = run.samples.len(),
            execution_time = run.execution_time,
            peak_cpu = run.peak_cpu_percent(),
            peak_memory_mb = run.peak_memory_mb(),
            success = run.success,
            "command finished"
        );
        Ok(run)
    }
}

fn sample_process(system: &mut System, pid: Pid, elapsed: Duration) -> Option<UsageSample> {
    // Only refresh the child, not the entire process table
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_cpu().with_memory(),
    );
    let process = system.process(pid)?;
    Some(UsageSample {
        elapsed: elapsed.as_secs_f64(),
        cpu_percent: f64::from(process.cpu_usage()),
        memory_mb: process.memory() as f64 / BYTES_PER_MB,
    })
}
