//! Process resource sampling for workflow runs.
//!
//! Memory is the `VmRSS` line of `/proc/self/status`; CPU time is
//! `utime + stime` from `/proc/self/stat`. On platforms without procfs every
//! reading is zero and the CPU model falls back to the target architecture.

use std::time::Instant;

use pipeline::{CpuMetrics, ExecutionMetrics, MemoryMetrics};

/// `USER_HZ`, the unit of the `/proc/<pid>/stat` time fields. The kernel
/// exports it as 100 on every architecture regardless of the internal tick rate.
const CLOCK_TICKS_PER_SEC: f64 = 100.0;
const KB_PER_MB: f64 = 1024.0;

/// Collects memory samples and CPU time across one workflow run.
#[derive(Debug)]
pub struct ResourceSampler {
    started: Instant,
    cpu_at_start: f64,
    memory_mb: Vec<f64>,
}

impl ResourceSampler {
    /// Starts sampling; takes the first memory reading immediately.
    pub fn start() -> Self {
        let mut sampler = Self {
            started: Instant::now(),
            cpu_at_start: cpu_seconds().unwrap_or(0.0),
            memory_mb: Vec::new(),
        };
        sampler.sample();
        sampler
    }

    pub fn sample(&mut self) {
        if let Some(mb) = resident_mb() {
            self.memory_mb.push(mb);
        }
    }

    /// Takes a final reading and summarises the run.
    pub fn finish(mut self) -> ExecutionMetrics {
        self.sample();
        let elapsed = self.started.elapsed();
        let usage = (cpu_seconds().unwrap_or(0.0) - self.cpu_at_start).max(0.0);
        let wall = elapsed.as_secs_f64();
        let percentage = if wall > 0.0 { usage / wall * 100.0 } else { 0.0 };

        ExecutionMetrics {
            elapsed,
            memory: summarise(&self.memory_mb),
            cpu: CpuMetrics {
                percentage,
                usage,
                total: std::thread::available_parallelism().map_or(1, usize::from),
                model: cpu_model(),
            },
        }
    }
}

fn summarise(samples: &[f64]) -> MemoryMetrics {
    if samples.is_empty() {
        return MemoryMetrics::default();
    }
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = samples.iter().sum::<f64>() / samples.len() as f64;
    MemoryMetrics {
        min_mb: min,
        avg_mb: avg,
        max_mb: max,
    }
}

fn resident_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_resident_kb(&status).map(|kb| kb as f64 / KB_PER_MB)
}

fn cpu_seconds() -> Option<f64> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    parse_cpu_ticks(&stat).map(|ticks| ticks as f64 / CLOCK_TICKS_PER_SEC)
}

fn cpu_model() -> String {
    std::fs::read_to_string("/proc/cpuinfo")
        .ok()
        .and_then(|info| parse_cpu_model(&info))
        .unwrap_or_else(|| std::env::consts::ARCH.to_owned())
}

/// `VmRSS` from `/proc/self/status`. The kernel reports it in kB, so the
/// reading does not depend on the page size.
fn parse_resident_kb(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let mut fields = line["VmRSS:".len()..].split_whitespace();
    let value = fields.next()?.parse().ok()?;
    match fields.next() {
        Some("kB") | None => Some(value),
        Some(_) => None,
    }
}

/// `utime + stime` from `/proc/self/stat`.
///
/// The command name (field 2) may contain spaces, so fields are counted from
/// the closing parenthesis; `utime` and `stime` are fields 14 and 15.
fn parse_cpu_ticks(stat: &str) -> Option<u64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace().skip(11);
    let utime: u64 = fields.next()?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(utime + stime)
}

fn parse_cpu_model(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|line| line.starts_with("model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, model)| model.trim().to_owned())
}
