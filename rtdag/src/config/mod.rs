/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! DAG descriptor loading and run settings.
//!
//! The expected YAML structure is:
//! ```yaml
//! name: chain
//! period_us: 100000
//! deadline_us: 90000
//! hyperperiod_us: 100000        # optional, see below
//! co_scheduled_periods_us: []   # optional
//! activations: 1                # optional
//! tasks:
//!   - { name: A, wcet_us: 10000, deadline_us: 30000, affinity: 1 }
//!   - { name: B, wcet_us: 10000, deadline_us: 30000 }
//! adjacency:
//!   - [0, 64]
//!   - [0, 0]
//! ```
//!
//! A nonzero adjacency cell `(i, j)` is the payload size in bytes of the
//! edge `i → j`.  When `hyperperiod_us` is absent it is derived as the LCM
//! of `period_us` and every entry of `co_scheduled_periods_us`, i.e. the
//! periods of the other DAGs running in the same study.
//!
//! Structural checks (cycles, granularity, affinity …) are **not** done
//! here; they belong to [`Dag::from_descriptor`](crate::dag::Dag::from_descriptor).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::backend::BackendKind;
use crate::dag::math::common_hyperperiod;

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DagFile {
    name: String,
    period_us: u64,
    deadline_us: u64,
    hyperperiod_us: Option<u64>,
    #[serde(default)]
    co_scheduled_periods_us: Vec<u64>,
    #[serde(default = "default_activations")]
    activations: u32,
    tasks: Vec<TaskEntry>,
    adjacency: Vec<Vec<u32>>,
}

#[derive(Debug, Deserialize)]
struct TaskEntry {
    name: String,
    wcet_us: u64,
    deadline_us: u64,
    #[serde(default)]
    affinity: Option<usize>,
}

fn default_activations() -> u32 {
    1
}

// ── Public descriptor ─────────────────────────────────────────────────────────

/// Per-task fields of a descriptor.  All times in microseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub name: String,
    pub wcet_us: u64,
    pub deadline_us: u64,
    /// Core the task is pinned to; `None` lets the kernel decide.
    pub affinity: Option<usize>,
}

/// Everything the core consumes from a DAG description.
///
/// Can be built directly (tests, other front-ends) or loaded from YAML with
/// [`DagDescriptor::load_from_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagDescriptor {
    pub name: String,
    pub period_us: u64,
    /// End-to-end (originator → sink) deadline.
    pub deadline_us: u64,
    pub hyperperiod_us: u64,
    /// How many times the whole hyperperiod is replayed.
    pub activations: u32,
    pub tasks: Vec<TaskDescriptor>,
    /// `adjacency[i][j] != 0` ⇔ edge `i → j` carrying that many bytes.
    pub adjacency: Vec<Vec<u32>>,
}

impl DagDescriptor {
    /// Parses a YAML descriptor from `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is invalid, or
    /// the hyperperiod cannot be derived.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading DAG descriptor from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open DAG descriptor: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse DAG descriptor: {}", path.display()))
    }

    /// Parses a YAML descriptor held in memory.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: DagFile = serde_yaml::from_str(content).context("invalid YAML")?;

        let hyperperiod_us = match file.hyperperiod_us {
            Some(h) => h,
            None => {
                let mut periods = vec![file.period_us];
                periods.extend(file.co_scheduled_periods_us.iter().copied());
                let h = common_hyperperiod(&periods).context("cannot derive the hyperperiod")?;
                debug!(
                    hyperperiod_us = h,
                    co_scheduled = file.co_scheduled_periods_us.len(),
                    "derived hyperperiod"
                );
                h
            }
        };

        let tasks = file
            .tasks
            .into_iter()
            .map(|t| TaskDescriptor {
                name: t.name,
                wcet_us: t.wcet_us,
                deadline_us: t.deadline_us,
                affinity: t.affinity,
            })
            .collect();

        Ok(Self {
            name: file.name,
            period_us: file.period_us,
            deadline_us: file.deadline_us,
            hyperperiod_us,
            activations: file.activations,
            tasks,
            adjacency: file.adjacency,
        })
    }

    /// Number of tasks declared.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

// ── Run settings ──────────────────────────────────────────────────────────────

/// Default fraction of the WCET actually burnt by the busy-wait step.
pub const DEFAULT_EXPECTED_WCET_RATIO: f64 = 0.95;

/// Seed reported at start-up so two runs can be matched in the logs.
pub const DEFAULT_SEED: u64 = 123_456;

/// How a run is executed.  Filled from the command line by the binary.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub backend: BackendKind,
    /// Fraction of each task's WCET emulated by the busy-wait, in `(0, 1]`.
    pub expected_wcet_ratio: f64,
    /// Scan input payloads during the processing step.
    pub mem_access: bool,
    /// Bind `SCHED_DEADLINE` contracts and pin affinities.  Disabled for
    /// unprivileged dry runs and tests.
    pub realtime: bool,
    /// Logs go to `<output_root>/<dag_name>/`.
    pub output_root: PathBuf,
    pub seed: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Threads,
            expected_wcet_ratio: DEFAULT_EXPECTED_WCET_RATIO,
            mem_access: false,
            realtime: true,
            output_root: PathBuf::from("."),
            seed: DEFAULT_SEED,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn load_chain_descriptor() {
        let yaml = r#"
name: chain
period_us: 100000
deadline_us: 90000
hyperperiod_us: 200000
tasks:
  - { name: A, wcet_us: 10000, deadline_us: 30000, affinity: 1 }
  - { name: B, wcet_us: 10000, deadline_us: 30000 }
  - { name: C, wcet_us: 10000, deadline_us: 30000 }
adjacency:
  - [0, 64, 0]
  - [0, 0, 32]
  - [0, 0, 0]
"#;
        let f = yaml_tempfile(yaml);
        let desc = DagDescriptor::load_from_file(f.path()).unwrap();

        assert_eq!(desc.name, "chain");
        assert_eq!(desc.period_us, 100_000);
        assert_eq!(desc.deadline_us, 90_000);
        assert_eq!(desc.hyperperiod_us, 200_000);
        assert_eq!(desc.activations, 1);
        assert_eq!(desc.task_count(), 3);
        assert_eq!(desc.tasks[0].affinity, Some(1));
        assert_eq!(desc.tasks[1].affinity, None);
        assert_eq!(desc.adjacency[0][1], 64);
        assert_eq!(desc.adjacency[1][2], 32);
    }

    #[test]
    fn missing_hyperperiod_is_lcm_of_co_scheduled_periods() {
        let yaml = r#"
name: d
period_us: 3000
deadline_us: 3000
co_scheduled_periods_us: [8000]
activations: 2
tasks:
  - { name: A, wcet_us: 100, deadline_us: 3000 }
adjacency:
  - [0]
"#;
        let desc = DagDescriptor::from_yaml_str(yaml).unwrap();
        assert_eq!(desc.hyperperiod_us, 24_000);
        assert_eq!(desc.activations, 2);
    }

    #[test]
    fn missing_hyperperiod_without_co_scheduling_equals_period() {
        let yaml = r#"
name: d
period_us: 5000
deadline_us: 5000
tasks:
  - { name: A, wcet_us: 100, deadline_us: 5000 }
adjacency: [[0]]
"#;
        let desc = DagDescriptor::from_yaml_str(yaml).unwrap();
        assert_eq!(desc.hyperperiod_us, 5_000);
    }

    #[test]
    fn missing_file_returns_error() {
        let result = DagDescriptor::load_from_file(Path::new("/nonexistent/dag.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(DagDescriptor::load_from_file(f.path()).is_err());
    }

    #[test]
    fn missing_required_field_returns_error() {
        let yaml = "name: d\nperiod_us: 10\ntasks: []\nadjacency: []\n";
        assert!(DagDescriptor::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn default_settings() {
        let s = RunSettings::default();
        assert_eq!(s.backend, BackendKind::Threads);
        assert!((s.expected_wcet_ratio - 0.95).abs() < 1e-12);
        assert!(s.realtime);
        assert!(!s.mem_access);
        assert_eq!(s.seed, 123_456);
    }
}
