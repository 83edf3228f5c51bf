/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Top-level run: descriptor → validated model → shared region → backend →
//! joined outcomes.
//!
//! Every configuration error is raised before the first execution unit
//! exists.  Output directories exist before any worker starts.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{graph, run_workers, BackendKind, ProcessSpawner, ThreadSpawner, UnitRegistry};
use crate::config::{DagDescriptor, RunSettings};
use crate::dag::Dag;
use crate::error::{OrchestratorError, RunError};
use crate::executor::{ExecSettings, RunContext, TaskOutcome};
use crate::recorder::ResponseRecorder;
use crate::region::SharedRegion;
use crate::rt::{binder, Calibration, DeadlineBinder, NoopBinder, SchedBinder};

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub dag: String,
    pub backend: BackendKind,
    pub iterations: u32,
    /// One entry per task for in-process backends; empty for the process
    /// backend, whose workers persist their own logs.
    pub outcomes: Vec<TaskOutcome>,
}

impl RunSummary {
    pub fn outcome(&self, task: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task == task)
    }
}

pub struct Orchestrator {
    settings: RunSettings,
    calibration: Arc<dyn Calibration>,
    binder: Arc<dyn SchedBinder>,
    registry: UnitRegistry,
}

impl Orchestrator {
    /// Binds real deadline contracts when `settings.realtime` is set,
    /// nothing otherwise.
    pub fn new(settings: RunSettings, calibration: Arc<dyn Calibration>) -> Self {
        let binder: Arc<dyn SchedBinder> = if settings.realtime {
            Arc::new(DeadlineBinder)
        } else {
            Arc::new(NoopBinder)
        };
        Self {
            settings,
            calibration,
            binder,
            registry: UnitRegistry::new(),
        }
    }

    pub fn with_binder(mut self, binder: Arc<dyn SchedBinder>) -> Self {
        self.binder = binder;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Registry of live units; clone it for a supervisor.
    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    pub fn run(&self, desc: &DagDescriptor) -> Result<RunSummary, OrchestratorError> {
        let ratio = self.settings.expected_wcet_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(RunError::ExpectedRatio(ratio).into());
        }

        let cores = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        let dag = Dag::from_descriptor(desc, cores)?;
        debug!("\n{dag}");

        let ticks_per_us = self.calibration.ticks_per_us()?;

        if self.settings.realtime {
            binder::disable_rt_throttling()?;
        }

        let recorder = ResponseRecorder::new(&self.settings.output_root, &dag.name);
        recorder.prepare()?;

        let region = SharedRegion::allocate(&dag)?;
        let iterations = dag.iterations();

        info!(
            dag = %dag.name,
            backend = %self.settings.backend,
            tasks = dag.tasks().len(),
            iterations,
            ticks_per_us,
            ratio,
            seed = self.settings.seed,
            output = %recorder.dir().display(),
            "starting run"
        );

        let ctx = RunContext {
            dag: Arc::new(dag),
            region: Arc::new(region),
            settings: ExecSettings {
                expected_wcet_ratio: ratio,
                ticks_per_us,
                mem_access: self.settings.mem_access,
            },
            binder: self.binder.clone(),
            recorder,
        };

        let outcomes = match self.settings.backend {
            BackendKind::Threads => run_workers(&ThreadSpawner, &ctx, &self.registry)?,
            BackendKind::Processes => run_workers(&ProcessSpawner, &ctx, &self.registry)?,
            BackendKind::Graph => graph::run_graph(&ctx)?,
        };

        info!(dag = %ctx.dag.name, units = outcomes.len(), "run complete");
        Ok(RunSummary {
            dag: ctx.dag.name.clone(),
            backend: self.settings.backend,
            iterations,
            outcomes,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::tests::descriptor;
    use crate::error::DagError;
    use crate::rt::FixedCalibration;
    use tempfile::TempDir;

    fn settings(root: &TempDir) -> RunSettings {
        RunSettings {
            realtime: false,
            output_root: root.path().to_path_buf(),
            ..RunSettings::default()
        }
    }

    #[test]
    fn invalid_dag_fails_before_creating_output() {
        let root = TempDir::new().unwrap();
        let orch = Orchestrator::new(settings(&root), Arc::new(FixedCalibration(1)));
        let desc = descriptor("tiny", &[1], vec![vec![0]]);

        let err = orch.run(&desc).unwrap_err();
        assert!(matches!(err, OrchestratorError::Dag(DagError::WcetBelowGranularity { .. })));
        assert!(!root.path().join("tiny").exists());
        assert!(orch.registry().is_empty());
    }

    #[test]
    fn ratio_out_of_range_is_rejected() {
        let root = TempDir::new().unwrap();
        let mut s = settings(&root);
        s.expected_wcet_ratio = 1.5;
        let orch = Orchestrator::new(s, Arc::new(FixedCalibration(1)));
        let desc = descriptor("d", &[100], vec![vec![0]]);
        assert!(matches!(
            orch.run(&desc),
            Err(OrchestratorError::Run(RunError::ExpectedRatio(_)))
        ));
    }

    #[test]
    fn missing_calibration_is_a_startup_error() {
        let root = TempDir::new().unwrap();
        let orch = Orchestrator::new(settings(&root), Arc::new(FixedCalibration(0)));
        let desc = descriptor("d", &[100], vec![vec![0]]);
        assert!(matches!(
            orch.run(&desc),
            Err(OrchestratorError::Run(RunError::Calibration(_)))
        ));
        assert!(!root.path().join("d").exists());
    }
}
