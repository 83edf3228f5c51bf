/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Process backend.  Kept in its own test binary, with its tests
//! serialised, so that no other test thread is running while workers are
//! forked.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use rtdag::backend::BackendKind;
use rtdag::config::{DagDescriptor, RunSettings};
use rtdag::error::{OrchestratorError, RunError};
use rtdag::orchestrator::Orchestrator;
use rtdag::recorder::load_series;
use rtdag::rt::{DeadlineContract, FixedCalibration, SchedBinder};

static FORK_LOCK: Mutex<()> = Mutex::new(());

fn settings(root: &TempDir) -> RunSettings {
    RunSettings {
        backend: BackendKind::Processes,
        realtime: false,
        output_root: root.path().to_path_buf(),
        ..RunSettings::default()
    }
}

#[test]
fn forked_workers_persist_their_own_logs() {
    let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let yaml = r#"
name: procs
period_us: 10000
deadline_us: 10000
hyperperiod_us: 30000
activations: 2
tasks:
  - { name: A, wcet_us: 100, deadline_us: 5000 }
  - { name: B, wcet_us: 100, deadline_us: 5000 }
  - { name: C, wcet_us: 100, deadline_us: 5000 }
  - { name: D, wcet_us: 100, deadline_us: 5000 }
adjacency:
  - [0, 32, 32, 0]
  - [0, 0, 0, 24]
  - [0, 0, 0, 24]
  - [0, 0, 0, 0]
"#;
    let root = TempDir::new().unwrap();
    let desc = DagDescriptor::from_yaml_str(yaml).unwrap();
    let orchestrator = Orchestrator::new(settings(&root), Arc::new(FixedCalibration(1)));
    let summary = orchestrator.run(&desc).unwrap();

    assert_eq!(summary.iterations, 6);
    assert!(summary.outcomes.is_empty());
    assert!(orchestrator.registry().is_empty());

    let dir = root.path().join("procs");
    for task in ["A", "B", "C", "D"] {
        let (header, samples) = load_series(&dir.join(format!("{task}.log"))).unwrap();
        assert_eq!(header, 5_000, "{task}");
        assert_eq!(samples.len(), 6, "{task}");
    }
    let (header, samples) = load_series(&dir.join("procs.log")).unwrap();
    assert_eq!(header, 10_000);
    assert_eq!(samples.len(), 6);
}

/// Refuses every contract with a runtime of exactly 222 µs.
#[derive(Debug)]
struct RefusingBinder;

impl SchedBinder for RefusingBinder {
    fn bind(&self, contract: &DeadlineContract) -> Result<(), RunError> {
        if contract.runtime == Duration::from_micros(222) {
            return Err(RunError::Privilege {
                operation: "sched_setattr(SCHED_DEADLINE)",
                hint: "test",
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }
        Ok(())
    }

    fn pin(&self, _task: &str, _core: usize) -> Result<(), RunError> {
        Ok(())
    }
}

#[test]
fn failing_child_is_reported_over_its_aborted_peers() {
    let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let yaml = r#"
name: refused
period_us: 10000
deadline_us: 10000
hyperperiod_us: 10000
tasks:
  - { name: A, wcet_us: 100, deadline_us: 5000 }
  - { name: B, wcet_us: 222, deadline_us: 5000 }
  - { name: C, wcet_us: 100, deadline_us: 5000 }
adjacency:
  - [0, 8, 0]
  - [0, 0, 8]
  - [0, 0, 0]
"#;
    let root = TempDir::new().unwrap();
    let desc = DagDescriptor::from_yaml_str(yaml).unwrap();
    let orchestrator =
        Orchestrator::new(settings(&root), Arc::new(FixedCalibration(1))).with_binder(Arc::new(RefusingBinder));

    let err = orchestrator.run(&desc).unwrap_err();
    assert!(
        matches!(&err, OrchestratorError::Run(RunError::WorkerFailed { task, .. }) if task == "B"),
        "unexpected error: {err}"
    );
    assert!(orchestrator.registry().is_empty());
}
