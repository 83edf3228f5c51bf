/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Full runs on the in-process backends (threads, graph).

use std::io;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use rtdag::backend::BackendKind;
use rtdag::config::{DagDescriptor, RunSettings};
use rtdag::error::{OrchestratorError, RunError};
use rtdag::orchestrator::{Orchestrator, RunSummary};
use rtdag::recorder::load_series;
use rtdag::rt::{Calibration, DeadlineContract, FixedCalibration, MeasuredCalibration, SchedBinder};

// ── Helpers ───────────────────────────────────────────────────────────────────

const CHAIN: &str = r#"
name: chain
period_us: 20000
deadline_us: 15000
hyperperiod_us: 60000
tasks:
  - { name: A, wcet_us: 2000, deadline_us: 10000 }
  - { name: B, wcet_us: 2000, deadline_us: 10000 }
  - { name: C, wcet_us: 2000, deadline_us: 10000 }
adjacency:
  - [0, 64, 0]
  - [0, 0, 32]
  - [0, 0, 0]
"#;

const DIAMOND: &str = r#"
name: diamond
period_us: 10000
deadline_us: 10000
hyperperiod_us: 40000
tasks:
  - { name: S, wcet_us: 100, deadline_us: 5000 }
  - { name: L, wcet_us: 100, deadline_us: 5000 }
  - { name: R, wcet_us: 100, deadline_us: 5000 }
  - { name: J, wcet_us: 100, deadline_us: 5000 }
adjacency:
  - [0, 40, 40, 0]
  - [0, 0, 0, 48]
  - [0, 0, 0, 48]
  - [0, 0, 0, 0]
"#;

fn run(yaml: &str, backend: BackendKind, root: &TempDir, calibration: Arc<dyn Calibration>) -> RunSummary {
    let desc = DagDescriptor::from_yaml_str(yaml).unwrap();
    let settings = RunSettings {
        backend,
        realtime: false,
        output_root: root.path().to_path_buf(),
        ..RunSettings::default()
    };
    Orchestrator::new(settings, calibration).run(&desc).unwrap()
}

fn fast() -> Arc<dyn Calibration> {
    Arc::new(FixedCalibration(1))
}

fn measured() -> Arc<dyn Calibration> {
    let rate = MeasuredCalibration {
        window: Duration::from_millis(30),
    }
    .ticks_per_us()
    .unwrap();
    Arc::new(FixedCalibration(rate))
}

// ── Three-task chain ──────────────────────────────────────────────────────────

fn check_chain(backend: BackendKind) {
    let root = TempDir::new().unwrap();
    let summary = run(CHAIN, backend, &root, measured());

    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.outcomes.len(), 3);
    let a = summary.outcome("A").unwrap();
    let b = summary.outcome("B").unwrap();
    let c = summary.outcome("C").unwrap();
    for o in [a, b, c] {
        assert_eq!(o.durations.len(), 3, "{} durations", o.task);
    }
    assert!(a.e2e.is_empty());
    assert_eq!(c.e2e.len(), 3);

    // The sink's latency spans all three processing windows.
    for k in 0..3 {
        let sum = a.durations[k] + b.durations[k] + c.durations[k];
        assert!(c.e2e[k] >= sum, "iter {k}: e2e {:?} < sum {:?}", c.e2e[k], sum);
    }

    assert_eq!(
        b.received,
        vec![
            "Message from A, iter: 0",
            "Message from A, iter: 1",
            "Message from A, iter: 2"
        ]
    );
    assert_eq!(c.received[2], "Message from B, iter: 2");

    let dir = root.path().join("chain");
    let (header, samples) = load_series(&dir.join("A.log")).unwrap();
    assert_eq!(header, 10_000);
    assert_eq!(samples.len(), 3);
    let (header, samples) = load_series(&dir.join("chain.log")).unwrap();
    assert_eq!(header, 15_000);
    assert_eq!(samples.len(), 3);
    for (k, s) in samples.iter().enumerate() {
        assert_eq!(*s, c.e2e[k].as_micros() as u64);
    }
}

#[test]
fn chain_on_threads() {
    check_chain(BackendKind::Threads);
}

#[test]
fn chain_on_graph() {
    check_chain(BackendKind::Graph);
}

// ── Diamond gating ────────────────────────────────────────────────────────────

fn diamond_markers(backend: BackendKind) -> Vec<Vec<String>> {
    let root = TempDir::new().unwrap();
    let summary = run(DIAMOND, backend, &root, fast());
    ["S", "L", "R", "J"]
        .iter()
        .map(|t| summary.outcome(t).unwrap().received.clone())
        .collect()
}

#[test]
fn diamond_join_sees_both_branches_of_the_same_iteration() {
    for backend in [BackendKind::Threads, BackendKind::Graph] {
        let markers = diamond_markers(backend);
        let join = &markers[3];
        assert_eq!(join.len(), 8, "{backend}");
        for k in 0..4 {
            assert_eq!(join[2 * k], format!("Message from L, iter: {k}"), "{backend}");
            assert_eq!(join[2 * k + 1], format!("Message from R, iter: {k}"), "{backend}");
        }
        assert!(markers[0].is_empty());
    }
}

#[test]
fn backends_deliver_identical_marker_sequences() {
    assert_eq!(
        diamond_markers(BackendKind::Threads),
        diamond_markers(BackendKind::Graph)
    );
}

// ── Logs ──────────────────────────────────────────────────────────────────────

#[test]
fn dag_header_is_written_once_across_runs() {
    let root = TempDir::new().unwrap();
    run(DIAMOND, BackendKind::Threads, &root, fast());
    run(DIAMOND, BackendKind::Graph, &root, fast());

    let dir = root.path().join("diamond");
    let content = std::fs::read_to_string(dir.join("diamond.log")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1 + 2 * 4);
    assert_eq!(lines[0], "10000");

    let (header, samples) = load_series(&dir.join("L.log")).unwrap();
    assert_eq!(header, 5_000);
    assert_eq!(samples.len(), 8);
}

#[test]
fn only_the_primary_sink_writes_the_dag_log() {
    let yaml = r#"
name: forked
period_us: 10000
deadline_us: 10000
hyperperiod_us: 20000
tasks:
  - { name: S, wcet_us: 100, deadline_us: 5000 }
  - { name: X, wcet_us: 100, deadline_us: 5000 }
  - { name: Y, wcet_us: 100, deadline_us: 5000 }
adjacency:
  - [0, 8, 8]
  - [0, 0, 0]
  - [0, 0, 0]
"#;
    for backend in [BackendKind::Threads, BackendKind::Graph] {
        let root = TempDir::new().unwrap();
        let summary = run(yaml, backend, &root, fast());
        assert_eq!(summary.outcome("X").unwrap().e2e.len(), 2);
        let y = summary.outcome("Y").unwrap();
        assert_eq!(y.e2e.len(), 2);

        let (_, samples) = load_series(&root.path().join("forked/forked.log")).unwrap();
        let expected: Vec<u64> = y.e2e.iter().map(|d| d.as_micros() as u64).collect();
        assert_eq!(samples, expected, "{backend}");
    }
}

#[test]
fn two_originators_feed_one_sink() {
    let yaml = r#"
name: merge
period_us: 10000
deadline_us: 10000
hyperperiod_us: 30000
tasks:
  - { name: P, wcet_us: 100, deadline_us: 5000 }
  - { name: Q, wcet_us: 100, deadline_us: 5000 }
  - { name: Z, wcet_us: 100, deadline_us: 5000 }
adjacency:
  - [0, 0, 32]
  - [0, 0, 32]
  - [0, 0, 0]
"#;
    for backend in [BackendKind::Threads, BackendKind::Graph] {
        let root = TempDir::new().unwrap();
        let summary = run(yaml, backend, &root, fast());
        let z = summary.outcome("Z").unwrap();
        assert_eq!(z.e2e.len(), 3, "{backend}");
        assert_eq!(z.received.len(), 6, "{backend}");
        assert_eq!(z.received[4], "Message from P, iter: 2");
        assert_eq!(z.received[5], "Message from Q, iter: 2");
    }
}

// ── Overruns ──────────────────────────────────────────────────────────────────

#[test]
fn missed_dag_deadline_is_recorded_and_the_run_completes() {
    let yaml = r#"
name: late
period_us: 20000
deadline_us: 1000
hyperperiod_us: 60000
tasks:
  - { name: A, wcet_us: 2000, deadline_us: 10000 }
  - { name: B, wcet_us: 2000, deadline_us: 10000 }
  - { name: C, wcet_us: 2000, deadline_us: 10000 }
adjacency:
  - [0, 32, 0]
  - [0, 0, 32]
  - [0, 0, 0]
"#;
    let calibration = measured();
    for backend in [BackendKind::Threads, BackendKind::Graph] {
        let root = TempDir::new().unwrap();
        let summary = run(yaml, backend, &root, calibration.clone());
        assert_eq!(summary.outcome("C").unwrap().e2e.len(), 3, "{backend}");

        let (header, samples) = load_series(&root.path().join("late/late.log")).unwrap();
        assert_eq!(header, 1_000);
        assert_eq!(samples.len(), 3, "{backend}");
        assert!(samples.iter().all(|&s| s > header), "{backend}: {samples:?}");
    }
}

#[test]
fn consumer_slower_than_the_period_still_sees_every_iteration() {
    let yaml = r#"
name: lagging
period_us: 10000
deadline_us: 10000
hyperperiod_us: 40000
tasks:
  - { name: A, wcet_us: 100, deadline_us: 5000 }
  - { name: B, wcet_us: 25000, deadline_us: 30000 }
adjacency:
  - [0, 32]
  - [0, 0]
"#;
    let calibration = measured();
    let root = TempDir::new().unwrap();
    let out = root.path().to_path_buf();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let desc = DagDescriptor::from_yaml_str(yaml).unwrap();
        let settings = RunSettings {
            backend: BackendKind::Threads,
            realtime: false,
            output_root: out,
            ..RunSettings::default()
        };
        let _ = tx.send(Orchestrator::new(settings, calibration).run(&desc));
    });

    let summary = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("run did not finish")
        .unwrap();
    let b = summary.outcome("B").unwrap();
    let expected: Vec<String> = (0..4).map(|k| format!("Message from A, iter: {k}")).collect();
    assert_eq!(b.received, expected);
    assert_eq!(b.e2e.len(), 4);
    for (e2e, took) in b.e2e.iter().zip(&b.durations) {
        assert!(e2e >= took);
    }

    let (_, samples) = load_series(&root.path().join("lagging/lagging.log")).unwrap();
    assert_eq!(samples.len(), 4);
}

// ── Startup failure ───────────────────────────────────────────────────────────

/// Refuses the contract whose runtime equals `refused`.
#[derive(Debug)]
struct RefusingBinder {
    refused: Duration,
}

impl SchedBinder for RefusingBinder {
    fn bind(&self, contract: &DeadlineContract) -> Result<(), RunError> {
        if contract.runtime == self.refused {
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
fn bind_failure_aborts_every_worker_and_reports_the_cause() {
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
    let settings = RunSettings {
        realtime: false,
        output_root: root.path().to_path_buf(),
        ..RunSettings::default()
    };
    let orchestrator = Orchestrator::new(settings, fast()).with_binder(Arc::new(RefusingBinder {
        refused: Duration::from_micros(222),
    }));

    let err = orchestrator.run(&desc).unwrap_err();
    assert!(
        matches!(err, OrchestratorError::Run(RunError::Privilege { .. })),
        "unexpected error: {err}"
    );
    assert!(orchestrator.registry().is_empty());
    assert!(!root.path().join("refused/A.log").exists());
}
