/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for rtdag.
//!
//! Two error enums model the two failure layers:
//!
//! * [`DagError`]: the DAG descriptor is malformed.  Always raised while the
//!   model is built, before any worker is spawned, and always names the
//!   offending task or edge.
//! * [`RunError`]: privilege, resource or worker failures once the run has
//!   started (binding the deadline contract, mapping shared memory, forking,
//!   persisting logs).
//!
//! Runtime deadline violations are **not** errors: they are logged and
//! persisted, and the run continues.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

// ── Configuration errors ──────────────────────────────────────────────────────

/// Why a DAG descriptor was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    #[error("DAG '{dag}' has no tasks")]
    NoTasks { dag: String },

    #[error("adjacency matrix row {row} has {len} entries, expected {expected}")]
    AdjacencyShape { row: usize, len: usize, expected: usize },

    #[error("adjacency matrix has {rows} rows but the DAG has {tasks} tasks")]
    AdjacencyRows { rows: usize, tasks: usize },

    #[error("task #{index} has an empty name")]
    EmptyTaskName { index: usize },

    #[error("task name '{task}' is used more than once")]
    DuplicateTaskName { task: String },

    /// The task log would collide with the DAG log.
    #[error("task '{task}' has the same name as its DAG")]
    TaskNamedAfterDag { task: String },

    #[error("DAG period must be greater than zero")]
    ZeroPeriod,

    #[error("DAG end-to-end deadline must be greater than zero")]
    ZeroDeadline,

    #[error("activations must be at least 1")]
    ZeroActivations,

    #[error("hyperperiod {hyperperiod_us}µs is not a positive integer multiple of the period {period_us}µs")]
    HyperperiodNotMultiple { hyperperiod_us: u64, period_us: u64 },

    #[error("hyperperiod overflow computing lcm({a}, {b})")]
    HyperperiodOverflow { a: u64, b: u64 },

    /// `SCHED_DEADLINE` refuses runtimes shorter than 1024 ns.
    #[error("task '{task}': WCET {wcet_us}µs is below the deadline scheduler granularity of {min_ns}ns")]
    WcetBelowGranularity { task: String, wcet_us: u64, min_ns: u64 },

    #[error("task '{task}': relative deadline {deadline_us}µs is shorter than its WCET {wcet_us}µs")]
    DeadlineShorterThanWcet { task: String, deadline_us: u64, wcet_us: u64 },

    #[error("task '{task}': affinity core {core} does not exist ({available} core(s) available)")]
    AffinityOutOfRange { task: String, core: usize, available: usize },

    #[error("task '{task}' has {count} input edges, at most {max} are supported")]
    TooManyInputs { task: String, count: usize, max: usize },

    #[error("edge {from} -> {to} closes a cycle")]
    Cycle { from: String, to: String },

    #[error("DAG '{dag}' has no originator (task without input edges)")]
    NoOriginator { dag: String },

    #[error("DAG '{dag}' has no sink (task without output edges)")]
    NoSink { dag: String },

    #[error("task '{task}' is not reachable from any originator")]
    Unreachable { task: String },
}

// ── Run-time errors ───────────────────────────────────────────────────────────

/// Fatal failures once the DAG model is valid.
///
/// Every variant terminates the run; no partial state is persisted by the
/// orchestrator after one of these is returned.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("busy-wait calibration unavailable: {0}")]
    Calibration(String),

    #[error("expected WCET ratio {0} is outside (0, 1]")]
    ExpectedRatio(f64),

    #[error("{operation} failed: {source} ({hint})")]
    Privilege {
        operation: &'static str,
        hint: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("deadline contract runtime {runtime_ns}ns is below the scheduler granularity")]
    ContractBelowGranularity { runtime_ns: u64 },

    #[error("SCHED_DEADLINE contract (runtime {runtime_ns}ns, deadline {deadline_ns}ns, period {period_ns}ns) rejected: {source}")]
    ContractRejected {
        runtime_ns: u64,
        deadline_ns: u64,
        period_ns: u64,
        #[source]
        source: io::Error,
    },

    #[error("could not pin task '{task}' to core {core}: {source}")]
    Affinity {
        task: String,
        core: usize,
        #[source]
        source: io::Error,
    },

    #[error("could not map the shared region ({bytes} bytes): {source}")]
    SharedMemory {
        bytes: usize,
        #[source]
        source: io::Error,
    },

    #[error("could not spawn worker for task '{task}': {source}")]
    Spawn {
        task: String,
        #[source]
        source: io::Error,
    },

    #[error("task '{task}' stopped: another worker failed during startup")]
    StartupAborted { task: String },

    #[error("worker for task '{task}' panicked")]
    WorkerPanicked { task: String },

    #[error("worker for task '{task}' exited abnormally (wait status {status})")]
    WorkerFailed { task: String, status: i32 },

    #[error("could not start the task-parallel runtime: {0}")]
    Runtime(String),

    #[error("could not write response log {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Unsupported(&'static str),
}

// ── Orchestrator errors ───────────────────────────────────────────────────────

/// Anything that stops [`Orchestrator::run`](crate::orchestrator::Orchestrator::run).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid DAG: {0}")]
    Dag(#[from] DagError),

    #[error(transparent)]
    Run(#[from] RunError),
}
