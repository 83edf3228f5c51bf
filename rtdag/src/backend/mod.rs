/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Concurrency backends.
//!
//! * [`worker`]: one explicit execution unit per task, either a thread or
//!   a forked process, chosen through the [`Spawner`] trait.
//! * [`graph`]: a `rayon` pool released per iteration by
//!   pending-predecessor counters.

pub mod graph;
pub mod registry;
pub mod worker;

use std::fmt;

use crate::error::RunError;
use crate::executor::TaskOutcome;

pub use registry::{RegisteredUnit, UnitId, UnitRegistry};
pub use worker::{run_workers, ProcessSpawner, ThreadSpawner};

/// Backend selected at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum BackendKind {
    /// One OS thread per task.
    Threads,
    /// One forked process per task.
    Processes,
    /// Task-parallel pool driven by the dependency graph.
    Graph,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Threads => "threads",
            BackendKind::Processes => "processes",
            BackendKind::Graph => "graph",
        })
    }
}

/// A task body handed to a [`Spawner`].
pub struct WorkUnit {
    pub name: String,
    pub body: Box<dyn FnOnce() -> Result<TaskOutcome, RunError> + Send + 'static>,
}

/// Creates and reaps explicit execution units.
pub trait Spawner {
    type Handle;

    fn spawn(&self, unit: WorkUnit) -> Result<Self::Handle, RunError>;

    /// OS-level id recorded in the [`UnitRegistry`].
    fn unit_id(&self, handle: &Self::Handle) -> UnitId;

    /// Waits for the unit.  `None` when the outcome stayed in another
    /// address space (the unit persisted its own logs).
    fn join(&self, handle: Self::Handle) -> Result<Option<TaskOutcome>, RunError>;

    fn terminate(&self, handle: &Self::Handle) -> Result<(), RunError>;
}
