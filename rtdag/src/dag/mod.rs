/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! DAG model: tasks and edges built once from a [`DagDescriptor`].
//!
//! ```text
//! DagDescriptor ──(from_descriptor: validate)──►  Dag  ──(Arc, read-only)──►  TaskExecutor × n
//!  µs integers,                                     Duration timings,
//!  adjacency matrix                                 typed edges + slots
//! ```
//!
//! # Ownership model
//! The `Dag` is immutable once built and shared behind an `Arc` by every
//! executor.  The only per-run mutable state (iteration durations, the
//! end-to-end response-time sequence) lives in the executors themselves;
//! the sink's executor is the single writer of the end-to-end sequence.
//!
//! # Edges and producer slots
//! Edges are created per destination, scanning sources in ascending id
//! order.  The position of an edge among its destination's in-edges is its
//! *producer slot* in the destination's channel.

pub mod math;

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::config::DagDescriptor;
use crate::error::DagError;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Smallest runtime `SCHED_DEADLINE` accepts, in nanoseconds.
pub const MIN_RUNTIME_NS: u64 = 1024;

/// Largest in-degree a task may have.  A channel tracks its producer slots
/// in one 64-bit mask.
pub const MAX_INPUTS: usize = 64;

pub type TaskId = usize;
pub type EdgeId = usize;

// ── Edge ──────────────────────────────────────────────────────────────────────

/// One DAG edge `src → dst`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub src: TaskId,
    pub dst: TaskId,
    /// Payload size in bytes, including the NUL terminator.
    pub payload_bytes: usize,
    /// Producer slot of this edge in `dst`'s channel.
    pub slot: usize,
}

impl Edge {
    /// Short label used in logs, e.g. `n0_n2`.
    pub fn label(&self) -> String {
        format!("n{}_n{}", self.src, self.dst)
    }
}

// ── Task ──────────────────────────────────────────────────────────────────────

/// A periodic task of the DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub wcet: Duration,
    /// Relative deadline; also the period of the task's deadline contract.
    pub deadline: Duration,
    pub affinity: Option<usize>,
    /// In-edges, ordered by producer slot.
    pub in_edges: Vec<EdgeId>,
    /// Out-edges, ordered by destination id.
    pub out_edges: Vec<EdgeId>,
}

impl Task {
    /// No input edges: drives the DAG period.
    pub fn is_originator(&self) -> bool {
        self.in_edges.is_empty()
    }

    /// No output edges: measures end-to-end latency.
    pub fn is_sink(&self) -> bool {
        self.out_edges.is_empty()
    }
}

// ── Dag ───────────────────────────────────────────────────────────────────────

/// Validated, read-only DAG.
#[derive(Debug, Clone)]
pub struct Dag {
    pub name: String,
    pub period: Duration,
    pub e2e_deadline: Duration,
    pub hyperperiod: Duration,
    /// `hyperperiod / period`, exact and ≥ 1.
    pub hyperperiod_iters: u32,
    /// Number of hyperperiod replays.
    pub activations: u32,
    tasks: Vec<Task>,
    edges: Vec<Edge>,
    originators: Vec<TaskId>,
    sinks: Vec<TaskId>,
    topo_order: Vec<TaskId>,
}

impl Dag {
    /// Builds and validates the model.
    ///
    /// `available_cores` bounds the affinity values; the orchestrator passes
    /// the host's parallelism.
    ///
    /// # Errors
    /// A [`DagError`] naming the offending task or edge.  Nothing is spawned
    /// or allocated outside this function on error.
    pub fn from_descriptor(desc: &DagDescriptor, available_cores: usize) -> Result<Self, DagError> {
        let n = desc.tasks.len();
        if n == 0 {
            return Err(DagError::NoTasks {
                dag: desc.name.clone(),
            });
        }
        if desc.period_us == 0 {
            return Err(DagError::ZeroPeriod);
        }
        if desc.deadline_us == 0 {
            return Err(DagError::ZeroDeadline);
        }
        if desc.activations == 0 {
            return Err(DagError::ZeroActivations);
        }
        let hyperperiod_iters = math::hyperperiod_iters(desc.hyperperiod_us, desc.period_us)?;

        // ── Adjacency shape ───────────────────────────────────────────────────
        if desc.adjacency.len() != n {
            return Err(DagError::AdjacencyRows {
                rows: desc.adjacency.len(),
                tasks: n,
            });
        }
        for (row, cells) in desc.adjacency.iter().enumerate() {
            if cells.len() != n {
                return Err(DagError::AdjacencyShape {
                    row,
                    len: cells.len(),
                    expected: n,
                });
            }
        }

        // ── Tasks ─────────────────────────────────────────────────────────────
        let mut names = HashSet::with_capacity(n);
        let mut tasks = Vec::with_capacity(n);
        for (id, t) in desc.tasks.iter().enumerate() {
            if t.name.is_empty() {
                return Err(DagError::EmptyTaskName { index: id });
            }
            if !names.insert(t.name.as_str()) {
                return Err(DagError::DuplicateTaskName {
                    task: t.name.clone(),
                });
            }
            if t.name == desc.name {
                return Err(DagError::TaskNamedAfterDag {
                    task: t.name.clone(),
                });
            }
            if t.wcet_us.saturating_mul(1_000) < MIN_RUNTIME_NS {
                return Err(DagError::WcetBelowGranularity {
                    task: t.name.clone(),
                    wcet_us: t.wcet_us,
                    min_ns: MIN_RUNTIME_NS,
                });
            }
            if t.deadline_us < t.wcet_us {
                return Err(DagError::DeadlineShorterThanWcet {
                    task: t.name.clone(),
                    deadline_us: t.deadline_us,
                    wcet_us: t.wcet_us,
                });
            }
            if let Some(core) = t.affinity {
                if core >= available_cores {
                    return Err(DagError::AffinityOutOfRange {
                        task: t.name.clone(),
                        core,
                        available: available_cores,
                    });
                }
            }
            tasks.push(Task {
                id,
                name: t.name.clone(),
                wcet: Duration::from_micros(t.wcet_us),
                deadline: Duration::from_micros(t.deadline_us),
                affinity: t.affinity,
                in_edges: Vec::new(),
                out_edges: Vec::new(),
            });
        }

        // ── Edges (per destination, sources ascending) ────────────────────────
        let mut edges = Vec::new();
        for dst in 0..n {
            if desc.adjacency[dst][dst] != 0 {
                return Err(DagError::Cycle {
                    from: tasks[dst].name.clone(),
                    to: tasks[dst].name.clone(),
                });
            }
            let mut slot = 0;
            for src in 0..n {
                let bytes = desc.adjacency[src][dst];
                if bytes == 0 {
                    continue;
                }
                let id = edges.len();
                edges.push(Edge {
                    id,
                    src,
                    dst,
                    payload_bytes: bytes as usize,
                    slot,
                });
                tasks[dst].in_edges.push(id);
                tasks[src].out_edges.push(id);
                slot += 1;
            }
            if slot > MAX_INPUTS {
                return Err(DagError::TooManyInputs {
                    task: tasks[dst].name.clone(),
                    count: slot,
                    max: MAX_INPUTS,
                });
            }
        }
        // Out-edges were appended in destination order already.
        debug_assert!(tasks.iter().all(|t| t
            .out_edges
            .windows(2)
            .all(|w| edges[w[0]].dst < edges[w[1]].dst)));

        let topo_order = topological_order(&tasks, &edges)?;

        let originators: Vec<TaskId> = tasks
            .iter()
            .filter(|t| t.is_originator())
            .map(|t| t.id)
            .collect();
        let sinks: Vec<TaskId> = tasks.iter().filter(|t| t.is_sink()).map(|t| t.id).collect();
        if originators.is_empty() {
            return Err(DagError::NoOriginator {
                dag: desc.name.clone(),
            });
        }
        if sinks.is_empty() {
            return Err(DagError::NoSink {
                dag: desc.name.clone(),
            });
        }
        check_reachability(&tasks, &edges, &originators)?;

        debug!(
            dag = %desc.name,
            tasks = n,
            edges = edges.len(),
            originators = originators.len(),
            sinks = sinks.len(),
            hyperperiod_iters,
            "DAG model built"
        );

        Ok(Self {
            name: desc.name.clone(),
            period: Duration::from_micros(desc.period_us),
            e2e_deadline: Duration::from_micros(desc.deadline_us),
            hyperperiod: Duration::from_micros(desc.hyperperiod_us),
            hyperperiod_iters,
            activations: desc.activations,
            tasks,
            edges,
            originators,
            sinks,
            topo_order,
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id]
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    pub fn originators(&self) -> &[TaskId] {
        &self.originators
    }

    pub fn sinks(&self) -> &[TaskId] {
        &self.sinks
    }

    /// The sink that persists the DAG-level log.  With several sinks only
    /// the last one (highest id) writes it, so the file has one writer.
    pub fn primary_sink(&self) -> TaskId {
        // At least one sink is guaranteed by construction.
        self.sinks[self.sinks.len() - 1]
    }

    /// Tasks in a valid execution order (predecessors first).
    pub fn topological_order(&self) -> &[TaskId] {
        &self.topo_order
    }

    /// Total number of iterations each task runs.
    pub fn iterations(&self) -> u32 {
        self.hyperperiod_iters.saturating_mul(self.activations)
    }

    /// Successor task ids of `id`, in out-edge order.
    pub fn successors(&self, id: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks[id].out_edges.iter().map(|&e| self.edges[e].dst)
    }
}

impl fmt::Display for Dag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "DAG '{}': period {}us, deadline {}us, hyperperiod {}us ({} iteration(s) x {} activation(s))",
            self.name,
            self.period.as_micros(),
            self.e2e_deadline.as_micros(),
            self.hyperperiod.as_micros(),
            self.hyperperiod_iters,
            self.activations,
        )?;
        for t in &self.tasks {
            write!(
                f,
                "  {}, wcet: {}us, deadline: {}us, affinity: ",
                t.name,
                t.wcet.as_micros(),
                t.deadline.as_micros()
            )?;
            match t.affinity {
                Some(core) => writeln!(f, "{core}")?,
                None => writeln!(f, "any")?,
            }
            write!(f, "   ins:")?;
            for &e in &t.in_edges {
                let e = &self.edges[e];
                write!(f, " {}({})", e.label(), e.payload_bytes)?;
            }
            write!(f, "\n   outs:")?;
            for &e in &t.out_edges {
                let e = &self.edges[e];
                write!(f, " {}({},{})", e.label(), e.payload_bytes, e.slot)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ── Graph checks ──────────────────────────────────────────────────────────────

/// Kahn's algorithm.  Any task left unvisited sits on (or behind) a cycle;
/// the reported edge joins two unvisited tasks.
fn topological_order(tasks: &[Task], edges: &[Edge]) -> Result<Vec<TaskId>, DagError> {
    let mut pending: Vec<usize> = tasks.iter().map(|t| t.in_edges.len()).collect();
    let mut ready: VecDeque<TaskId> = tasks
        .iter()
        .filter(|t| t.is_originator())
        .map(|t| t.id)
        .collect();
    let mut order = Vec::with_capacity(tasks.len());

    while let Some(id) = ready.pop_front() {
        order.push(id);
        for &e in &tasks[id].out_edges {
            let dst = edges[e].dst;
            pending[dst] -= 1;
            if pending[dst] == 0 {
                ready.push_back(dst);
            }
        }
    }

    if order.len() == tasks.len() {
        return Ok(order);
    }

    let visited: HashSet<TaskId> = order.iter().copied().collect();
    let edge = edges
        .iter()
        .find(|e| !visited.contains(&e.src) && !visited.contains(&e.dst))
        .or_else(|| edges.iter().find(|e| !visited.contains(&e.dst)));
    let (from, to) = match edge {
        Some(e) => (tasks[e.src].name.clone(), tasks[e.dst].name.clone()),
        None => (String::new(), String::new()),
    };
    Err(DagError::Cycle { from, to })
}

/// Every task must be reachable from some originator.
fn check_reachability(tasks: &[Task], edges: &[Edge], originators: &[TaskId]) -> Result<(), DagError> {
    let mut seen = vec![false; tasks.len()];
    let mut queue: VecDeque<TaskId> = originators.iter().copied().collect();
    for &o in originators {
        seen[o] = true;
    }
    while let Some(id) = queue.pop_front() {
        for &e in &tasks[id].out_edges {
            let dst = edges[e].dst;
            if !seen[dst] {
                seen[dst] = true;
                queue.push_back(dst);
            }
        }
    }
    match seen.iter().position(|s| !s) {
        Some(id) => Err(DagError::Unreachable {
            task: tasks[id].name.clone(),
        }),
        None => Ok(()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
