/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Dependency-graph backend.
//!
//! The calling thread owns the period clock.  Each period it opens a
//! `rayon` scope and spawns the originators; a finished task decrements the
//! pending-predecessor counter of each successor and spawns the successor
//! whose counter reached zero.  Fan-in of any arity works the same way.
//!
//! Counters follow a release-fence / relaxed-decrement / acquire-fence
//! protocol, so a released task observes every payload its predecessors
//! wrote.  A task restores its own counter after it ran, which leaves all
//! counters armed for the next iteration once the scope closes.
//!
//! Pool workers are shared by every task, so no per-task deadline contract
//! or affinity is applied to them.

use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::dag::{Dag, TaskId};
use crate::error::RunError;
use crate::executor::{RunContext, TaskExecutor, TaskOutcome};
use crate::rt::{AbsTime, PeriodClock, SETTLE_DELAY};

struct GraphIteration<'a> {
    dag: &'a Dag,
    executors: &'a [Mutex<TaskExecutor>],
    pending: &'a [AtomicU32],
    failure: &'a Mutex<Option<RunError>>,
    iter: u32,
    start: AbsTime,
}

fn release<'s>(run: &'s GraphIteration<'s>, scope: &rayon::Scope<'s>, task: TaskId) {
    let result = run.executors[task]
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .run_released_iteration(run.iter, run.start);

    run.pending[task].store(run.dag.task(task).in_edges.len() as u32, Ordering::Relaxed);

    if let Err(e) = result {
        run.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(e);
        return;
    }

    fence(Ordering::Release);
    for succ in run.dag.successors(task) {
        if run.pending[succ].fetch_sub(1, Ordering::Relaxed) == 1 {
            fence(Ordering::Acquire);
            scope.spawn(move |s| release(run, s, succ));
        }
    }
}

/// Runs every iteration of the DAG on a `rayon` pool.
pub fn run_graph(ctx: &RunContext) -> Result<Vec<TaskOutcome>, RunError> {
    let dag = ctx.dag.as_ref();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(dag.tasks().len())
        .thread_name(|i| format!("rtdag-graph-{i}"))
        .build()
        .map_err(|e| RunError::Runtime(e.to_string()))?;

    let executors: Vec<Mutex<TaskExecutor>> = dag
        .tasks()
        .iter()
        .map(|t| Mutex::new(TaskExecutor::new(t.id, ctx.clone())))
        .collect();
    let pending: Vec<AtomicU32> = dag
        .tasks()
        .iter()
        .map(|t| AtomicU32::new(t.in_edges.len() as u32))
        .collect();
    let failure = Mutex::new(None);

    let mut clock = PeriodClock::start(dag.period);
    clock.align(SETTLE_DELAY);
    let iterations = dag.iterations();
    info!(dag = %dag.name, iterations, workers = pool.current_num_threads(), "graph run started");

    for iter in 0..iterations {
        let run = GraphIteration {
            dag,
            executors: &executors,
            pending: &pending,
            failure: &failure,
            iter,
            start: clock.current(),
        };
        pool.scope(|s| {
            let run = &run;
            for &origin in dag.originators() {
                s.spawn(move |s| release(run, s, origin));
            }
        });
        debug!(iter, "iteration complete");

        if failure.lock().unwrap_or_else(PoisonError::into_inner).is_some() {
            break;
        }
        if iter + 1 < iterations {
            clock.wait_next_period();
        }
    }

    if let Some(e) = failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(e);
    }
    executors
        .into_iter()
        .map(|m| m.into_inner().unwrap_or_else(PoisonError::into_inner).finalize())
        .collect()
}
