/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-task lifecycle.
//!
//! ```text
//! Init → BarrierWait → [AlignPeriod] ─┐
//!   ┌─────────────────────────────────┘
//!   └► IterationStart → AwaitInputs → Process → EmitOutputs → [RecordLatency] → [WaitNextPeriod] ─┐
//!   ┌──────────────────────────────────────────── next iteration ────────────────────────────────┘
//!   └► … → Finalize → Terminal
//! ```
//! `[AlignPeriod]` and `[WaitNextPeriod]` apply to originators only,
//! `[RecordLatency]` to sinks only.
//!
//! An explicit worker drives the whole machine with [`TaskExecutor::run`].
//! Under the dependency-graph backend the driver owns the clock and the
//! gating; it calls [`TaskExecutor::run_released_iteration`] once the
//! task's predecessors finished and [`TaskExecutor::finalize`] at the end.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::dag::{Dag, Task, TaskId};
use crate::error::RunError;
use crate::recorder::ResponseRecorder;
use crate::region::SharedRegion;
use crate::rt::{busy, AbsTime, DeadlineContract, PeriodClock, SchedBinder, SETTLE_DELAY};

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Init,
    BarrierWait,
    AlignPeriod,
    IterationStart,
    AwaitInputs,
    Process,
    EmitOutputs,
    RecordLatency,
    WaitNextPeriod,
    Finalize,
    Terminal,
}

/// How a task learns that its inputs are ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gating {
    /// Explicit workers: block on the channel, push successors' slots.
    Channels,
    /// Graph backend: the driver released the task; nothing to push.
    Released,
}

// ── Run context ───────────────────────────────────────────────────────────────

/// Per-run knobs every executor shares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecSettings {
    pub expected_wcet_ratio: f64,
    pub ticks_per_us: u64,
    pub mem_access: bool,
}

/// Everything an executor needs, cheap to clone into each worker.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub dag: Arc<Dag>,
    pub region: Arc<SharedRegion>,
    pub settings: ExecSettings,
    pub binder: Arc<dyn SchedBinder>,
    pub recorder: ResponseRecorder,
}

/// What a finished executor reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task: String,
    /// Per-iteration duration, `Process` start to the last payload write.
    /// Signalling successors is outside the window.
    pub durations: Vec<Duration>,
    /// End-to-end response times; empty unless the task is a sink.
    pub e2e: Vec<Duration>,
    /// Decoded input markers, slot order within each iteration.
    pub received: Vec<String>,
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Payload for an edge of `size` bytes: the marker text truncated or padded
/// with `.` to `size − 1` bytes, then a NUL.
pub fn compose_message(task: &str, iteration: u32, size: usize) -> Vec<u8> {
    let mut msg = format!("Message from {task}, iter: {iteration}").into_bytes();
    msg.resize(size.saturating_sub(1), b'.');
    msg.push(0);
    msg
}

/// Marker text of a payload: bytes before the NUL, padding removed.
pub fn decode_marker(payload: &[u8]) -> String {
    let body = payload.split(|&b| b == 0).next().unwrap_or_default();
    String::from_utf8_lossy(body).trim_end_matches('.').to_string()
}

// ── Executor ──────────────────────────────────────────────────────────────────

pub struct TaskExecutor {
    task: TaskId,
    ctx: RunContext,
    state: ExecState,
    spin_ticks: u64,
    checksum: u8,
    outcome: TaskOutcome,
}

impl TaskExecutor {
    pub fn new(task: TaskId, ctx: RunContext) -> Self {
        let t = ctx.dag.task(task);
        let spin_ticks = busy::spin_ticks(t.wcet, ctx.settings.expected_wcet_ratio, ctx.settings.ticks_per_us);
        let outcome = TaskOutcome {
            task: t.name.clone(),
            ..TaskOutcome::default()
        };
        Self {
            task,
            ctx,
            state: ExecState::Init,
            spin_ticks,
            checksum: 0,
            outcome,
        }
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    fn task(&self) -> &Task {
        self.ctx.dag.task(self.task)
    }

    fn transition(&mut self, next: ExecState) {
        trace!(task = %self.outcome.task, from = ?self.state, to = ?next, "state");
        self.state = next;
    }

    /// Full explicit-worker lifecycle.  Runs on the worker's own thread or
    /// process so that pinning and the deadline contract apply to it.
    pub fn run(mut self) -> Result<TaskOutcome, RunError> {
        let ctx = self.ctx.clone();
        let dag = &ctx.dag;
        let task = dag.task(self.task);

        if let Err(e) = Self::init(&ctx, task) {
            ctx.region.barrier().abandon();
            return Err(e);
        }

        self.transition(ExecState::BarrierWait);
        if ctx.region.barrier().wait().is_err() {
            return Err(RunError::StartupAborted {
                task: task.name.clone(),
            });
        }

        let mut clock = if task.is_originator() {
            self.transition(ExecState::AlignPeriod);
            let mut clock = PeriodClock::start(dag.period);
            clock.align(SETTLE_DELAY);
            Some(clock)
        } else {
            None
        };

        let iterations = dag.iterations();
        info!(task = %task.name, iterations, originator = task.is_originator(), sink = task.is_sink(), "worker started");

        for iter in 0..iterations {
            self.transition(ExecState::IterationStart);
            if let Some(clock) = &clock {
                ctx.region.marker(iter).publish(clock.current());
            }

            self.transition(ExecState::AwaitInputs);
            self.iteration_body(iter, Gating::Channels);

            if task.is_sink() {
                let start = ctx.region.marker(iter).wait(dag.originators().len());
                self.record_latency(iter, start);
            }

            if let Some(clock) = clock.as_mut() {
                if iter + 1 < iterations {
                    self.transition(ExecState::WaitNextPeriod);
                    clock.wait_next_period();
                }
            }
        }

        self.finalize()
    }

    /// Pins the calling thread and binds its deadline contract.
    fn init(ctx: &RunContext, task: &Task) -> Result<(), RunError> {
        if let Some(core) = task.affinity {
            ctx.binder.pin(&task.name, core)?;
        }
        ctx.binder.bind(&DeadlineContract::for_task(task))
    }

    /// One iteration under the graph backend.  Every predecessor already
    /// finished `iter`; `start` is the driver's period instant.
    pub fn run_released_iteration(&mut self, iter: u32, start: AbsTime) -> Result<(), RunError> {
        self.transition(ExecState::IterationStart);
        self.transition(ExecState::AwaitInputs);
        self.iteration_body(iter, Gating::Released);
        if self.task().is_sink() {
            self.record_latency(iter, start);
        }
        Ok(())
    }

    /// Reads inputs, burns the WCET, writes outputs.
    fn iteration_body(&mut self, iter: u32, gating: Gating) {
        let ctx = self.ctx.clone();
        let task = ctx.dag.task(self.task);
        let inbox = match gating {
            Gating::Channels => ctx.region.channel(self.task),
            Gating::Released => None,
        };

        if let Some(channel) = inbox {
            channel.wait_all();
        }
        let inputs: Vec<Vec<u8>> = task
            .in_edges
            .iter()
            .map(|&e| {
                // SAFETY: every slot is delivered and not yet drained, so the
                // producer finished writing and is blocked from writing
                // again until the drain below.
                let payload = unsafe { ctx.region.payload(e).read() };
                debug_assert_eq!(
                    payload.iter().position(|&b| b == 0),
                    Some(payload.len() - 1),
                    "malformed payload on edge {}",
                    ctx.dag.edge(e).label()
                );
                payload
            })
            .collect();
        if let Some(channel) = inbox {
            channel.drain();
        }
        for payload in &inputs {
            self.outcome.received.push(decode_marker(payload));
        }

        // A consumer still on the previous iteration holds our slot.
        if gating == Gating::Channels {
            for &e in &task.out_edges {
                let edge = ctx.dag.edge(e);
                if let Some(channel) = ctx.region.channel(edge.dst) {
                    channel.await_drained(edge.slot);
                }
            }
        }

        self.transition(ExecState::Process);
        let begin = AbsTime::now();
        busy::count_ticks(self.spin_ticks);
        if ctx.settings.mem_access {
            let folded = inputs.iter().flatten().fold(0u8, |acc, b| acc ^ b);
            self.checksum ^= black_box(folded);
        }

        self.transition(ExecState::EmitOutputs);
        for &e in &task.out_edges {
            let edge = ctx.dag.edge(e);
            let msg = compose_message(&task.name, iter, edge.payload_bytes);
            // SAFETY: this task is the only producer of `e`, and its slot
            // was drained above, so the consumer is done reading.
            unsafe { ctx.region.payload(e).write(&msg) };
        }
        let took = AbsTime::now().saturating_duration_since(begin);

        if gating == Gating::Channels {
            for &e in &task.out_edges {
                let edge = ctx.dag.edge(e);
                if let Some(channel) = ctx.region.channel(edge.dst) {
                    channel.push(edge.slot);
                }
            }
        }

        if took > task.deadline {
            warn!(
                task = %task.name,
                iter,
                took_us = took.as_micros() as u64,
                deadline_us = task.deadline.as_micros() as u64,
                "task deadline missed"
            );
        }
        self.outcome.durations.push(took);
    }

    fn record_latency(&mut self, iter: u32, start: AbsTime) {
        self.transition(ExecState::RecordLatency);
        let e2e = AbsTime::now().saturating_duration_since(start);
        let deadline = self.ctx.dag.e2e_deadline;
        if e2e > deadline {
            warn!(
                dag = %self.ctx.dag.name,
                sink = %self.outcome.task,
                iter,
                e2e_us = e2e.as_micros() as u64,
                deadline_us = deadline.as_micros() as u64,
                "end-to-end deadline missed"
            );
        }
        self.outcome.e2e.push(e2e);
    }

    /// Persists the task log and, for the primary sink, the DAG log.
    pub fn finalize(mut self) -> Result<TaskOutcome, RunError> {
        self.transition(ExecState::Finalize);
        let ctx = &self.ctx;
        let task = ctx.dag.task(self.task);

        let path = ctx.recorder.task_log_path(&task.name);
        ctx.recorder.append_series(&path, task.deadline, &self.outcome.durations)?;

        if ctx.dag.primary_sink() == self.task {
            let path = ctx.recorder.dag_log_path(&ctx.dag.name);
            ctx.recorder.append_series(&path, ctx.dag.e2e_deadline, &self.outcome.e2e)?;
        }
        debug!(task = %task.name, checksum = self.checksum, "worker finished");

        self.transition(ExecState::Terminal);
        Ok(self.outcome)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
