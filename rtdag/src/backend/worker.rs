/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Explicit-worker backend: one thread or one process per task.

use std::io;
use std::os::unix::thread::JoinHandleExt;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use super::{Spawner, UnitId, UnitRegistry, WorkUnit};
use crate::error::RunError;
use crate::executor::{RunContext, TaskExecutor, TaskOutcome};

// ── Threads ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

pub struct ThreadHandle {
    name: String,
    inner: JoinHandle<Result<TaskOutcome, RunError>>,
}

impl Spawner for ThreadSpawner {
    type Handle = ThreadHandle;

    fn spawn(&self, unit: WorkUnit) -> Result<ThreadHandle, RunError> {
        let WorkUnit { name, body } = unit;
        let inner = thread::Builder::new()
            .name(name.clone())
            .spawn(body)
            .map_err(|source| RunError::Spawn {
                task: name.clone(),
                source,
            })?;
        Ok(ThreadHandle { name, inner })
    }

    fn unit_id(&self, handle: &ThreadHandle) -> UnitId {
        UnitId::Thread(handle.inner.as_pthread_t() as u64)
    }

    fn join(&self, handle: ThreadHandle) -> Result<Option<TaskOutcome>, RunError> {
        match handle.inner.join() {
            Ok(result) => result.map(Some),
            Err(_) => Err(RunError::WorkerPanicked { task: handle.name }),
        }
    }

    fn terminate(&self, _handle: &ThreadHandle) -> Result<(), RunError> {
        Err(RunError::Unsupported("worker threads cannot be terminated individually"))
    }
}

// ── Processes ─────────────────────────────────────────────────────────────────

/// Exit status of a child whose body panicked.
const PANIC_EXIT: i32 = 101;
/// Exit status of a child released from the start barrier by a failed peer.
const STARTUP_ABORTED_EXIT: i32 = 3;

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSpawner;

#[derive(Debug)]
pub struct ProcessHandle {
    name: String,
    pid: libc::pid_t,
}

impl Spawner for ProcessSpawner {
    type Handle = ProcessHandle;

    fn spawn(&self, unit: WorkUnit) -> Result<ProcessHandle, RunError> {
        let WorkUnit { name, body } = unit;
        // SAFETY: the child runs the task body against the inherited shared
        // region and leaves through _exit, never returning into the
        // parent's stack or running its destructors.
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(RunError::Spawn {
                task: name,
                source: io::Error::last_os_error(),
            });
        }
        if pid == 0 {
            let code = match panic::catch_unwind(AssertUnwindSafe(body)) {
                Ok(Ok(_)) => 0,
                Ok(Err(RunError::StartupAborted { .. })) => STARTUP_ABORTED_EXIT,
                Ok(Err(e)) => {
                    error!(task = %name, "worker failed: {e}");
                    1
                }
                Err(_) => PANIC_EXIT,
            };
            // SAFETY: terminates the child immediately.
            unsafe { libc::_exit(code) };
        }
        Ok(ProcessHandle { name, pid })
    }

    fn unit_id(&self, handle: &ProcessHandle) -> UnitId {
        UnitId::Process(handle.pid)
    }

    fn join(&self, handle: ProcessHandle) -> Result<Option<TaskOutcome>, RunError> {
        let mut status = 0;
        loop {
            // SAFETY: waiting on our own child.
            let rc = unsafe { libc::waitpid(handle.pid, &mut status, 0) };
            if rc == handle.pid {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(RunError::Spawn {
                    task: handle.name,
                    source: err,
                });
            }
        }
        if libc::WIFEXITED(status) {
            match libc::WEXITSTATUS(status) {
                0 => return Ok(None),
                PANIC_EXIT => return Err(RunError::WorkerPanicked { task: handle.name }),
                STARTUP_ABORTED_EXIT => return Err(RunError::StartupAborted { task: handle.name }),
                _ => {}
            }
        }
        Err(RunError::WorkerFailed {
            task: handle.name,
            status,
        })
    }

    fn terminate(&self, handle: &ProcessHandle) -> Result<(), RunError> {
        // SAFETY: kill(2) on our own, not yet reaped child.
        if unsafe { libc::kill(handle.pid, libc::SIGKILL) } != 0 {
            return Err(RunError::Spawn {
                task: handle.name.clone(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// Spawns one unit per task, registers it, then joins them all.
///
/// If a spawn fails the start barrier is abandoned, the units already
/// started are terminated where the spawner allows it, and the rest are
/// joined so that none outlives the run.  Otherwise every unit is joined and
/// the first failure is reported, a startup failure taking precedence over
/// the `StartupAborted` errors of its peers.
pub fn run_workers<S: Spawner>(
    spawner: &S,
    ctx: &RunContext,
    registry: &UnitRegistry,
) -> Result<Vec<TaskOutcome>, RunError> {
    let mut handles = Vec::with_capacity(ctx.dag.tasks().len());

    for task in ctx.dag.tasks() {
        let executor = TaskExecutor::new(task.id, ctx.clone());
        let unit = WorkUnit {
            name: task.name.clone(),
            body: Box::new(move || executor.run()),
        };
        match spawner.spawn(unit) {
            Ok(handle) => {
                let id = spawner.unit_id(&handle);
                registry.register(&task.name, id);
                handles.push((id, handle));
            }
            Err(e) => {
                error!(task = %task.name, "spawn failed: {e}");
                ctx.region.barrier().abandon();
                for (id, handle) in handles {
                    if let Err(te) = spawner.terminate(&handle) {
                        debug!(unit = %id, "not terminated, joining: {te}");
                    }
                    if let Err(je) = spawner.join(handle) {
                        debug!(unit = %id, "aborted worker: {je}");
                    }
                    registry.forget(id);
                }
                return Err(e);
            }
        }
    }
    info!(units = handles.len(), "all workers spawned");

    let mut outcomes = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for (id, handle) in handles {
        let joined = spawner.join(handle);
        registry.forget(id);
        match joined {
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => {}
            Err(e) => {
                error!(unit = %id, "worker failed: {e}");
                // Prefer the root cause over the peers it aborted.
                let replace = match &first_error {
                    None => true,
                    Some(RunError::StartupAborted { .. }) => {
                        !matches!(e, RunError::StartupAborted { .. })
                    }
                    Some(_) => false,
                };
                if replace {
                    first_error = Some(e);
                }
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(outcomes),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
