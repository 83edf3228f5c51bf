/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Binding the calling thread to a `SCHED_DEADLINE` contract.
//!
//! glibc has no wrapper for `sched_setattr(2)`, so the call goes through
//! `syscall(2)` with the kernel's `struct sched_attr` layout.  Both the
//! contract and CPU pinning apply to the *calling* thread (pid argument 0),
//! which is why every worker binds itself during its `Init` state.

use std::fmt;
use std::io;
use std::mem;
use std::time::Duration;

use tracing::{debug, info};

use crate::dag::{Task, MIN_RUNTIME_NS};
use crate::error::RunError;
use crate::rt::clock::duration_ns;

const SCHED_DEADLINE: u32 = 6;
const RT_RUNTIME_KNOB: &str = "/proc/sys/kernel/sched_rt_runtime_us";

const PRIVILEGE_HINT: &str =
    "requires root or CAP_SYS_NICE, and RT throttling disabled (sched_rt_runtime_us = -1)";

/// Kernel `struct sched_attr` (SCHED_ATTR_SIZE_VER0).
#[repr(C)]
#[derive(Debug, Default)]
struct SchedAttr {
    size: u32,
    sched_policy: u32,
    sched_flags: u64,
    sched_nice: i32,
    sched_priority: u32,
    sched_runtime: u64,
    sched_deadline: u64,
    sched_period: u64,
}

// ── Contract ──────────────────────────────────────────────────────────────────

/// Runtime / deadline / period triple of a deadline-scheduled worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineContract {
    pub runtime: Duration,
    pub deadline: Duration,
    pub period: Duration,
}

impl DeadlineContract {
    /// runtime = WCET, deadline = period = the task's relative deadline.
    pub fn for_task(task: &Task) -> Self {
        Self {
            runtime: task.wcet,
            deadline: task.deadline,
            period: task.deadline,
        }
    }
}

// ── Binder trait ──────────────────────────────────────────────────────────────

/// Applies scheduling parameters to the calling thread.
pub trait SchedBinder: Send + Sync + fmt::Debug {
    fn bind(&self, contract: &DeadlineContract) -> Result<(), RunError>;

    fn pin(&self, task: &str, core: usize) -> Result<(), RunError>;
}

/// Real `SCHED_DEADLINE` binding and affinity.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadlineBinder;

impl SchedBinder for DeadlineBinder {
    fn bind(&self, contract: &DeadlineContract) -> Result<(), RunError> {
        let runtime_ns = duration_ns(contract.runtime);
        if runtime_ns < MIN_RUNTIME_NS {
            return Err(RunError::ContractBelowGranularity { runtime_ns });
        }
        let attr = SchedAttr {
            size: mem::size_of::<SchedAttr>() as u32,
            sched_policy: SCHED_DEADLINE,
            sched_runtime: runtime_ns,
            sched_deadline: duration_ns(contract.deadline),
            sched_period: duration_ns(contract.period),
            ..SchedAttr::default()
        };

        // SAFETY: `attr` is a properly sized, initialised sched_attr that
        // outlives the call; pid 0 targets the calling thread.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_sched_setattr,
                0 as libc::pid_t,
                &attr as *const SchedAttr,
                0 as libc::c_uint,
            )
        };
        if rc != 0 {
            let source = io::Error::last_os_error();
            if source.raw_os_error() == Some(libc::EPERM) {
                return Err(RunError::Privilege {
                    operation: "sched_setattr(SCHED_DEADLINE)",
                    hint: PRIVILEGE_HINT,
                    source,
                });
            }
            return Err(RunError::ContractRejected {
                runtime_ns,
                deadline_ns: attr.sched_deadline,
                period_ns: attr.sched_period,
                source,
            });
        }
        debug!(
            runtime_ns,
            deadline_ns = attr.sched_deadline,
            period_ns = attr.sched_period,
            "SCHED_DEADLINE contract bound"
        );
        Ok(())
    }

    fn pin(&self, task: &str, core: usize) -> Result<(), RunError> {
        // SAFETY: `set` is a zeroed cpu_set_t owned by this frame; CPU_SET
        // only touches bits inside it and `core` was range-checked when the
        // DAG was built.
        let rc = unsafe {
            let mut set: libc::cpu_set_t = mem::zeroed();
            libc::CPU_SET(core, &mut set);
            libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set)
        };
        if rc != 0 {
            return Err(RunError::Affinity {
                task: task.to_string(),
                core,
                source: io::Error::last_os_error(),
            });
        }
        debug!(task, core, "pinned");
        Ok(())
    }
}

/// Binds nothing.  Used for unprivileged dry runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBinder;

impl SchedBinder for NoopBinder {
    fn bind(&self, _contract: &DeadlineContract) -> Result<(), RunError> {
        Ok(())
    }

    fn pin(&self, _task: &str, _core: usize) -> Result<(), RunError> {
        Ok(())
    }
}

/// Disables RT throttling system-wide, the precondition for admitting
/// deadline contracts that use the full CPU bandwidth.
pub fn disable_rt_throttling() -> Result<(), RunError> {
    std::fs::write(RT_RUNTIME_KNOB, "-1").map_err(|source| RunError::Privilege {
        operation: "writing /proc/sys/kernel/sched_rt_runtime_us",
        hint: "requires root",
        source,
    })?;
    info!("RT throttling disabled (sched_rt_runtime_us = -1)");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
