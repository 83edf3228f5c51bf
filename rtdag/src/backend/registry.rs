/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Run-scoped list of live execution units, shared with the supervisor so
//! it can kill worker processes when the run is interrupted.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitId {
    /// `pthread_t` of a worker thread.
    Thread(u64),
    Process(libc::pid_t),
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitId::Thread(t) => write!(f, "thread {t:#x}"),
            UnitId::Process(p) => write!(f, "pid {p}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUnit {
    pub name: String,
    pub id: UnitId,
}

#[derive(Debug, Clone, Default)]
pub struct UnitRegistry {
    units: Arc<Mutex<Vec<RegisteredUnit>>>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, id: UnitId) {
        self.lock().push(RegisteredUnit {
            name: name.to_string(),
            id,
        });
    }

    /// Drops `id` once its unit was reaped, so a recycled pid is never
    /// signalled.
    pub fn forget(&self, id: UnitId) {
        self.lock().retain(|u| u.id != id);
    }

    pub fn units(&self) -> Vec<RegisteredUnit> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sends `SIGKILL` to every registered process.  Threads cannot be
    /// killed individually; they end with the process.  Returns the number
    /// of processes signalled.
    pub fn terminate_all(&self) -> usize {
        let units = std::mem::take(&mut *self.lock());
        let mut killed = 0;
        for unit in &units {
            match unit.id {
                UnitId::Process(pid) => {
                    // SAFETY: plain kill(2) on a pid we forked and have not
                    // reaped yet.
                    if unsafe { libc::kill(pid, libc::SIGKILL) } == 0 {
                        killed += 1;
                    } else {
                        warn!(task = %unit.name, pid, "could not kill worker");
                    }
                }
                UnitId::Thread(_) => {}
            }
        }
        info!(units = units.len(), killed, "execution units terminated");
        killed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RegisteredUnit>> {
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
