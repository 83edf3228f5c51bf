/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-iteration DAG start instant, published by the originators and read
//! by the sinks.
//!
//! One marker exists per iteration and is never reset, so any number of
//! sinks may read it.  With several originators the earliest published
//! instant wins.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::futex;
use crate::rt::AbsTime;

#[repr(C)]
#[derive(Debug)]
pub struct StartMarker {
    delivered: AtomicU32,
    earliest: AtomicU64,
}

impl Default for StartMarker {
    fn default() -> Self {
        Self::new()
    }
}

impl StartMarker {
    pub const fn new() -> Self {
        Self {
            delivered: AtomicU32::new(0),
            earliest: AtomicU64::new(u64::MAX),
        }
    }

    pub fn publish(&self, start: AbsTime) {
        self.earliest.fetch_min(start.as_nanos(), Ordering::AcqRel);
        self.delivered.fetch_add(1, Ordering::Release);
        futex::wake_all(&self.delivered);
    }

    /// Blocks until `originators` instants were published.
    pub fn wait(&self, originators: usize) -> AbsTime {
        let needed = originators as u32;
        loop {
            let seen = self.delivered.load(Ordering::Acquire);
            if seen >= needed {
                return AbsTime::from_nanos(self.earliest.load(Ordering::Acquire));
            }
            futex::wait(&self.delivered, seen);
        }
    }
}
