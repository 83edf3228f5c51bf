/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Reusable N-party barrier, generation-counted, no timeout.
//!
//! A party that cannot reach the rendezvous calls [`Barrier::abandon`];
//! every current and future waiter then returns [`Abandoned`] instead of
//! blocking forever.

use std::sync::atomic::{AtomicU32, Ordering};

use super::futex;

/// The barrier was abandoned by a party that failed before arriving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned;

#[repr(C)]
#[derive(Debug)]
pub struct Barrier {
    parties: u32,
    arrived: AtomicU32,
    generation: AtomicU32,
    abandoned: AtomicU32,
}

impl Barrier {
    pub fn new(parties: usize) -> Self {
        debug_assert!(parties > 0);
        Self {
            parties: parties as u32,
            arrived: AtomicU32::new(0),
            generation: AtomicU32::new(0),
            abandoned: AtomicU32::new(0),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties as usize
    }

    /// Blocks until `parties` callers arrived.  Exactly one caller per
    /// generation (the last to arrive) gets `Ok(true)`.
    pub fn wait(&self) -> Result<bool, Abandoned> {
        let generation = self.generation.load(Ordering::Acquire);
        if self.abandoned.load(Ordering::Acquire) != 0 {
            return Err(Abandoned);
        }
        if self.arrived.fetch_add(1, Ordering::AcqRel) + 1 == self.parties {
            self.arrived.store(0, Ordering::Relaxed);
            self.generation.fetch_add(1, Ordering::Release);
            futex::wake_all(&self.generation);
            return Ok(true);
        }
        while self.generation.load(Ordering::Acquire) == generation {
            futex::wait(&self.generation, generation);
        }
        if self.abandoned.load(Ordering::Acquire) != 0 {
            return Err(Abandoned);
        }
        Ok(false)
    }

    /// Releases every waiter with [`Abandoned`].  Permanent.
    pub fn abandon(&self) {
        self.abandoned.store(1, Ordering::Release);
        self.generation.fetch_add(1, Ordering::Release);
        futex::wake_all(&self.generation);
    }
}
