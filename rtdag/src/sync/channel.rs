/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Multi-producer, single-consumer rendezvous.
//!
//! Each producer owns one slot.  `push` marks the slot delivered and never
//! blocks; `wait_all` blocks until every slot was delivered since the last
//! drain, and `drain` clears them all at once.  Message bodies are not
//! carried here: they sit in per-edge payload buffers, and a completed
//! `wait_all` makes every buffer written before the matching `push` visible.
//!
//! A producer that runs ahead calls `await_drained` before touching its
//! payload buffer, so it never overwrites an undrained message and never
//! pushes its slot twice.  The consumer reads its buffers between
//! `wait_all` and `drain`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::futex;

/// Gate for the inputs of one task.
#[repr(C)]
#[derive(Debug)]
pub struct Channel {
    producers: u32,
    /// Bumped on every push and drain; the futex word both sides sleep on.
    seq: AtomicU32,
    /// Bit `i` set ⇔ slot `i` delivered and not yet drained.
    pushed: AtomicU64,
}

impl Channel {
    /// A channel with `producers` slots (1..=64).
    pub fn new(producers: usize) -> Self {
        debug_assert!((1..=64).contains(&producers), "unsupported in-degree {producers}");
        Self {
            producers: producers as u32,
            seq: AtomicU32::new(0),
            pushed: AtomicU64::new(0),
        }
    }

    pub fn producers(&self) -> usize {
        self.producers as usize
    }

    fn full_mask(&self) -> u64 {
        if self.producers >= 64 {
            u64::MAX
        } else {
            (1u64 << self.producers) - 1
        }
    }

    /// Number of slots delivered since the last drain.
    pub fn delivered(&self) -> u32 {
        self.pushed.load(Ordering::Acquire).count_ones()
    }

    /// Delivers `slot`.  Pushing the same slot twice before a drain is a
    /// protocol error.
    pub fn push(&self, slot: usize) {
        debug_assert!(slot < self.producers(), "slot {slot} out of range");
        let bit = 1u64 << slot;
        let prev = self.pushed.fetch_or(bit, Ordering::AcqRel);
        debug_assert!(prev & bit == 0, "slot {slot} pushed twice before a drain");
        self.seq.fetch_add(1, Ordering::Release);
        futex::wake_all(&self.seq);
    }

    /// Blocks until all slots were delivered.  Leaves them delivered.
    pub fn wait_all(&self) {
        let full = self.full_mask();
        loop {
            let seen = self.seq.load(Ordering::Acquire);
            if self.pushed.load(Ordering::Acquire) == full {
                return;
            }
            futex::wait(&self.seq, seen);
        }
    }

    /// Clears every slot and wakes producers blocked in `await_drained`.
    /// Consumer only, after `wait_all`.
    pub fn drain(&self) {
        let prev = self.pushed.swap(0, Ordering::AcqRel);
        debug_assert_eq!(prev, self.full_mask(), "drain before every slot was delivered");
        self.seq.fetch_add(1, Ordering::Release);
        futex::wake_all(&self.seq);
    }

    /// `wait_all` followed by `drain`.
    pub fn pop_all(&self) {
        self.wait_all();
        self.drain();
    }

    /// Blocks while `slot` holds a delivery the consumer has not drained.
    pub fn await_drained(&self, slot: usize) {
        let bit = 1u64 << slot;
        loop {
            let seen = self.seq.load(Ordering::Acquire);
            if self.pushed.load(Ordering::Acquire) & bit == 0 {
                return;
            }
            futex::wait(&self.seq, seen);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn full_mask_edges() {
        assert_eq!(Channel::new(1).full_mask(), 0b1);
        assert_eq!(Channel::new(3).full_mask(), 0b111);
        assert_eq!(Channel::new(64).full_mask(), u64::MAX);
    }

    #[test]
    fn pop_all_returns_once_every_slot_pushed() {
        let ch = Channel::new(2);
        ch.push(1);
        assert_eq!(ch.delivered(), 1);
        ch.push(0);
        ch.pop_all();
        assert_eq!(ch.delivered(), 0);
    }

    #[test]
    fn consumer_blocks_until_last_producer() {
        let ch = Arc::new(Channel::new(3));
        let done = Arc::new(AtomicBool::new(false));

        let consumer = {
            let (ch, done) = (ch.clone(), done.clone());
            thread::spawn(move || {
                ch.pop_all();
                done.store(true, Ordering::SeqCst);
            })
        };

        ch.push(0);
        ch.push(2);
        thread::sleep(Duration::from_millis(30));
        assert!(!done.load(Ordering::SeqCst), "consumer returned with a missing slot");

        ch.push(1);
        consumer.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn reusable_across_rounds() {
        let ch = Arc::new(Channel::new(4));
        let rounds = 200;
        let producers: Vec<_> = (0..4)
            .map(|slot| {
                let ch = ch.clone();
                thread::spawn(move || {
                    for _ in 0..rounds {
                        ch.await_drained(slot);
                        ch.push(slot);
                    }
                })
            })
            .collect();

        for _ in 0..rounds {
            ch.pop_all();
        }
        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(ch.delivered(), 0);
    }

    #[test]
    fn producer_waits_for_a_lagging_consumer() {
        let ch = Arc::new(Channel::new(1));
        ch.push(0);
        let released = Arc::new(AtomicBool::new(false));

        let producer = {
            let (ch, released) = (ch.clone(), released.clone());
            thread::spawn(move || {
                ch.await_drained(0);
                released.store(true, Ordering::SeqCst);
                ch.push(0);
            })
        };

        thread::sleep(Duration::from_millis(30));
        assert!(!released.load(Ordering::SeqCst), "producer ran over an undrained slot");
        ch.wait_all();
        assert_eq!(ch.delivered(), 1);
        ch.drain();

        producer.join().unwrap();
        assert!(released.load(Ordering::SeqCst));
        ch.pop_all();
        assert_eq!(ch.delivered(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "pushed twice")]
    fn double_push_is_caught_in_debug() {
        let ch = Channel::new(2);
        ch.push(0);
        ch.push(0);
    }
}
