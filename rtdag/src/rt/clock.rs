/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Absolute time on `CLOCK_MONOTONIC` and drift-free periodic activation.
//!
//! [`AbsTime`] is a plain nanosecond count so it can be stored in shared
//! memory and compared across forked workers, which `std::time::Instant`
//! cannot.  Every sleep is absolute (`clock_nanosleep(TIMER_ABSTIME)`), so
//! the activation grid never accumulates wake-up latency.

use std::ops::Add;
use std::ptr;
use std::time::Duration;

use tracing::warn;

/// Delay granted before the first activation so the deadline scheduler's
/// accounting settles after every worker bound its contract.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Saturating `Duration` → nanoseconds.
pub(crate) fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

// ── AbsTime ───────────────────────────────────────────────────────────────────

/// A `CLOCK_MONOTONIC` instant in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct AbsTime(u64);

impl AbsTime {
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn now() -> Self {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec; CLOCK_MONOTONIC is
        // always available on Linux.
        unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        Self((ts.tv_sec as u64) * NANOS_PER_SEC + ts.tv_nsec as u64)
    }

    /// `self − earlier`, or zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: AbsTime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    fn to_timespec(self) -> libc::timespec {
        libc::timespec {
            tv_sec: (self.0 / NANOS_PER_SEC) as libc::time_t,
            tv_nsec: (self.0 % NANOS_PER_SEC) as libc::c_long,
        }
    }
}

impl Add<Duration> for AbsTime {
    type Output = AbsTime;

    fn add(self, rhs: Duration) -> AbsTime {
        AbsTime(self.0.saturating_add(duration_ns(rhs)))
    }
}

/// Sleeps until `deadline` on `CLOCK_MONOTONIC`.  Returns immediately if
/// the instant already passed.
pub fn sleep_until(deadline: AbsTime) {
    let ts = deadline.to_timespec();
    loop {
        // SAFETY: `ts` is a valid timespec; the remaining-time pointer may be
        // null for absolute sleeps.
        let rc = unsafe {
            libc::clock_nanosleep(
                libc::CLOCK_MONOTONIC,
                libc::TIMER_ABSTIME,
                &ts,
                ptr::null_mut(),
            )
        };
        match rc {
            0 => return,
            libc::EINTR => continue,
            other => {
                debug_assert!(false, "clock_nanosleep failed with {other}");
                return;
            }
        }
    }
}

// ── PeriodClock ───────────────────────────────────────────────────────────────

/// Drives the periodic activation of an originator.
#[derive(Debug, Clone)]
pub struct PeriodClock {
    period_ns: u64,
    next: AbsTime,
}

impl PeriodClock {
    /// Captures `now` as the first period instant.
    pub fn start(period: Duration) -> Self {
        let period_ns = duration_ns(period);
        debug_assert!(period_ns > 0, "period must be positive");
        Self {
            period_ns: period_ns.max(1),
            next: AbsTime::now(),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(self.period_ns)
    }

    /// Absolute instant of the current period: the start marker of the
    /// iteration being executed.
    pub fn current(&self) -> AbsTime {
        self.next
    }

    /// Advances the period instant by the smallest multiple of the period
    /// that lands at or after `now + extra`, then sleeps until it.
    pub fn align(&mut self, extra: Duration) -> AbsTime {
        let target = AbsTime::now() + extra;
        if self.next < target {
            let gap = target.as_nanos() - self.next.as_nanos();
            let steps = gap.div_ceil(self.period_ns);
            self.next = AbsTime(
                self.next
                    .as_nanos()
                    .saturating_add(steps.saturating_mul(self.period_ns)),
            );
        }
        sleep_until(self.next);
        self.next
    }

    /// Moves to the next period and sleeps until it begins.
    ///
    /// When that instant is already in the past the clock skips forward to
    /// the first future boundary on the same grid.  Returns the number of
    /// skipped activations (zero on time).
    pub fn wait_next_period(&mut self) -> u64 {
        let mut next = self.next.as_nanos().saturating_add(self.period_ns);
        let now = AbsTime::now().as_nanos();
        let mut skipped = 0;
        if next < now {
            skipped = (now - next) / self.period_ns + 1;
            next = next.saturating_add(skipped.saturating_mul(self.period_ns));
            warn!(
                period_us = self.period_ns / 1_000,
                skipped,
                "period overrun, skipping to the next boundary"
            );
        }
        self.next = AbsTime(next);
        sleep_until(self.next);
        skipped
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
