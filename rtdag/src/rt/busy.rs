/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Busy-wait emulation of task cost.
//!
//! A task "runs" for its WCET by spinning a counter.  The number of counter
//! increments per microsecond is host-specific and comes from a
//! [`Calibration`] provider.

use std::hint::black_box;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::RunError;

/// Environment variable holding the calibrated tick rate.
pub const TICKS_ENV: &str = "TICKS_PER_US";

const MEASURE_CHUNK: u64 = 100_000;

/// Source of the ticks-per-microsecond constant.
pub trait Calibration: Send + Sync {
    fn ticks_per_us(&self) -> Result<u64, RunError>;
}

/// Reads [`TICKS_ENV`].  Absence is a startup error.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCalibration;

impl Calibration for EnvCalibration {
    fn ticks_per_us(&self) -> Result<u64, RunError> {
        parse_ticks(std::env::var(TICKS_ENV).ok().as_deref())
    }
}

fn parse_ticks(raw: Option<&str>) -> Result<u64, RunError> {
    let raw = raw.ok_or_else(|| {
        RunError::Calibration(format!(
            "{TICKS_ENV} is not set; run `rtdag --calibrate <usec>` first"
        ))
    })?;
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(RunError::Calibration(format!(
            "{TICKS_ENV}={raw:?} is not a positive integer"
        ))),
        Ok(t) => Ok(t),
    }
}

/// A constant tick rate.
#[derive(Debug, Clone, Copy)]
pub struct FixedCalibration(pub u64);

impl Calibration for FixedCalibration {
    fn ticks_per_us(&self) -> Result<u64, RunError> {
        if self.0 == 0 {
            return Err(RunError::Calibration("tick rate must be positive".into()));
        }
        Ok(self.0)
    }
}

/// Measures the tick rate by spinning for `window`.
#[derive(Debug, Clone, Copy)]
pub struct MeasuredCalibration {
    pub window: Duration,
}

impl Calibration for MeasuredCalibration {
    fn ticks_per_us(&self) -> Result<u64, RunError> {
        let start = Instant::now();
        let mut ticks = 0u64;
        while start.elapsed() < self.window {
            count_ticks(MEASURE_CHUNK);
            ticks += MEASURE_CHUNK;
        }
        let elapsed_us = start.elapsed().as_micros().max(1) as u64;
        let rate = (ticks / elapsed_us).max(1);
        debug!(ticks, elapsed_us, rate, "busy-wait calibrated");
        Ok(rate)
    }
}

/// Spins `ticks` increments of an opaque counter.
#[inline(never)]
pub fn count_ticks(ticks: u64) {
    let mut i = 0u64;
    while black_box(i) < ticks {
        i += 1;
    }
}

/// Ticks to burn for `wcet × ratio` at `ticks_per_us`.
pub fn spin_ticks(wcet: Duration, ratio: f64, ticks_per_us: u64) -> u64 {
    (wcet.as_micros() as f64 * ratio * ticks_per_us as f64) as u64
}

/// Spins for `usec` microseconds of calibrated work and returns the time it
/// actually took.
pub fn time_busy_wait(usec: u64, ticks_per_us: u64) -> Duration {
    let start = Instant::now();
    count_ticks(usec.saturating_mul(ticks_per_us));
    start.elapsed()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
