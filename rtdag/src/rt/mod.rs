/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Real-time primitives: the period clock, the deadline-scheduling binder
//! and busy-wait emulation of task cost.

pub mod binder;
pub mod busy;
pub mod clock;

pub use binder::{DeadlineBinder, DeadlineContract, NoopBinder, SchedBinder};
pub use busy::{Calibration, EnvCalibration, FixedCalibration, MeasuredCalibration};
pub use clock::{AbsTime, PeriodClock, SETTLE_DELAY};
