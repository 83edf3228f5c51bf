/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Process-shareable synchronisation objects.
//!
//! Every type here is `#[repr(C)]`, built only from atomics, and blocks via
//! non-private futex operations.  They can therefore live in a `MAP_SHARED`
//! region and be used unchanged by threads of one process or by forked
//! worker processes.

pub mod barrier;
pub mod channel;
pub mod futex;
pub mod marker;

pub use barrier::{Abandoned, Barrier};
pub use channel::Channel;
pub use marker::StartMarker;
