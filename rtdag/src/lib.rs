/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! rtdag – periodic real-time DAG runner
//!
//! Module layout (leaf to root):
//!
//! ```text
//! lib.rs
//! ├── error         – DagError / RunError / OrchestratorError
//! ├── config/       – YAML DAG descriptor + run settings
//! ├── dag/          – validated Task / Edge model, hyperperiod math
//! ├── rt/           – period clock, SCHED_DEADLINE binder, busy-wait
//! ├── sync/         – futex channel, barrier, start markers
//! ├── region        – MAP_SHARED arena holding the sync objects and payloads
//! ├── recorder      – per-task and per-DAG response-time logs
//! ├── executor      – per-task state machine
//! ├── backend/      – thread / process workers, rayon dependency graph
//! └── orchestrator  – builds the model, runs a backend, joins
//! ```

pub mod backend;
pub mod config;
pub mod dag;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod recorder;
pub mod region;
pub mod rt;
pub mod sync;
