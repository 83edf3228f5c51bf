/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Shared memory arena holding every run-time object workers exchange.
//!
//! ```text
//! ┌─────────┬────────────────────────┬──────────────────────┬────────────────────┐
//! │ Barrier │ Channel per non-origin │ StartMarker per iter │ payload per edge   │
//! └─────────┴────────────────────────┴──────────────────────┴────────────────────┘
//!  every object starts on a 64-byte boundary
//! ```
//!
//! The region is one anonymous `MAP_SHARED` mapping sized from the DAG before
//! any worker exists.  Threads reach it through an `Arc`; forked workers
//! inherit the mapping at the same address.  It is unmapped when the last
//! `Arc` drops, after every worker joined.

use std::io;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

use tracing::debug;

use crate::dag::{Dag, EdgeId, TaskId};
use crate::error::RunError;
use crate::sync::{Barrier, Channel, StartMarker};

const ALIGN: usize = 64;

fn align_up(offset: usize) -> usize {
    offset.div_ceil(ALIGN) * ALIGN
}

// ── Layout ────────────────────────────────────────────────────────────────────

/// Byte offsets of every object inside the region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionLayout {
    barrier: usize,
    channels: Vec<Option<usize>>,
    markers: usize,
    iterations: usize,
    /// `(offset, len)` per edge.
    payloads: Vec<(usize, usize)>,
    size: usize,
}

impl RegionLayout {
    pub fn for_dag(dag: &Dag) -> Self {
        let mut cursor = 0;
        let mut place = |bytes: usize| {
            let at = align_up(cursor);
            cursor = at + bytes;
            at
        };

        let barrier = place(mem::size_of::<Barrier>());
        let channels = dag
            .tasks()
            .iter()
            .map(|t| (!t.is_originator()).then(|| place(mem::size_of::<Channel>())))
            .collect();
        let iterations = dag.iterations() as usize;
        let markers = place(mem::size_of::<StartMarker>() * iterations);
        let payloads = dag
            .edges()
            .iter()
            .map(|e| (place(e.payload_bytes), e.payload_bytes))
            .collect();

        Self {
            barrier,
            channels,
            markers,
            iterations,
            payloads,
            size: align_up(cursor.max(1)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

// ── Region ────────────────────────────────────────────────────────────────────

pub struct SharedRegion {
    base: NonNull<u8>,
    layout: RegionLayout,
}

// SAFETY: the region only hands out shared references to atomics-only
// `Sync` objects and payload slots whose access is serialised by the
// channel protocol.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("base", &self.base)
            .field("size", &self.layout.size)
            .finish()
    }
}

impl SharedRegion {
    /// Maps and initialises the region for `dag`.
    pub fn allocate(dag: &Dag) -> Result<Self, RunError> {
        let layout = RegionLayout::for_dag(dag);
        let bytes = layout.size;

        // SAFETY: anonymous shared mapping with no address hint; the result
        // is checked against MAP_FAILED below.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                bytes,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(RunError::SharedMemory {
                bytes,
                source: io::Error::last_os_error(),
            });
        }
        let base = NonNull::new(raw.cast::<u8>()).ok_or_else(|| RunError::SharedMemory {
            bytes,
            source: io::Error::other("mmap returned null"),
        })?;

        // SAFETY: every offset is 64-byte aligned, in bounds by construction
        // of the layout, and nothing else references the fresh mapping yet.
        // Payload bytes stay zero as mapped.
        unsafe {
            let at = |off: usize| base.as_ptr().add(off);
            ptr::write(at(layout.barrier).cast::<Barrier>(), Barrier::new(dag.tasks().len()));
            for (task, off) in layout.channels.iter().enumerate() {
                if let Some(off) = off {
                    let inputs = dag.task(task).in_edges.len();
                    ptr::write(at(*off).cast::<Channel>(), Channel::new(inputs));
                }
            }
            let markers = at(layout.markers).cast::<StartMarker>();
            for i in 0..layout.iterations {
                ptr::write(markers.add(i), StartMarker::new());
            }
        }

        debug!(
            bytes,
            channels = layout.channels.iter().flatten().count(),
            markers = layout.iterations,
            payloads = layout.payloads.len(),
            "shared region mapped"
        );
        Ok(Self { base, layout })
    }

    pub fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    /// # Safety
    /// `off` must be the offset of a live, initialised `T` in this region.
    unsafe fn object<T>(&self, off: usize) -> &T {
        unsafe { &*self.base.as_ptr().add(off).cast::<T>() }
    }

    pub fn barrier(&self) -> &Barrier {
        // SAFETY: initialised in `allocate`.
        unsafe { self.object(self.layout.barrier) }
    }

    /// Input channel of `task`; `None` for originators.
    pub fn channel(&self, task: TaskId) -> Option<&Channel> {
        let off = self.layout.channels.get(task).copied().flatten()?;
        // SAFETY: initialised in `allocate`.
        Some(unsafe { self.object(off) })
    }

    /// Start marker of iteration `iteration`.
    pub fn marker(&self, iteration: u32) -> &StartMarker {
        let i = iteration as usize;
        assert!(i < self.layout.iterations, "iteration {i} out of range");
        // SAFETY: in bounds (checked above) and initialised in `allocate`.
        unsafe { self.object(self.layout.markers + i * mem::size_of::<StartMarker>()) }
    }

    /// Payload buffer of `edge`.
    pub fn payload(&self, edge: EdgeId) -> PayloadSlot<'_> {
        let (off, len) = self.layout.payloads[edge];
        PayloadSlot {
            // SAFETY: `off + len` is within the mapping.
            ptr: unsafe { self.base.as_ptr().add(off) },
            len,
            _region: PhantomData,
        }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // SAFETY: `base`/`size` are exactly what mmap returned; no borrow of
        // the region outlives `self`.
        unsafe { libc::munmap(self.base.as_ptr().cast(), self.layout.size) };
    }
}

// ── Payload slot ──────────────────────────────────────────────────────────────

/// The byte buffer of one edge.
///
/// Reads and writes are unsynchronised on their own: the single producer
/// writes before pushing the edge's channel slot (or before decrementing
/// the successor counter), and the consumer reads only after its gate
/// opened for the same iteration.
#[derive(Debug, Clone, Copy)]
pub struct PayloadSlot<'r> {
    ptr: *mut u8,
    len: usize,
    _region: PhantomData<&'r SharedRegion>,
}

impl PayloadSlot<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies `bytes` (truncated to the slot size) into the buffer.
    ///
    /// # Safety
    /// The caller is the edge's producer and the consumer is not reading.
    pub unsafe fn write(&self, bytes: &[u8]) {
        let n = bytes.len().min(self.len);
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr, n) };
    }

    /// Copies the buffer out.
    ///
    /// # Safety
    /// The caller is the edge's consumer and its gate opened for the
    /// iteration whose payload it expects.
    pub unsafe fn read(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len];
        unsafe { ptr::copy_nonoverlapping(self.ptr, out.as_mut_ptr(), self.len) };
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
