/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Thin wrappers over `futex(2)`.
//!
//! Shared (non-`FUTEX_PRIVATE_FLAG`) operations only: the words may be
//! mapped into several processes.  Waits may return spuriously; callers
//! always re-check their condition in a loop.

use std::ptr;
use std::sync::atomic::AtomicU32;

/// Blocks while `*word == expected`.
pub fn wait(word: &AtomicU32, expected: u32) {
    // SAFETY: `word` points to a live, aligned u32 for the duration of the
    // call; a null timeout means wait indefinitely.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            ptr::null::<libc::timespec>(),
        );
    }
}

/// Wakes every waiter blocked on `word`.
pub fn wake_all(word: &AtomicU32) {
    // SAFETY: `word` points to a live, aligned u32.
    unsafe {
        libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, i32::MAX);
    }
}
