/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Period arithmetic shared by the descriptor loader and the DAG model.

use crate::error::DagError;

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Least common multiple of the co-scheduled periods, i.e. the shared
/// hyperperiod.  `Ok(0)` if `periods` is empty or contains a zero.
pub fn common_hyperperiod(periods: &[u64]) -> Result<u64, DagError> {
    let Some((&first, rest)) = periods.split_first() else {
        return Ok(0);
    };
    rest.iter().try_fold(first, |acc, &p| {
        if acc == 0 || p == 0 {
            return Ok(0);
        }
        (acc / gcd(acc, p))
            .checked_mul(p)
            .ok_or(DagError::HyperperiodOverflow { a: acc, b: p })
    })
}

/// Number of activations of a DAG with `period_us` inside `hyperperiod_us`.
///
/// The ratio must be an exact positive integer; anything else means the
/// DAG cannot be replicated deterministically over the hyperperiod.
pub fn hyperperiod_iters(hyperperiod_us: u64, period_us: u64) -> Result<u32, DagError> {
    if period_us == 0 {
        return Err(DagError::ZeroPeriod);
    }
    let not_multiple = DagError::HyperperiodNotMultiple {
        hyperperiod_us,
        period_us,
    };
    if hyperperiod_us == 0 || hyperperiod_us % period_us != 0 {
        return Err(not_multiple);
    }
    u32::try_from(hyperperiod_us / period_us).map_err(|_| not_multiple)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
