/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Response-time logs.
//!
//! File format, one integer (microseconds) per line:
//! ```text
//! <deadline_us>        ← header, written only when the file is created
//! <sample_us>
//! <sample_us>
//! ```
//! Files are appended across runs so several runs accumulate one series.
//! Each file has exactly one writer per run: its task's executor for
//! `<task>.log`, the primary sink for `<dag>.log`.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::error::RunError;

#[derive(Debug, Clone)]
pub struct ResponseRecorder {
    dir: PathBuf,
}

impl ResponseRecorder {
    /// Logs of DAG `dag_name` go to `<root>/<dag_name>/`.
    pub fn new(root: &Path, dag_name: &str) -> Self {
        Self {
            dir: root.join(dag_name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the output directory.  Called before any worker starts.
    pub fn prepare(&self) -> Result<(), RunError> {
        fs::create_dir_all(&self.dir).map_err(|source| RunError::Persist {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn task_log_path(&self, task: &str) -> PathBuf {
        self.dir.join(format!("{task}.log"))
    }

    pub fn dag_log_path(&self, dag: &str) -> PathBuf {
        self.dir.join(format!("{dag}.log"))
    }

    /// Appends `samples` to `path`, writing `header` first if the file does
    /// not exist yet.
    pub fn append_series(&self, path: &Path, header: Duration, samples: &[Duration]) -> Result<(), RunError> {
        let persist = |source| RunError::Persist {
            path: path.to_path_buf(),
            source,
        };
        let fresh = !path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(persist)?;
        let mut out = BufWriter::new(file);
        if fresh {
            writeln!(out, "{}", header.as_micros()).map_err(persist)?;
        }
        for s in samples {
            writeln!(out, "{}", s.as_micros()).map_err(persist)?;
        }
        out.flush().map_err(persist)?;
        debug!(path = %path.display(), samples = samples.len(), fresh, "response times persisted");
        Ok(())
    }
}

/// Reads a log back: `(header_us, samples_us)`.
pub fn load_series(path: &Path) -> Result<(u64, Vec<u64>)> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Cannot open response log: {}", path.display()))?;
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .with_context(|| format!("{} is empty", path.display()))?
        .trim()
        .parse::<u64>()
        .with_context(|| format!("{}: bad header", path.display()))?;
    let samples = lines
        .enumerate()
        .map(|(i, l)| {
            l.trim()
                .parse::<u64>()
                .with_context(|| format!("{}: bad sample on line {}", path.display(), i + 2))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((header, samples))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
