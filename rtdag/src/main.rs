/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use rtdag::backend::BackendKind;
use rtdag::config::{DagDescriptor, RunSettings, DEFAULT_EXPECTED_WCET_RATIO, DEFAULT_SEED};
use rtdag::orchestrator::Orchestrator;
use rtdag::rt::busy::{self, TICKS_ENV};
use rtdag::rt::{Calibration, EnvCalibration, MeasuredCalibration};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Runs a DAG of periodic SCHED_DEADLINE tasks and logs response times.
///
/// Example:
///   TICKS_PER_US=$(rtdag -c 1000000 | cut -d= -f2)
///   sudo -E rtdag -b processes dags/chain.yaml
#[derive(Debug, Parser)]
#[command(
    name = "rtdag",
    about = "Periodic real-time DAG runner",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML DAG descriptor.
    #[arg(required_unless_present_any = ["calibrate", "test"])]
    descriptor: Option<PathBuf>,

    /// Fraction of each task's WCET burnt by the busy-wait, in (0, 1].
    #[arg(short = 'e', long = "expected", default_value_t = DEFAULT_EXPECTED_WCET_RATIO)]
    expected: f64,

    /// Concurrency backend.
    #[arg(short = 'b', long = "backend", value_enum, default_value_t = BackendKind::Threads)]
    backend: BackendKind,

    /// Measure the busy-wait tick rate over USEC microseconds and print it.
    #[arg(short = 'c', long = "calibrate", value_name = "USEC")]
    calibrate: Option<u64>,

    /// Busy-wait USEC microseconds with the TICKS_PER_US rate and report
    /// the time it really took.
    #[arg(short = 't', long = "test", value_name = "USEC")]
    test: Option<u64>,

    /// Directory receiving `<dag>/<task>.log` and `<dag>/<dag>.log`.
    #[arg(short = 'o', long = "output", default_value = ".")]
    output: PathBuf,

    /// Skip SCHED_DEADLINE binding, pinning and the RT-throttle knob.
    #[arg(long = "no-realtime", default_value_t = false)]
    no_realtime: bool,

    /// Scan input payloads while processing.
    #[arg(long = "mem-access", default_value_t = false)]
    mem_access: bool,
}

// ── Actions ───────────────────────────────────────────────────────────────────

fn calibrate(usec: u64) {
    let window = Duration::from_micros(usec);
    match (MeasuredCalibration { window }).ticks_per_us() {
        Ok(rate) => {
            info!(window_us = usec, ticks_per_us = rate, "calibration done");
            println!("{TICKS_ENV}={rate}");
        }
        Err(e) => {
            error!("Calibration failed: {e}");
            process::exit(1);
        }
    }
}

fn test_busy_wait(usec: u64) {
    let rate = match EnvCalibration.ticks_per_us() {
        Ok(rate) => rate,
        Err(e) => {
            error!("{e}");
            eprintln!("rtdag: {e}");
            process::exit(1);
        }
    };
    let took = busy::time_busy_wait(usec, rate);
    info!(requested_us = usec, measured_us = took.as_micros() as u64, ticks_per_us = rate, "busy-wait test");
    println!("requested {usec}us, measured {}us", took.as_micros());
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Some(usec) = cli.calibrate {
        calibrate(usec);
        return;
    }
    if let Some(usec) = cli.test {
        test_busy_wait(usec);
        return;
    }

    let Some(path) = cli.descriptor else {
        error!("No DAG descriptor given");
        process::exit(2);
    };

    let desc = match DagDescriptor::load_from_file(&path) {
        Ok(desc) => desc,
        Err(e) => {
            error!("Failed to load DAG descriptor: {:#}", e);
            eprintln!("rtdag: {e:#}");
            process::exit(1);
        }
    };

    let settings = RunSettings {
        backend: cli.backend,
        expected_wcet_ratio: cli.expected,
        mem_access: cli.mem_access,
        realtime: !cli.no_realtime,
        output_root: cli.output,
        seed: DEFAULT_SEED,
    };
    info!(
        dag = %desc.name,
        backend = %settings.backend,
        expected = settings.expected_wcet_ratio,
        realtime = settings.realtime,
        mem_access = settings.mem_access,
        seed = settings.seed,
        "Configuration"
    );

    let orchestrator = Arc::new(Orchestrator::new(settings, Arc::new(EnvCalibration)));
    let registry = orchestrator.registry().clone();
    let run = tokio::task::spawn_blocking(move || orchestrator.run(&desc));

    tokio::select! {
        joined = run => match joined {
            Ok(Ok(summary)) => {
                info!(
                    dag = %summary.dag,
                    backend = %summary.backend,
                    iterations = summary.iterations,
                    "Run finished"
                );
            }
            Ok(Err(e)) => {
                error!("Run failed: {e}");
                eprintln!("rtdag: {e}");
                process::exit(1);
            }
            Err(e) => {
                error!("Run aborted: {e}");
                process::exit(1);
            }
        },
        _ = tokio::signal::ctrl_c() => {
            let killed = registry.terminate_all();
            warn!(killed, "Interrupted, execution units terminated");
            process::exit(130);
        }
    }
}
