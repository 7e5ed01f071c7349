// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Support for tests that need a whole process: the guard backends end the process on failure,
//! so the interesting paths can only be observed from the outside.
//!
//! `guard_test_app` takes a backend and a scenario on its command line; the helpers here run it
//! and collect what it left behind.

pub mod test_types;

use std::path::Path;
use std::process::{self, ExitStatus};

pub use test_types::{BackendType, Scenario};

/// How a run of the test app ended.
#[derive(Debug)]
pub struct Outcome {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Outcome {
    /// The signal that killed the process, if any.
    #[cfg(unix)]
    pub fn signal(&self) -> Option<i32> {
        use std::os::unix::process::ExitStatusExt;
        self.status.signal()
    }

    /// The stderr lines of the report, without the uptime line (which varies between runs).
    pub fn report_lines(&self) -> Vec<&str> {
        self.stderr
            .lines()
            .filter(|line| !line.starts_with("uptime: "))
            .collect()
    }
}

/// Runs `app` with the given backend and scenario and waits for it to finish.
pub fn run_app(app: &Path, backend: BackendType, scenario: Scenario) -> anyhow::Result<Outcome> {
    let output = process::Command::new(app)
        .arg(backend.as_str())
        .arg(scenario.as_str())
        .env_remove("RUST_LOG")
        .env_remove("RUST_BACKTRACE")
        .output()?;
    Ok(Outcome {
        status: output.status,
        stdout: String::from_utf8(output.stdout)?,
        stderr: String::from_utf8(output.stderr)?,
    })
}

#[macro_export]
macro_rules! timeit {
    ($op_name:literal, $op:block) => {{
        let start = std::time::Instant::now();
        let res = $op;
        let delta = start.elapsed();
        println!(
            concat!($op_name, " took {} ms"),
            delta.as_secs_f64() * 1000.0
        );
        res
    }};
}
