// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The fatal error path: render, record in the error history, hand to the sink, terminate.
//!
//! Nothing in here allocates or takes a lock that could be held by an interrupted thread, so the
//! same path serves panics, `fatal!`, and faults caught in a signal handler.

use super::atomguard::AtomGuard;
use super::sink::{current_sink, write_stderr, ReportDelivered};
use super::{CapturedReport, Origin, ReportBuilder};
use crate::context::frames::visit_innermost_first;
use crate::context::history::{FixedBuf, ERROR_HISTORY, ERROR_HISTORY_CAPACITY};
use crate::shared::configuration::{termination_mode, TerminationMode};
use std::cell::Cell;
use std::fmt::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::AtomicU64;
use std::time::Duration;

pub(crate) const NESTED_FATAL_MESSAGE: &str = "fatal error while reporting a fatal error\n";

static REPORTING: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static IN_REPORT: Cell<bool> = const { Cell::new(false) };
}

/// Held for the duration of one report. Only one thread reports at a time.
struct ReportScope {
    _guard: AtomGuard<'static>,
}

impl Drop for ReportScope {
    fn drop(&mut self) {
        let _ = IN_REPORT.try_with(|flag| flag.set(false));
    }
}

/// True while the current thread is producing a report.
pub(crate) fn is_reporting() -> bool {
    IN_REPORT.try_with(Cell::get).unwrap_or(true)
}

fn enter_report() -> ReportScope {
    if is_reporting() {
        fail_minimal()
    }
    loop {
        match AtomGuard::new(&REPORTING) {
            Ok(guard) => {
                let _ = IN_REPORT.try_with(|flag| flag.set(true));
                return ReportScope { _guard: guard };
            }
            // Another thread is reporting and will end the process; `nanosleep` is
            // async-signal-safe.
            Err(_) => std::thread::sleep(Duration::from_millis(1)),
        }
    }
}

/// Used when the fatal path itself fails: no formatting, no sink.
pub(crate) fn fail_minimal() -> ! {
    write_stderr(NESTED_FATAL_MESSAGE);
    terminate()
}

/// The Fatal Error Path.
///
/// Records the message, prefixed with the frames active on the calling thread, in the error
/// history buffer and hands the report to the [`ReportSink`](crate::ReportSink). Never returns.
/// Usually reached through [`fatal!`](crate::fatal!).
pub fn fatal(args: fmt::Arguments<'_>) -> ! {
    let _scope = enter_report();
    let mut cause = FixedBuf::<ERROR_HISTORY_CAPACITY>::new();
    let _ = cause.write_fmt(args);
    deliver_frames(cause.as_str(), Origin::Fatal)
}

/// Reports `cause` under the frames currently on this thread's stack.
pub(crate) fn report_frames(cause: &str, origin: Origin) -> ! {
    let _scope = enter_report();
    deliver_frames(cause, origin)
}

/// Reports a failure that carried its own path out to the outermost guard.
pub(crate) fn report(captured: &CapturedReport, origin: Origin) -> ! {
    let _scope = enter_report();
    deliver(&captured.builder(), origin)
}

fn deliver_frames(cause: &str, origin: Origin) -> ! {
    let mut builder = ReportBuilder::new(cause);
    visit_innermost_first(|frame| builder.prepend_frame(frame));
    deliver(&builder, origin)
}

fn deliver(builder: &ReportBuilder<'_>, origin: Origin) -> ! {
    // A busy history buffer is skipped rather than waited on; the sink still gets the report.
    ERROR_HISTORY.store(builder.text());
    let report = builder.finish(origin);
    let sink = current_sink();
    match panic::catch_unwind(AssertUnwindSafe(|| -> () { sink.report(&report) })) {
        Err(payload) if payload.is::<ReportDelivered>() => panic::resume_unwind(payload),
        // The sink panicked.
        _ => fail_minimal(),
    }
}

/// Ends the process according to the configured [`TerminationMode`].
pub fn terminate() -> ! {
    match termination_mode() {
        TerminationMode::Exit => exit_failure(),
        TerminationMode::Abort => abort(),
    }
}

#[cfg(unix)]
fn exit_failure() -> ! {
    // Safety: No preconditions
    unsafe { libc::_exit(libc::EXIT_FAILURE) }
}

#[cfg(unix)]
fn abort() -> ! {
    // A SIGABRT handler of our own must not see this as a new fault.
    // Safety: resetting a disposition has no preconditions.
    unsafe { libc::signal(libc::SIGABRT, libc::SIG_DFL) };
    // Safety: No preconditions
    unsafe { libc::abort() }
}

#[cfg(not(unix))]
fn exit_failure() -> ! {
    std::process::exit(1)
}

#[cfg(not(unix))]
fn abort() -> ! {
    std::process::abort()
}
