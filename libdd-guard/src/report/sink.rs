// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::FatalReport;
use crate::context::history::FixedBuf;
use std::any::Any;
use std::fmt::Write;
use std::ptr;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::OnceLock;
use std::time::Instant;

/// Receives the completed report at the end of the fatal path.
///
/// `report` may run inside a signal handler, on an alternate stack, with other threads still
/// running. Implementations should stick to async-signal-safe operations and must not return:
/// ending the process (usually via the configured termination mode) is their job.
pub trait ReportSink: Send + Sync {
    fn report(&self, report: &FatalReport<'_>) -> !;
}

/// Unwind payload for a [`ReportSink`] that hands control back instead of ending the process,
/// e.g. one used by a test harness. Guard boundaries let it through untouched. A sink unwinding
/// with any other payload counts as a failure of the fatal path.
pub struct ReportDelivered(pub Box<dyn Any + Send>);

/// Writes the report to stderr with raw `write(2)` calls, then terminates.
///
/// ```text
/// fatal error: A: B: C: divide by zero
/// call path: A/B/C
/// uptime: 1532 ms
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl ReportSink for StderrSink {
    fn report(&self, report: &FatalReport<'_>) -> ! {
        let mut uptime = FixedBuf::<32>::new();
        let _ = write!(uptime, "{}", uptime_ms());

        // Piecewise, so no buffer larger than the report itself lives on a possibly small stack.
        for part in [
            "fatal error: ",
            report.text,
            "\ncall path: ",
            report.path,
            "\nuptime: ",
            uptime.as_str(),
            " ms\n",
        ] {
            write_stderr(part);
        }
        super::fatal::terminate()
    }
}

static START: OnceLock<Instant> = OnceLock::new();

/// Starts the uptime clock reported by [`StderrSink`]. Later calls have no effect.
pub(crate) fn mark_start() {
    START.get_or_init(Instant::now);
}

fn uptime_ms() -> u128 {
    START.get().map_or(0, |start| start.elapsed().as_millis())
}

/// Best-effort write to fd 2. Partial writes are continued; errors are dropped.
#[cfg(unix)]
pub(crate) fn write_stderr(s: &str) {
    let mut bytes = s.as_bytes();
    while !bytes.is_empty() {
        // SAFETY: the pointer and length describe a live byte slice.
        let written =
            unsafe { libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len()) };
        match written {
            n if n > 0 => bytes = &bytes[n as usize..],
            -1 if std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted => {}
            _ => return,
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn write_stderr(s: &str) {
    use std::io::Write as _;
    let _ = std::io::stderr().write_all(s.as_bytes());
}

// Either null or `Box::into_raw()`. Replaced sinks are leaked: a report in progress on another
// thread may still hold a reference.
static SINK: AtomicPtr<Box<dyn ReportSink>> = AtomicPtr::new(ptr::null_mut());

/// Replaces the sink that receives fatal reports. The default is [`StderrSink`].
pub fn set_report_sink(sink: Box<dyn ReportSink>) {
    mark_start();
    SINK.swap(Box::into_raw(Box::new(sink)), SeqCst);
}

pub(crate) fn current_sink() -> &'static dyn ReportSink {
    let sink = SINK.load(SeqCst);
    // SAFETY: non-null values come from `Box::into_raw` in `set_report_sink` and are never freed.
    match unsafe { sink.as_ref() } {
        Some(sink) => sink.as_ref(),
        None => &StderrSink,
    }
}
