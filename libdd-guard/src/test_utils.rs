// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers for exercising the fatal path without ending the test process.

use crate::report::sink::{set_report_sink, ReportDelivered};
use crate::report::{FatalReport, Origin};
use crate::ReportSink;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, Once, PoisonError};

/// What a [`TestSink`] received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeliveredReport {
    pub text: String,
    pub path: String,
    pub cause: String,
    pub origin: Origin,
}

/// Unwinds with the report instead of terminating.
struct TestSink;

impl ReportSink for TestSink {
    fn report(&self, report: &FatalReport<'_>) -> ! {
        let delivered = DeliveredReport {
            text: report.text.to_owned(),
            path: report.path.to_owned(),
            cause: report.cause.to_owned(),
            origin: report.origin,
        };
        panic::resume_unwind(Box::new(ReportDelivered(Box::new(delivered))))
    }
}

/// Serialises tests that touch the sink or the error history.
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `f`; a report reaching the sink comes back as `Err`. Other panics keep unwinding.
pub(crate) fn capture_fatal<T>(f: impl FnOnce() -> T) -> Result<T, DeliveredReport> {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| set_report_sink(Box::new(TestSink)));

    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<ReportDelivered>() {
            Ok(delivered) => match delivered.0.downcast::<DeliveredReport>() {
                Ok(delivered) => Err(*delivered),
                Err(payload) => panic::resume_unwind(payload),
            },
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}
