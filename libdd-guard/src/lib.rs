// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Guarded regions for last-resort diagnostics.
//!
//! Code wrapped in a guarded region pushes a named frame on a per-thread stack. If a failure
//! (a panic, [`raise!`], [`guard_assert!`] or, with the fault backend, a hardware fault such as
//! SIGSEGV) happens anywhere inside, the process is terminated with a single report naming every
//! active region, outermost first:
//!
//! ```text
//! fatal error: A: B: C: divide by zero
//! call path: A/B/C
//! uptime: 12 ms
//! ```
//!
//! Two backends produce that report:
//! - [`ExceptionBackend`] (default) catches the failure at every guard boundary and re-raises it
//!   with the boundary's name prepended.
//! - [`FaultBackend`] (feature `fault-backend`, unix only) reports from a signal handler or the
//!   panic hook, while the failing frames are still on the stack. It is the only one that can
//!   report hardware faults.
//!
//! Without the default `guard` feature, guarded regions compile down to a plain call.
//!
//! ```no_run
//! use libdd_guard::{guard, raise, GuardConfiguration};
//!
//! fn divide(a: i32, b: i32) -> i32 {
//!     guard!("divide" => {
//!         match a.checked_div(b) {
//!             Some(q) => q,
//!             None => raise!("divide by zero"),
//!         }
//!     })
//! }
//!
//! libdd_guard::init(GuardConfiguration::default())?;
//! divide(1, 0);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod backend;
mod context;
mod macros;
mod panic_hook;
mod report;
mod shared;

#[cfg(test)]
mod test_utils;

pub use backend::exception::ExceptionBackend;
#[cfg(unix)]
pub use backend::fault::FaultBackend;
pub use backend::noop::NoopBackend;
pub use backend::{
    disable, enable, init, init_with, installed, raise, ActiveBackend, BackendKind, InitError,
    UnwindBackend,
};
pub use context::frames::{self, FrameMessage, MAX_GUARD_DEPTH};
pub use context::history::{last_report, ERROR_HISTORY_CAPACITY};
pub use report::fatal::{fatal, terminate};
pub use report::sink::{set_report_sink, ReportDelivered, ReportSink, StderrSink};
pub use report::{
    CapturedReport, FatalReport, Origin, Segment, ELIDED_SEGMENT, EMPTY_PATH, MESSAGE_FAILED,
    PATH_SEPARATOR, SEGMENT_SEPARATOR,
};
pub use shared::configuration::{GuardConfiguration, TerminationMode};
pub use shared::constants::{default_signals, FAULT_SIGNALS};
#[cfg(unix)]
pub use shared::sig_info::{code_name, signal_name};

/// Runs `body` as a guarded region named `name`, using the [`ActiveBackend`].
#[inline]
pub fn guard<T>(name: &'static str, body: impl FnOnce() -> T) -> T {
    guard_in::<ActiveBackend, T>(name, body)
}

/// Like [`guard`], with a message added to the frame's segment of a report
/// (`name (message)`). The message is only formatted if a failure is captured.
#[inline]
pub fn guardf<T>(
    name: &'static str,
    message: impl FrameMessage,
    body: impl FnOnce() -> T,
) -> T {
    guardf_in::<ActiveBackend, T>(name, message, body)
}

/// [`guard`] with an explicit backend.
#[inline]
pub fn guard_in<B: UnwindBackend, T>(name: &'static str, body: impl FnOnce() -> T) -> T {
    B::run(name, None, body)
}

/// [`guardf`] with an explicit backend.
#[inline]
pub fn guardf_in<B: UnwindBackend, T>(
    name: &'static str,
    message: impl FrameMessage,
    body: impl FnOnce() -> T,
) -> T {
    B::run(name, Some(&message), body)
}

#[doc(hidden)]
pub mod __private {
    pub fn type_name_of<T>(_: T) -> &'static str {
        std::any::type_name::<T>()
    }

    /// Turns the type name of a function item declared inside a function into that function's
    /// name.
    pub fn function_name(type_name: &'static str) -> &'static str {
        let name = type_name.strip_suffix("::f").unwrap_or(type_name);
        let name = name.trim_end_matches("::{{closure}}");
        if cfg!(feature = "full-function-names") {
            return name;
        }
        match name.rfind("::") {
            Some(pos) => &name[pos + 2..],
            None => name,
        }
    }
}
