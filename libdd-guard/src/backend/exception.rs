// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Panic-unwind backend.
//!
//! Every guard boundary wraps its body in `catch_unwind`. A failure escaping the body is turned
//! into a [`CapturedReport`], the boundary's own segment is prepended, and the report is
//! re-raised with `resume_unwind` (which skips the panic hook) until the outermost guard hands
//! it to the fatal path.

use super::{BackendKind, UnwindBackend};
use crate::context::frames::{self, FrameMessage, FrameRef};
use crate::panic_hook::{payload_text, register_panic_hook};
use crate::report::sink::ReportDelivered;
use crate::report::{fatal, CapturedReport, Origin, Segment, ELIDED_SEGMENT};
use crate::shared::configuration::GuardConfiguration;
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

thread_local! {
    // Guard boundaries of this backend currently on the thread's stack. Differs from the frame
    // depth when frames were pushed directly with `frames::push`.
    static ACTIVE_GUARDS: Cell<usize> = const { Cell::new(0) };
}

/// The in-flight payload carried between guard boundaries.
pub(crate) struct Unwind(pub(crate) CapturedReport);

pub struct ExceptionBackend;

impl UnwindBackend for ExceptionBackend {
    const NAME: &'static str = "exception";
    const KIND: BackendKind = BackendKind::Exception;

    fn install(_config: &GuardConfiguration) -> anyhow::Result<()> {
        register_panic_hook()
    }

    fn run<T>(
        name: &'static str,
        message: Option<&dyn FrameMessage>,
        body: impl FnOnce() -> T,
    ) -> T {
        let frame = frames::push_with_message(name, message);
        let _active = ActiveGuard::enter();
        let payload = match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(value) => return value,
            Err(payload) => payload,
        };

        let mut captured = match into_captured(payload) {
            Ok(captured) => captured,
            Err(payload) => panic::resume_unwind(payload),
        };
        captured.prepend(Segment::capture(name, message));
        drop(frame);
        debug!(
            frame = name,
            depth = frames::depth(),
            cause = %captured.cause,
            "failure captured at guard boundary"
        );

        if guards_active() > 1 {
            panic::resume_unwind(Box::new(Unwind(captured)))
        }
        // Outermost guard: frames pushed outside any guard still belong in the path.
        frames::visit_innermost_first(|frame| match frame {
            FrameRef::Entry(entry) => captured.prepend(Segment::capture(entry.name, entry.message())),
            FrameRef::Elided(_) => captured.prepend(Segment::new(ELIDED_SEGMENT)),
        });
        fatal::report(&captured, Origin::Panic)
    }

    fn raise(cause: fmt::Arguments<'_>) -> ! {
        if cfg!(panic = "abort") || guards_active() == 0 {
            // Nothing will catch an unwind; report from the frame stack instead.
            crate::fatal(cause)
        }
        panic::resume_unwind(Box::new(Unwind(CapturedReport::new(cause.to_string()))))
    }
}

struct ActiveGuard;

impl ActiveGuard {
    fn enter() -> Self {
        ACTIVE_GUARDS.with(|count| count.set(count.get() + 1));
        ActiveGuard
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let _ = ACTIVE_GUARDS.try_with(|count| count.set(count.get().saturating_sub(1)));
    }
}

/// Number of exception-backend guards active on this thread.
pub(crate) fn guards_active() -> usize {
    ACTIVE_GUARDS.try_with(Cell::get).unwrap_or(0)
}

/// Interprets a payload caught at a guard boundary. Payloads that are not failures of guarded
/// code come back as `Err` and keep unwinding untouched.
fn into_captured(payload: Box<dyn Any + Send>) -> Result<CapturedReport, Box<dyn Any + Send>> {
    // Already reported; the sink chose to unwind rather than terminate.
    if payload.is::<ReportDelivered>() {
        return Err(payload);
    }
    match payload.downcast::<Unwind>() {
        Ok(unwind) => Ok(unwind.0),
        Err(payload) => Ok(CapturedReport::new(payload_text(payload.as_ref()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{capture_fatal, serial};

    type Exc = ExceptionBackend;

    fn checked_divide(a: i32, b: i32) -> i32 {
        match a.checked_div(b) {
            Some(q) => q,
            None => Exc::raise(format_args!("divide by zero")),
        }
    }

    #[test]
    fn nested_failure_lists_every_frame() {
        let _lock = serial();
        let delivered = capture_fatal(|| {
            Exc::run("A", None, || {
                Exc::run("B", None, || Exc::run("C", None, || checked_divide(1, 0)))
            })
        })
        .unwrap_err();
        assert_eq!(delivered.text, "A: B: C: divide by zero");
        assert_eq!(delivered.path, "A/B/C");
        assert_eq!(delivered.cause, "divide by zero");
        assert_eq!(delivered.origin, Origin::Panic);
        assert_eq!(
            crate::last_report().as_deref(),
            Some("A: B: C: divide by zero")
        );
        assert_eq!(frames::depth(), 0);
        assert_eq!(guards_active(), 0);
    }

    #[test]
    fn normal_completion_leaves_no_trace() {
        let _lock = serial();
        crate::context::history::ERROR_HISTORY.clear();
        let value = capture_fatal(|| {
            Exc::run("Outer", None, || Exc::run("Inner", None, || checked_divide(6, 3)) + 1)
        });
        assert_eq!(value.ok(), Some(3));
        assert_eq!(frames::depth(), 0);
        assert_eq!(crate::last_report().as_deref(), Some(""));
    }

    #[test]
    fn panics_become_the_cause() {
        let _lock = serial();
        let delivered = capture_fatal(|| {
            Exc::run("Worker", None, || -> () { panic!("queue {} overflowed", 7) })
        })
        .unwrap_err();
        assert_eq!(delivered.text, "Worker: queue 7 overflowed");
    }

    #[test]
    fn recursion_repeats_the_frame() {
        fn recurse(levels: u32) -> u32 {
            Exc::run("Recurse", None, || {
                if levels == 0 {
                    Exc::raise(format_args!("bottom"))
                }
                recurse(levels - 1)
            })
        }
        let _lock = serial();
        let delivered = capture_fatal(|| recurse(2)).unwrap_err();
        assert_eq!(delivered.path, "Recurse/Recurse/Recurse");
        assert_eq!(delivered.text, "Recurse: Recurse: Recurse: bottom");
    }

    #[test]
    fn frame_messages_are_formatted_on_capture() {
        let _lock = serial();
        let file = "maps/e1m1.pak";
        let message = |w: &mut dyn fmt::Write| write!(w, "file={file}");
        let delivered = capture_fatal(|| {
            Exc::run("LoadPackage", Some(&message), || -> () {
                Exc::raise(format_args!("corrupt header"))
            })
        })
        .unwrap_err();
        assert_eq!(delivered.text, "LoadPackage (file=maps/e1m1.pak): corrupt header");
        assert_eq!(delivered.path, "LoadPackage");
    }

    fn exploding_message(w: &mut dyn fmt::Write) -> fmt::Result {
        let _ = w.write_str("partial");
        panic!("formatter exploded")
    }

    #[test]
    fn panicking_message_keeps_the_inner_report() {
        let _lock = serial();
        let delivered = capture_fatal(|| {
            Exc::run("Outer", None, || {
                Exc::run("Inner", Some(&exploding_message), || checked_divide(1, 0))
            })
        })
        .unwrap_err();
        assert_eq!(delivered.text, "Outer: Inner (<message failed>): divide by zero");
        assert_eq!(delivered.path, "Outer/Inner");
        assert_eq!(delivered.cause, "divide by zero");
    }

    #[test]
    fn panicking_message_at_the_outermost_guard_still_reports() {
        let _lock = serial();
        let delivered = capture_fatal(|| {
            Exc::run("Outer", Some(&exploding_message), || {
                Exc::run("Inner", None, || checked_divide(1, 0))
            })
        })
        .unwrap_err();
        assert_eq!(delivered.text, "Outer (<message failed>): Inner: divide by zero");
        assert_eq!(delivered.path, "Outer/Inner");
        assert_eq!(frames::depth(), 0);
        assert_eq!(guards_active(), 0);
    }

    #[test]
    fn plain_frames_outside_guards_are_included() {
        let _lock = serial();
        let delivered = capture_fatal(|| {
            let _outer = frames::push("Main");
            Exc::run("Step", None, || -> () { Exc::raise(format_args!("boom")) })
        })
        .unwrap_err();
        assert_eq!(delivered.text, "Main: Step: boom");
        assert_eq!(delivered.path, "Main/Step");
    }

    #[test]
    fn delivered_reports_pass_through_guards() {
        let result = panic::catch_unwind(|| {
            Exc::run("A", None, || {
                Exc::run("B", None, || -> () {
                    panic::resume_unwind(Box::new(ReportDelivered(Box::new(7_u8))))
                })
            })
        });
        let payload = result.unwrap_err().downcast::<ReportDelivered>().unwrap();
        assert_eq!(payload.0.downcast_ref::<u8>(), Some(&7));
        assert_eq!(frames::depth(), 0);
        assert_eq!(guards_active(), 0);
    }

    #[test]
    fn unknown_payloads_are_named() {
        let _lock = serial();
        let delivered = capture_fatal(|| {
            Exc::run("Odd", None, || -> () { panic::resume_unwind(Box::new(42_u8)) })
        })
        .unwrap_err();
        assert_eq!(delivered.text, "Odd: unknown panic payload");
    }
}
