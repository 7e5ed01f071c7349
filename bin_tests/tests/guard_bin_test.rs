// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(unix)]

use std::path::Path;

use bin_tests::{run_app, BackendType, Outcome, Scenario};

fn app() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_guard_test_app"))
}

fn run(backend: BackendType, scenario: Scenario) -> Outcome {
    bin_tests::timeit!("guard_test_app", {
        run_app(app(), backend, scenario).unwrap()
    })
}

fn assert_reported(outcome: &Outcome, text: &str, path: &str) {
    assert_eq!(outcome.status.code(), Some(1), "{outcome:?}");
    assert_eq!(
        outcome.report_lines(),
        [format!("fatal error: {text}"), format!("call path: {path}")],
        "{outcome:?}"
    );
    let uptime = outcome
        .stderr
        .lines()
        .find_map(|line| line.strip_prefix("uptime: "))
        .and_then(|rest| rest.strip_suffix(" ms"));
    assert!(
        uptime.is_some_and(|ms| ms.parse::<u64>().is_ok()),
        "{outcome:?}"
    );
}

fn assert_killed_by(outcome: &Outcome, signum: i32) {
    assert_eq!(outcome.signal(), Some(signum), "{outcome:?}");
    assert!(!outcome.stderr.contains("fatal error"), "{outcome:?}");
}

#[test]
#[cfg_attr(miri, ignore)]
fn nested_success_reports_nothing() {
    for backend in BackendType::all() {
        let outcome = run(*backend, Scenario::NestedOk);
        assert!(outcome.status.success(), "{outcome:?}");
        assert_eq!(outcome.stdout, "result 2, last report \"\"\n");
        assert_eq!(outcome.stderr, "");
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn raised_failure_lists_every_frame() {
    for backend in BackendType::all() {
        let outcome = run(*backend, Scenario::IntegerDivide);
        assert_reported(&outcome, "A: B: C: divide by zero", "A/B/C");
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn panics_are_reported_once() {
    for backend in BackendType::all() {
        let outcome = run(*backend, Scenario::PanicDivide);
        // The default "thread panicked" message is suppressed inside guarded regions.
        assert_reported(&outcome, "A: B: C: attempt to divide by zero", "A/B/C");
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn backends_produce_identical_reports() {
    for scenario in [
        Scenario::IntegerDivide,
        Scenario::PanicDivide,
        Scenario::Recursion,
        Scenario::Message,
        Scenario::AssertUnguarded,
        Scenario::Thread,
    ] {
        let exception = run(BackendType::Exception, scenario);
        let fault = run(BackendType::Fault, scenario);
        assert_eq!(
            exception.report_lines(),
            fault.report_lines(),
            "{scenario}: {exception:?} vs {fault:?}"
        );
        assert_eq!(exception.status.code(), fault.status.code(), "{scenario}");
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn recursion_repeats_the_frame() {
    let outcome = run(BackendType::Exception, Scenario::Recursion);
    assert_reported(
        &outcome,
        "Recurse: Recurse: Recurse: divide by zero",
        "Recurse/Recurse/Recurse",
    );
}

#[test]
#[cfg_attr(miri, ignore)]
fn frame_messages_are_included() {
    let outcome = run(BackendType::Fault, Scenario::Message);
    assert_reported(
        &outcome,
        "LoadPackage (file=maps/e1m1.pak): Parse: corrupt header",
        "LoadPackage/Parse",
    );
}

#[test]
#[cfg_attr(miri, ignore)]
fn unguarded_assertion_has_no_path() {
    let outcome = run(BackendType::Exception, Scenario::AssertUnguarded);
    assert_reported(&outcome, "assertion failed: x > 0", "<none>");
}

#[test]
#[cfg_attr(miri, ignore)]
fn worker_failure_reports_only_the_worker_frames() {
    let outcome = run(BackendType::Fault, Scenario::Thread);
    assert_reported(&outcome, "Worker: divide by zero", "Worker");
}

#[test]
#[cfg_attr(miri, ignore)]
fn fault_backend_reports_null_dereference() {
    let outcome = run(BackendType::Fault, Scenario::NullDeref);
    assert_eq!(outcome.status.code(), Some(1), "{outcome:?}");
    let lines = outcome.report_lines();
    let expected = if cfg!(any(target_arch = "x86_64", target_arch = "aarch64")) {
        "fatal error: A: B: C: SIGSEGV (SEGV_MAPERR) at 0x0"
    } else {
        "fatal error: A: B: C: SIGSEGV (SI_TKILL)"
    };
    assert_eq!(lines, [expected, "call path: A/B/C"], "{outcome:?}");
}

#[test]
#[cfg_attr(miri, ignore)]
fn fault_backend_reports_hardware_divide() {
    let outcome = run(BackendType::Fault, Scenario::HardwareDivide);
    assert_eq!(outcome.status.code(), Some(1), "{outcome:?}");
    let lines = outcome.report_lines();
    assert!(
        lines[0].starts_with("fatal error: A: B: C: SIGFPE ("),
        "{outcome:?}"
    );
    if cfg!(target_arch = "x86_64") {
        assert!(lines[0].contains("(FPE_INTDIV) at 0x"), "{outcome:?}");
    }
    assert_eq!(lines[1], "call path: A/B/C");
}

#[test]
#[cfg_attr(miri, ignore)]
fn exception_backend_leaves_faults_to_the_os() {
    assert_killed_by(
        &run(BackendType::Exception, Scenario::NullDeref),
        libc::SIGSEGV,
    );
    assert_killed_by(
        &run(BackendType::Exception, Scenario::HardwareDivide),
        libc::SIGFPE,
    );
}

#[test]
#[cfg_attr(miri, ignore)]
fn faults_that_are_not_ours_keep_propagating() {
    // Outside of any guarded region.
    assert_killed_by(
        &run(BackendType::Fault, Scenario::NullDerefUnguarded),
        libc::SIGSEGV,
    );
    // Inside one, with the hooks disabled.
    assert_killed_by(
        &run(BackendType::Fault, Scenario::NullDerefDisabled),
        libc::SIGSEGV,
    );
}

#[test]
#[cfg_attr(miri, ignore)]
fn faults_that_are_not_ours_reach_the_previous_handler() {
    for scenario in [Scenario::ChainedSigaction, Scenario::ChainedHandler] {
        let outcome = run(BackendType::Fault, scenario);
        assert_eq!(outcome.status.code(), Some(3), "{scenario}: {outcome:?}");
        assert_eq!(
            outcome.stderr, "previous SIGSEGV handler ran\n",
            "{scenario}: {outcome:?}"
        );
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn failing_sink_degrades_to_a_minimal_message() {
    for (backend, scenario) in BackendType::all()
        .iter()
        .flat_map(|backend| [(*backend, Scenario::FatalInSink), (*backend, Scenario::PanicInSink)])
    {
        let outcome = run(backend, scenario);
        assert_eq!(outcome.status.code(), Some(1), "{outcome:?}");
        assert_eq!(
            outcome.stderr, "fatal error while reporting a fatal error\n",
            "{backend} {scenario}: {outcome:?}"
        );
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn abort_mode_reports_then_aborts() {
    for backend in BackendType::all() {
        let outcome = run(*backend, Scenario::AbortMode);
        assert_eq!(outcome.signal(), Some(libc::SIGABRT), "{outcome:?}");
        assert_eq!(
            outcome.report_lines(),
            ["fatal error: A: B: C: divide by zero", "call path: A/B/C"],
            "{outcome:?}"
        );
    }
}
