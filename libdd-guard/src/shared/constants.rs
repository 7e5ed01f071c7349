// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Signal sets understood by the fault backend.

/// Signals a guarded region may claim: synchronous faults raised by the faulting instruction
/// itself, plus `SIGABRT`, `SIGTRAP` and `SIGSYS` which are commonly raised the same way.
#[cfg(unix)]
pub const FAULT_SIGNALS: &[libc::c_int] = &[
    libc::SIGABRT,
    libc::SIGBUS,
    libc::SIGFPE,
    libc::SIGILL,
    libc::SIGSEGV,
    libc::SIGSYS,
    libc::SIGTRAP,
];

#[cfg(not(unix))]
pub const FAULT_SIGNALS: &[i32] = &[];

/// Signals claimed when the configuration does not name any.
pub fn default_signals() -> Vec<i32> {
    #[cfg(unix)]
    {
        vec![libc::SIGBUS, libc::SIGFPE, libc::SIGILL, libc::SIGSEGV]
    }
    #[cfg(not(unix))]
    {
        vec![]
    }
}

pub(crate) fn check_fault_signal(signum: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        FAULT_SIGNALS.contains(&signum),
        "Signal {signum} is not a fault signal"
    );
    Ok(())
}
