// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Unwind capture backends and their one-shot installation.

pub mod exception;
#[cfg(unix)]
pub mod fault;
pub mod noop;
#[cfg(unix)]
pub(crate) mod signal_handler_manager;

use crate::context::frames::FrameMessage;
use crate::report::sink::mark_start;
use crate::shared::configuration::{store_config, GuardConfiguration};
use std::fmt;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::{AtomicBool, AtomicU8};
use tracing::info;

#[cfg(all(feature = "fault-backend", not(unix)))]
compile_error!("the `fault-backend` feature needs POSIX signals");

/// The backend used by [`guard`](crate::guard), [`init`] and friends.
#[cfg(all(feature = "guard", not(feature = "fault-backend")))]
pub type ActiveBackend = exception::ExceptionBackend;
#[cfg(all(feature = "guard", feature = "fault-backend", unix))]
pub type ActiveBackend = fault::FaultBackend;
#[cfg(not(feature = "guard"))]
pub type ActiveBackend = noop::NoopBackend;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Language-level failures, caught at every guard boundary with `catch_unwind`.
    Exception = 1,
    /// Faults and panics reported in place, from the intact frame stack.
    Fault = 2,
    /// Guarding compiled out.
    Noop = 3,
}

impl BackendKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Exception),
            2 => Some(Self::Fault),
            3 => Some(Self::Noop),
            _ => None,
        }
    }
}

/// One strategy for turning a failure inside guarded regions into a fatal report.
///
/// Both real backends produce byte-identical reports; they differ in how the failure travels
/// from where it happened to where it is reported.
pub trait UnwindBackend {
    const NAME: &'static str;
    const KIND: BackendKind;

    /// Installs the process-wide hooks the backend relies on. Called at most once per process.
    fn install(config: &GuardConfiguration) -> anyhow::Result<()>;

    /// Runs `body` as a guarded region named `name`.
    fn run<T>(name: &'static str, message: Option<&dyn FrameMessage>, body: impl FnOnce() -> T)
        -> T;

    /// Raises a failure from inside a guarded region.
    fn raise(cause: fmt::Arguments<'_>) -> !;
}

static INIT_STARTED: AtomicBool = AtomicBool::new(false);
static INSTALLED: AtomicU8 = AtomicU8::new(0);
static ENABLED: AtomicBool = AtomicBool::new(true);

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("guard backend already initialized")]
    AlreadyInitialized,
    #[error("failed to install the {backend} backend: {source}")]
    Install {
        backend: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Installs the active backend with `config`.
///
/// This function uses a flag to ensure the installation only happens once. Calling it again
/// returns [`InitError::AlreadyInitialized`].
pub fn init(config: GuardConfiguration) -> anyhow::Result<()> {
    init_with::<ActiveBackend>(config)
}

/// Like [`init`], naming the backend explicitly.
pub fn init_with<B: UnwindBackend>(config: GuardConfiguration) -> anyhow::Result<()> {
    if INIT_STARTED
        .compare_exchange(false, true, SeqCst, SeqCst)
        .is_err()
    {
        return Err(InitError::AlreadyInitialized.into());
    }
    mark_start();
    // Hooks read the configuration, so it is published before they go live.
    store_config(config.clone());
    B::install(&config).map_err(|source| InitError::Install {
        backend: B::NAME,
        source,
    })?;
    INSTALLED.store(B::KIND as u8, SeqCst);
    info!(
        backend = B::NAME,
        signals = ?config.signals(),
        termination = ?config.termination(),
        "guard backend installed"
    );
    Ok(())
}

/// The backend installed by [`init`], if any.
pub fn installed() -> Option<BackendKind> {
    BackendKind::from_u8(INSTALLED.load(SeqCst))
}

/// Turns the installed hooks into no-ops: every panic and fault is treated as "not mine" and
/// handed to whatever handler was there before. Guard boundaries themselves keep working.
///
/// # Atomicity
///   This function is atomic and idempotent.  Calling it multiple times is allowed.
pub fn disable() {
    ENABLED.store(false, SeqCst);
}

/// Re-enables the hooks after [`disable`].
///
/// # Atomicity
///   This function is atomic and idempotent.  Calling it multiple times is allowed.
pub fn enable() {
    ENABLED.store(true, SeqCst);
}

pub(crate) fn is_enabled() -> bool {
    ENABLED.load(SeqCst)
}

/// Raises a failure.
///
/// Inside a guarded region the failure travels through the enclosing guards the way the
/// installed backend propagates failures; outside of any, it goes straight to the fatal path.
/// Usually reached through [`raise!`](crate::raise!).
pub fn raise(cause: fmt::Arguments<'_>) -> ! {
    if crate::context::frames::depth() == 0 {
        crate::fatal(cause)
    }
    match installed().unwrap_or(ActiveBackend::KIND) {
        #[cfg(unix)]
        BackendKind::Fault => fault::FaultBackend::raise(cause),
        BackendKind::Noop => noop::NoopBackend::raise(cause),
        _ => exception::ExceptionBackend::raise(cause),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_round_trips_through_the_atomic() {
        for kind in [BackendKind::Exception, BackendKind::Fault, BackendKind::Noop] {
            assert_eq!(BackendKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(BackendKind::from_u8(0), None);
    }

    #[test]
    fn raise_outside_guards_is_fatal() {
        let _lock = crate::test_utils::serial();
        let delivered =
            crate::test_utils::capture_fatal(|| raise(format_args!("no guard here"))).unwrap_err();
        assert_eq!(delivered.text, "no guard here");
        assert_eq!(delivered.path, "<none>");
    }
}
