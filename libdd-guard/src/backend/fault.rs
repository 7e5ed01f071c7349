// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! OS-fault backend.
//!
//! Nothing is caught at guard boundaries. Instead, the signal handler and the panic hook act as
//! a filter that runs while the failing frames are still live: if the failure belongs to us,
//! the report is built straight from this thread's frame stack and the process ends there.
//! Failures that are "not mine" continue to whatever handler was installed before.

use super::signal_handler_manager::register_fault_handlers;
use super::{installed, is_enabled, BackendKind, UnwindBackend};
use crate::context::frames::{self, FrameMessage};
use crate::context::history::{FixedBuf, ERROR_HISTORY_CAPACITY};
use crate::panic_hook::register_panic_hook;
use crate::report::{fatal, Origin};
use crate::shared::configuration::{current_config, GuardConfiguration};
use std::fmt::{self, Write};

pub struct FaultBackend;

impl UnwindBackend for FaultBackend {
    const NAME: &'static str = "fault";
    const KIND: BackendKind = BackendKind::Fault;

    fn install(config: &GuardConfiguration) -> anyhow::Result<()> {
        register_panic_hook()?;
        register_fault_handlers(config)
    }

    #[inline]
    fn run<T>(
        name: &'static str,
        message: Option<&dyn FrameMessage>,
        body: impl FnOnce() -> T,
    ) -> T {
        let _frame = frames::push_with_message(name, message);
        body()
    }

    fn raise(cause: fmt::Arguments<'_>) -> ! {
        let mut text = FixedBuf::<ERROR_HISTORY_CAPACITY>::new();
        let _ = text.write_fmt(cause);
        fatal::report_frames(text.as_str(), Origin::Panic)
    }
}

/// Whether a panic on this thread is ours to report.
pub(crate) fn owns_panic() -> bool {
    is_enabled() && installed() == Some(BackendKind::Fault) && frames::depth() > 0
}

/// Whether a fault delivered as `signum` on this thread is ours to report.
pub(crate) fn owns_fault(signum: libc::c_int) -> bool {
    owns_panic()
        && current_config().is_some_and(|config| config.signals().contains(&signum))
}
