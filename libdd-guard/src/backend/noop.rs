// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{BackendKind, UnwindBackend};
use crate::context::frames::FrameMessage;
use crate::shared::configuration::GuardConfiguration;
use std::fmt;

/// Guarding compiled out: bodies run directly, nothing is pushed and failures take the host's
/// default path.
pub struct NoopBackend;

impl UnwindBackend for NoopBackend {
    const NAME: &'static str = "noop";
    const KIND: BackendKind = BackendKind::Noop;

    fn install(_config: &GuardConfiguration) -> anyhow::Result<()> {
        Ok(())
    }

    #[inline(always)]
    fn run<T>(
        _name: &'static str,
        _message: Option<&dyn FrameMessage>,
        body: impl FnOnce() -> T,
    ) -> T {
        body()
    }

    #[allow(clippy::panic)]
    fn raise(cause: fmt::Arguments<'_>) -> ! {
        panic!("{cause}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::frames;

    #[test]
    fn bodies_run_without_frames() {
        let depth = NoopBackend::run("Skipped", None, frames::depth);
        assert_eq!(depth, 0);
    }

    #[test]
    fn failures_are_ordinary_panics() {
        let result = std::panic::catch_unwind(|| -> () {
            NoopBackend::run("Skipped", None, || NoopBackend::raise(format_args!("plain")))
        });
        let payload = result.unwrap_err();
        assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("plain"));
    }
}
