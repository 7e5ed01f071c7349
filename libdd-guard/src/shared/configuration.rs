// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use crate::shared::constants;
use serde::{Deserialize, Serialize};
use std::ptr;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering::SeqCst;

/// How the process ends once a fatal report has been delivered.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationMode {
    /// `_exit(EXIT_FAILURE)`: no destructors, no atexit handlers, no core dump.
    #[default]
    Exit,
    /// `abort()`: raises `SIGABRT`, which usually produces a core dump.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfiguration {
    create_alt_stack: bool,
    // Suppress the default "thread panicked" message for panics raised inside guarded regions;
    // the fatal report already carries the cause.
    quiet_guarded_panics: bool,
    signals: Vec<i32>,
    termination: TerminationMode,
    use_alt_stack: bool,
}

impl GuardConfiguration {
    pub fn new(
        create_alt_stack: bool,
        use_alt_stack: bool,
        mut signals: Vec<i32>,
        termination: TerminationMode,
        quiet_guarded_panics: bool,
    ) -> anyhow::Result<Self> {
        // Requesting to create, but not use, the altstack is considered paradoxical.
        anyhow::ensure!(
            !create_alt_stack || use_alt_stack,
            "Cannot create an altstack without using it"
        );
        if signals.is_empty() {
            signals = constants::default_signals();
        } else {
            // Ensure we don't have double elements in the signals list.
            let before_len = signals.len();
            signals.sort();
            signals.dedup();
            anyhow::ensure!(
                before_len == signals.len(),
                "Signals contained duplicate elements"
            );
            // Only fault signals can be filtered by a guarded region.
            signals
                .iter()
                .try_for_each(|x| constants::check_fault_signal(*x))?;
        }

        Ok(Self {
            create_alt_stack,
            quiet_guarded_panics,
            signals,
            termination,
            use_alt_stack,
        })
    }

    pub fn create_alt_stack(&self) -> bool {
        self.create_alt_stack
    }

    pub fn quiet_guarded_panics(&self) -> bool {
        self.quiet_guarded_panics
    }

    pub fn signals(&self) -> &Vec<i32> {
        &self.signals
    }

    pub fn termination(&self) -> TerminationMode {
        self.termination
    }

    pub fn use_alt_stack(&self) -> bool {
        self.use_alt_stack
    }
}

impl Default for GuardConfiguration {
    fn default() -> Self {
        Self {
            create_alt_stack: false,
            quiet_guarded_panics: true,
            signals: constants::default_signals(),
            termination: TerminationMode::default(),
            use_alt_stack: true,
        }
    }
}

// Read from the fatal path and from signal handlers, so no locks. Always null or
// `Box::into_raw()`; a stored configuration is never freed because a handler on another thread
// may be reading it.
static CONFIG: AtomicPtr<GuardConfiguration> = AtomicPtr::new(ptr::null_mut());

/// Publishes `config` for the hooks. Any previous configuration is leaked.
pub(crate) fn store_config(config: GuardConfiguration) {
    CONFIG.swap(Box::into_raw(Box::new(config)), SeqCst);
}

pub(crate) fn current_config() -> Option<&'static GuardConfiguration> {
    let config = CONFIG.load(SeqCst);
    // SAFETY: non-null values come from `Box::into_raw` in `store_config` and are never freed.
    unsafe { config.as_ref() }
}

pub(crate) fn termination_mode() -> TerminationMode {
    current_config()
        .map(GuardConfiguration::termination)
        .unwrap_or_default()
}

pub(crate) fn quiet_guarded_panics() -> bool {
    current_config().map_or(true, GuardConfiguration::quiet_guarded_panics)
}
