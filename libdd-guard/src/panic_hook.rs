// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::backend::{exception, installed, is_enabled, BackendKind};
use crate::context::frames;
use crate::report::{fatal, Origin};
use crate::shared::configuration::quiet_guarded_panics;
use std::any::Any;
use std::panic::{self, PanicHookInfo};
use std::ptr;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering::SeqCst;

pub(crate) const UNKNOWN_PAYLOAD: &str = "unknown panic payload";

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync>;
static PREVIOUS_PANIC_HOOK: AtomicPtr<PanicHook> = AtomicPtr::new(ptr::null_mut());

/// The message carried by a panic payload.
pub(crate) fn payload_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        UNKNOWN_PAYLOAD
    }
}

/// Register the panic hook.
///
/// The previous hook is kept and called for every panic the guard machinery does not claim.
/// Registering twice is a no-op.
pub(crate) fn register_panic_hook() -> anyhow::Result<()> {
    if !PREVIOUS_PANIC_HOOK.load(SeqCst).is_null() {
        return Ok(());
    }

    let old_hook = panic::take_hook();
    let old_hook_ptr = Box::into_raw(Box::new(old_hook));
    PREVIOUS_PANIC_HOOK.swap(old_hook_ptr, SeqCst);
    panic::set_hook(Box::new(guard_panic_hook));
    Ok(())
}

fn guard_panic_hook(panic_info: &PanicHookInfo<'_>) {
    if is_enabled() {
        match installed() {
            // Runs before any unwinding, with the frame stack intact: report right here.
            #[cfg(unix)]
            Some(BackendKind::Fault) if crate::backend::fault::owns_panic() => {
                fatal::report_frames(payload_text(panic_info.payload()), Origin::Panic)
            }
            Some(BackendKind::Exception) if exception::guards_active() > 0 => {
                // Without unwinding no guard boundary would ever see the failure.
                if cfg!(panic = "abort") {
                    fatal::report_frames(payload_text(panic_info.payload()), Origin::Panic)
                }
                // The guards will report it; the default message would only duplicate it.
                if quiet_guarded_panics() {
                    return;
                }
            }
            _ => {}
        }
    }
    call_previous_panic_hook(panic_info);
}

fn call_previous_panic_hook(panic_info: &PanicHookInfo<'_>) {
    let old_hook_ptr = PREVIOUS_PANIC_HOOK.load(SeqCst);
    if !old_hook_ptr.is_null() {
        // Safety: This pointer can only come from Box::into_raw above in register_panic_hook.
        // We borrow it here without taking ownership so it remains valid for future calls.
        unsafe {
            let old_hook = &*old_hook_ptr;
            old_hook(panic_info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_text_reads_strings() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(payload_text(static_str.as_ref()), "static");
        assert_eq!(payload_text(owned.as_ref()), "owned");
        assert_eq!(payload_text(other.as_ref()), UNKNOWN_PAYLOAD);
    }

    #[test]
    fn test_register_panic_hook() {
        let _lock = crate::test_utils::serial();
        assert!(register_panic_hook().is_ok());
        assert!(!PREVIOUS_PANIC_HOOK.load(SeqCst).is_null());
        // Idempotent.
        let first = PREVIOUS_PANIC_HOOK.load(SeqCst);
        assert!(register_panic_hook().is_ok());
        assert_eq!(PREVIOUS_PANIC_HOOK.load(SeqCst), first);
    }
}
