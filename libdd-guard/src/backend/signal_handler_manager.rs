// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::fault::owns_fault;
use crate::context::history::FixedBuf;
use crate::report::{fatal, Origin};
use crate::shared::configuration::GuardConfiguration;
use crate::shared::sig_info::{fault_address, signal_from_signum, write_fault_cause};
use libc::{
    c_void, mmap, sigaltstack, siginfo_t, MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_NONE, PROT_READ,
    PROT_WRITE, SIGSTKSZ,
};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler};
use std::ptr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use tracing::warn;

// Note that the handler below only relies on the following async-signal-safe functions.
// <https://man7.org/linux/man-pages/man7/signal-safety.7.html>
// - abort / _exit
// - clock_gettime
// - nanosleep (only while another thread is reporting)
// - raise
// - sigaction
// - write

// Linux seems to have the most, supporting up to 64 inclusive
// https://man7.org/linux/man-pages/man7/signal.7.html
const MAX_SIGNALS: usize = 65;
static mut HANDLERS: [Option<(signal::Signal, SigAction)>; MAX_SIGNALS] = [None; MAX_SIGNALS];
static INIT_STARTED: AtomicBool = AtomicBool::new(false);
static INIT_FINISHED: AtomicBool = AtomicBool::new(false);

const CAUSE_CAPACITY: usize = 128;

/// Registers the fault handler for every signal in `config`.
/// This function uses a flag to ensure the registration only happens once; an error is returned
/// if it is called again.
/// ATOMICITY:
///     Setting the handlers is not an atomic operation. If a fault arrives after a handler has
///     been registered but before the previous one has been stored, there is nothing to chain
///     to and the process is terminated.
pub(crate) fn register_fault_handlers(config: &GuardConfiguration) -> anyhow::Result<()> {
    // Guarantee that the handlers is only mutated once.
    anyhow::ensure!(
        INIT_STARTED
            .compare_exchange(false, true, SeqCst, SeqCst)
            .is_ok(),
        "Attempted to double register fault handlers"
    );

    // Validate signal numbers will fit in the array.
    for signum in config.signals() {
        anyhow::ensure!(*signum >= 0 && *signum < MAX_SIGNALS as i32);
    }

    if config.create_alt_stack() {
        // Safety: This function has no documented preconditions.
        unsafe { create_alt_stack()? };
    }

    let mut errors = vec![];

    for signum in config.signals() {
        let index = *signum as usize;
        // Safety: This function has no documented preconditions.
        match unsafe { register_signal_handler(*signum, config) } {
            // SAFETY: `HANDLERS` is only written here, while `INIT_STARTED` is set and
            // `INIT_FINISHED` is not; `chain_signal_handler` only reads it once `INIT_FINISHED`
            // is set at the end of this function.
            Ok(handler) => unsafe { HANDLERS[index] = Some(handler) },
            Err(e) => {
                warn!(signum, error = %e, "unable to register fault handler");
                errors.push(format!("Unable to register signal for {signum}: {e:?}"))
            }
        };
    }
    INIT_FINISHED.store(true, SeqCst);
    anyhow::ensure!(
        errors.is_empty(),
        "Errors registering signal handlers {errors:?}"
    );
    Ok(())
}

pub(crate) extern "C" fn handle_fault(signum: i32, sig_info: *mut siginfo_t, ucontext: *mut c_void) {
    // A fault while this thread is already reporting is never reported again.
    if fatal::is_reporting() {
        fatal::fail_minimal()
    }
    if owns_fault(signum) {
        // SAFETY: the kernel hands us either null or a valid `siginfo_t`.
        let si_code = unsafe { sig_info.as_ref() }.map_or(0, |info| info.si_code);
        // SAFETY: as above.
        let address = unsafe { fault_address(sig_info) };
        let mut cause = FixedBuf::<CAUSE_CAPACITY>::new();
        let _ = write_fault_cause(&mut cause, signum, si_code, address);
        fatal::report_frames(cause.as_str(), Origin::Signal(signum))
    }
    // SAFETY: No preconditions.
    unsafe { chain_signal_handler(signum, sig_info, ucontext) };
}

/// Hands a fault that is not ours to the handler that was installed before us.
/// SAFETY: This was created by [register_fault_handlers].  There is a tiny
/// instant of time between when the handlers are registered, and the
/// `HANDLERS` are set.  This should be very short, but is hard to fully
/// eliminate given the existing POSIX APIs.
/// If we run into an unexpected condition we just `_exit` to quit the program without re-raising
/// `SIGABRT`.
pub(crate) unsafe fn chain_signal_handler(
    signum: i32,
    sig_info: *mut siginfo_t,
    ucontext: *mut c_void,
) {
    if !INIT_FINISHED.load(SeqCst) {
        crate::report::sink::write_stderr("fault during handler setup, cannot chain\n");
        fatal::terminate()
    }
    if signum < 0 || signum >= MAX_SIGNALS as i32 {
        crate::report::sink::write_stderr("unexpected signal number, cannot chain\n");
        fatal::terminate()
    }
    // SAFETY: `INIT_FINISHED` is set, so `HANDLERS` is never written again.
    if let Some((signal, sigaction)) = &mut unsafe { HANDLERS[signum as usize] } {
        // How we chain depends on what kind of handler we're chaining to.
        // https://www.gnu.org/software/libc/manual/html_node/Signal-Handling.html
        // https://man7.org/linux/man-pages/man2/sigaction.2.html
        match sigaction.handler() {
            SigHandler::SigDfl => {
                // Restoring the default and re-raising lets the OS act as if we were never
                // installed, core dump included.
                unsafe { signal::sigaction(*signal, sigaction) }
                    .unwrap_or_else(|_| fatal::terminate());
                // For a real fault, returning would re-run the faulting instruction anyway; for
                // `raise(SIGSEGV)` and friends the signal has to be delivered again explicitly.
                unsafe { libc::raise(signum) };
            }
            SigHandler::SigIgn => (), // Return and ignore the signal.
            SigHandler::Handler(f) => f(signum),
            SigHandler::SigAction(f) => f(signum, sig_info, ucontext),
        }
    } else {
        crate::report::sink::write_stderr("missing previous handler, cannot chain\n");
        fatal::terminate()
    }
}

/// Allocates a signal altstack, and puts a guard page at the end.
/// Inspired by https://github.com/rust-lang/rust/pull/69969/files
unsafe fn create_alt_stack() -> anyhow::Result<()> {
    // The greater of 16 pages or SIGSTKSZ: a report is rendered into fixed buffers on the
    // stack, which does not fit comfortably in the default 8KB.
    let page_size = page_size::get();
    let sigalstack_base_size = std::cmp::max(SIGSTKSZ, 16 * page_size);
    let stackp = mmap(
        ptr::null_mut(),
        sigalstack_base_size + page_size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANON,
        -1,
        0,
    );
    anyhow::ensure!(
        stackp != MAP_FAILED,
        "failed to allocate an alternative stack"
    );
    let guard_result = libc::mprotect(stackp, page_size, PROT_NONE);
    anyhow::ensure!(
        guard_result == 0,
        "failed to set up alternative stack guard page"
    );
    let stackp = stackp.add(page_size);

    let stack = libc::stack_t {
        ss_sp: stackp,
        ss_flags: 0,
        ss_size: sigalstack_base_size,
    };
    let rval = sigaltstack(&stack, ptr::null_mut());
    anyhow::ensure!(rval == 0, "sigaltstack failed {rval}");
    Ok(())
}

unsafe fn register_signal_handler(
    signum: i32,
    config: &GuardConfiguration,
) -> anyhow::Result<(signal::Signal, SigAction)> {
    let signal_type = signal_from_signum(signum)?;

    // Running on an altstack is what makes SIGSEGV from a stack overflow reportable. Some hosts
    // install an altstack of their own and expect handlers to use it without replacing it, which
    // is why using and creating are separate options.
    let extra_saflags = if config.use_alt_stack() {
        SaFlags::SA_ONSTACK
    } else {
        SaFlags::empty()
    };

    let sig_action = SigAction::new(
        SigHandler::SigAction(handle_fault),
        SaFlags::SA_NODEFER | extra_saflags,
        signal::SigSet::empty(),
    );

    let old_handler = signal::sigaction(signal_type, &sig_action)?;
    Ok((signal_type, old_handler))
}
