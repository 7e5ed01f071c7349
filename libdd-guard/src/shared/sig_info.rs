// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Human-readable names for fault signals, usable from a signal handler.

use std::fmt;

pub fn signal_name(signum: libc::c_int) -> &'static str {
    match signum {
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGBUS => "SIGBUS",
        libc::SIGILL => "SIGILL",
        libc::SIGABRT => "SIGABRT",
        libc::SIGFPE => "SIGFPE",
        libc::SIGTRAP => "SIGTRAP",
        libc::SIGSYS => "SIGSYS",
        _ => "UNKNOWN",
    }
}

// These are defined in siginfo.h
// There doesn't appear to be a crate that provides them in a comparable way.
// (this only copies the most common, actionable values)
pub mod siginfo_code {
    pub const SI_USER: i32 = 0;
    pub const SI_KERNEL: i32 = 0x80;
    pub const SI_QUEUE: i32 = -1;
    pub const SI_TKILL: i32 = -6;

    pub mod ill {
        pub const ILLOPC: i32 = 1;
        pub const ILLOPN: i32 = 2;
        pub const ILLADR: i32 = 3;
        pub const ILLTRP: i32 = 4;
        pub const PRVOPC: i32 = 5;
        pub const PRVREG: i32 = 6;
        pub const COPROC: i32 = 7;
        pub const BADSTK: i32 = 8;
    }

    pub mod fpe {
        pub const INTDIV: i32 = 1;
        pub const INTOVF: i32 = 2;
        pub const FLTDIV: i32 = 3;
        pub const FLTOVF: i32 = 4;
        pub const FLTUND: i32 = 5;
        pub const FLTRES: i32 = 6;
        pub const FLTINV: i32 = 7;
        pub const FLTSUB: i32 = 8;
    }

    pub mod segv {
        pub const MAPERR: i32 = 1;
        pub const ACCERR: i32 = 2;
    }

    pub mod bus {
        pub const ADRALN: i32 = 1;
        pub const ADRERR: i32 = 2;
        pub const OBJERR: i32 = 3;
    }
}

pub fn code_name(signum: libc::c_int, si_code: libc::c_int) -> &'static str {
    // Codes raised by another process or by `raise`/`kill` are the same for every signal.
    match si_code {
        siginfo_code::SI_USER => return "SI_USER",
        siginfo_code::SI_KERNEL => return "SI_KERNEL",
        siginfo_code::SI_QUEUE => return "SI_QUEUE",
        siginfo_code::SI_TKILL => return "SI_TKILL",
        _ => {}
    }

    match signum {
        libc::SIGILL => match si_code {
            siginfo_code::ill::ILLOPC => "ILL_ILLOPC",
            siginfo_code::ill::ILLOPN => "ILL_ILLOPN",
            siginfo_code::ill::ILLADR => "ILL_ILLADR",
            siginfo_code::ill::ILLTRP => "ILL_ILLTRP",
            siginfo_code::ill::PRVOPC => "ILL_PRVOPC",
            siginfo_code::ill::PRVREG => "ILL_PRVREG",
            siginfo_code::ill::COPROC => "ILL_COPROC",
            siginfo_code::ill::BADSTK => "ILL_BADSTK",
            _ => "UNKNOWN_SIGILL",
        },
        libc::SIGFPE => match si_code {
            siginfo_code::fpe::INTDIV => "FPE_INTDIV",
            siginfo_code::fpe::INTOVF => "FPE_INTOVF",
            siginfo_code::fpe::FLTDIV => "FPE_FLTDIV",
            siginfo_code::fpe::FLTOVF => "FPE_FLTOVF",
            siginfo_code::fpe::FLTUND => "FPE_FLTUND",
            siginfo_code::fpe::FLTRES => "FPE_FLTRES",
            siginfo_code::fpe::FLTINV => "FPE_FLTINV",
            siginfo_code::fpe::FLTSUB => "FPE_FLTSUB",
            _ => "UNKNOWN_SIGFPE",
        },
        libc::SIGSEGV => match si_code {
            siginfo_code::segv::MAPERR => "SEGV_MAPERR",
            siginfo_code::segv::ACCERR => "SEGV_ACCERR",
            _ => "UNKNOWN_SIGSEGV",
        },
        libc::SIGBUS => match si_code {
            siginfo_code::bus::ADRALN => "BUS_ADRALN",
            siginfo_code::bus::ADRERR => "BUS_ADRERR",
            siginfo_code::bus::OBJERR => "BUS_OBJERR",
            _ => "UNKNOWN_SIGBUS",
        },
        _ => "UNKNOWN_GENERAL",
    }
}

/// The address reported by the kernel for faults that carry one. Signals sent by a process
/// (`si_code <= 0`) have none.
///
/// # Safety
/// `sig_info` must be null or point to the `siginfo_t` handed to a signal handler.
pub unsafe fn fault_address(sig_info: *const libc::siginfo_t) -> Option<usize> {
    let sig_info = sig_info.as_ref()?;
    // Signals sent with kill/raise/sigqueue carry a sender, not an address.
    if sig_info.si_code <= 0 {
        return None;
    }
    match sig_info.si_signo {
        libc::SIGSEGV | libc::SIGBUS | libc::SIGILL | libc::SIGFPE => {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            let addr = sig_info.si_addr();
            #[cfg(not(any(target_os = "linux", target_os = "android")))]
            let addr = sig_info.si_addr;
            Some(addr as usize)
        }
        _ => None,
    }
}

/// Writes the cause of a fault, e.g. `SIGSEGV (SEGV_MAPERR) at 0x0`.
pub fn write_fault_cause(
    w: &mut dyn fmt::Write,
    signum: libc::c_int,
    si_code: libc::c_int,
    address: Option<usize>,
) -> fmt::Result {
    write!(w, "{} ({})", signal_name(signum), code_name(signum, si_code))?;
    if let Some(address) = address {
        write!(w, " at {address:#x}")?;
    }
    Ok(())
}

/// Converts a signum into a Signal.  Can't use the from trait because we don't own either type.
pub fn signal_from_signum(value: libc::c_int) -> anyhow::Result<nix::sys::signal::Signal> {
    let rval = match value {
        libc::SIGABRT => nix::sys::signal::Signal::SIGABRT,
        libc::SIGBUS => nix::sys::signal::Signal::SIGBUS,
        libc::SIGFPE => nix::sys::signal::Signal::SIGFPE,
        libc::SIGILL => nix::sys::signal::Signal::SIGILL,
        libc::SIGSEGV => nix::sys::signal::Signal::SIGSEGV,
        libc::SIGSYS => nix::sys::signal::Signal::SIGSYS,
        libc::SIGTRAP => nix::sys::signal::Signal::SIGTRAP,
        _ => anyhow::bail!("Unexpected fault signal number {value}"),
    };
    Ok(rval)
}
