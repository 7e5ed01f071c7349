// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#[cfg(not(unix))]
fn main() {}

#[cfg(unix)]
fn main() -> anyhow::Result<()> {
    unix::main()
}

#[cfg(unix)]
mod unix {
    use anyhow::Context;
    use bin_tests::{BackendType, Scenario};
    use libdd_guard::{
        self as guard, guard_in, guardf_in, ExceptionBackend, FatalReport, FaultBackend,
        GuardConfiguration, ReportSink, TerminationMode, UnwindBackend,
    };
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet};
    use std::env;
    use std::fmt;
    use std::hint::black_box;
    use tracing_subscriber::EnvFilter;

    #[inline(never)]
    unsafe fn null_deref() {
        #[cfg(target_arch = "x86_64")]
        {
            std::arch::asm!("mov eax, [0]", out("eax") _, options(nostack));
        }

        #[cfg(target_arch = "aarch64")]
        {
            std::arch::asm!("mov x0, #0", "ldr x1, [x0]", out("x0") _, out("x1") _, options(nostack));
        }

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            libc::raise(libc::SIGSEGV);
        }
    }

    #[inline(never)]
    unsafe fn hardware_divide() {
        #[cfg(target_arch = "x86_64")]
        {
            std::arch::asm!(
                "xor edx, edx",
                "xor eax, eax",
                "xor ecx, ecx",
                "div ecx",
                out("eax") _,
                out("ecx") _,
                out("edx") _,
                options(nostack),
            );
        }

        // Other CPUs do not trap on integer division by zero.
        #[cfg(not(target_arch = "x86_64"))]
        {
            libc::raise(libc::SIGFPE);
        }
    }

    fn checked_divide(a: i32, b: i32) -> i32 {
        match a.checked_div(b) {
            Some(q) => q,
            None => guard::raise!("divide by zero"),
        }
    }

    fn nested<B: UnwindBackend, T>(body: impl FnOnce() -> T) -> T {
        guard_in::<B, _>("A", || guard_in::<B, _>("B", || guard_in::<B, _>("C", body)))
    }

    fn recurse<B: UnwindBackend>(levels: u32) -> i32 {
        guard_in::<B, _>("Recurse", || {
            if levels == 0 {
                return checked_divide(1, black_box(0));
            }
            recurse::<B>(levels - 1)
        })
    }

    /// What the handler installed before the guard backend prints when it runs.
    const PREVIOUS_HANDLER_MESSAGE: &str = "previous SIGSEGV handler ran\n";
    /// Exit code of the handler installed before the guard backend.
    const PREVIOUS_HANDLER_EXIT: libc::c_int = 3;

    extern "C" fn previous_handler(_signum: libc::c_int) {
        let msg = PREVIOUS_HANDLER_MESSAGE;
        unsafe {
            libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
            libc::_exit(PREVIOUS_HANDLER_EXIT);
        }
    }

    extern "C" fn previous_sigaction(
        signum: libc::c_int,
        _sig_info: *mut libc::siginfo_t,
        _ucontext: *mut libc::c_void,
    ) {
        previous_handler(signum)
    }

    fn install_previous_handler(handler: SigHandler) -> anyhow::Result<()> {
        let action = SigAction::new(handler, SaFlags::empty(), SigSet::empty());
        // Safety: the handler only uses async-signal-safe functions.
        unsafe { signal::sigaction(signal::SIGSEGV, &action) }?;
        Ok(())
    }

    struct ReentrantSink;

    impl ReportSink for ReentrantSink {
        fn report(&self, report: &FatalReport<'_>) -> ! {
            guard::fatal!("sink failed while handling: {}", report.text)
        }
    }

    struct PanickingSink;

    impl ReportSink for PanickingSink {
        fn report(&self, _report: &FatalReport<'_>) -> ! {
            panic!("sink exploded")
        }
    }

    fn run<B: UnwindBackend + 'static>(scenario: Scenario) -> anyhow::Result<()> {
        let termination = match scenario {
            Scenario::AbortMode => TerminationMode::Abort,
            _ => TerminationMode::Exit,
        };
        let config = GuardConfiguration::new(
            true, // create_alt_stack
            true, // use_alt_stack
            guard::default_signals(),
            termination,
            true, // quiet_guarded_panics
        )?;
        match scenario {
            Scenario::ChainedSigaction => {
                install_previous_handler(SigHandler::SigAction(previous_sigaction))?
            }
            Scenario::ChainedHandler => install_previous_handler(SigHandler::Handler(previous_handler))?,
            _ => {}
        }
        guard::init_with::<B>(config)?;

        match scenario {
            Scenario::NestedOk => {
                let q = nested::<B, _>(|| checked_divide(6, 3));
                let last = guard::last_report().unwrap_or_default();
                println!("result {q}, last report {last:?}");
            }
            Scenario::IntegerDivide => {
                nested::<B, _>(|| checked_divide(1, black_box(0)));
            }
            Scenario::PanicDivide => {
                nested::<B, _>(|| 1 / black_box(0));
            }
            Scenario::HardwareDivide => nested::<B, _>(|| unsafe { hardware_divide() }),
            Scenario::Recursion => {
                recurse::<B>(2);
            }
            Scenario::Message => {
                let path = "maps/e1m1.pak";
                let message = |w: &mut dyn fmt::Write| write!(w, "file={path}");
                guardf_in::<B, _>("LoadPackage", message, || {
                    guard_in::<B, _>("Parse", || guard::raise!("corrupt header"))
                })
            }
            Scenario::AssertUnguarded => {
                let x = black_box(0);
                guard::guard_assert!(x > 0);
            }
            Scenario::NullDeref => nested::<B, _>(|| unsafe { null_deref() }),
            Scenario::NullDerefUnguarded => unsafe { null_deref() },
            Scenario::NullDerefDisabled => {
                guard::disable();
                nested::<B, _>(|| unsafe { null_deref() })
            }
            Scenario::Thread => {
                guard_in::<B, _>("Main", || {
                    let worker = std::thread::spawn(|| {
                        guard_in::<B, _>("Worker", || checked_divide(1, black_box(0)))
                    });
                    // The worker ends the process; joining only returns if it did not.
                    let _ = worker.join();
                })
            }
            Scenario::ChainedSigaction | Scenario::ChainedHandler => unsafe { null_deref() },
            Scenario::PanicInSink => {
                guard::set_report_sink(Box::new(PanickingSink));
                nested::<B, _>(|| checked_divide(1, black_box(0)));
            }
            Scenario::FatalInSink => {
                guard::set_report_sink(Box::new(ReentrantSink));
                nested::<B, _>(|| checked_divide(1, black_box(0)));
            }
            Scenario::AbortMode => {
                nested::<B, _>(|| checked_divide(1, black_box(0)));
            }
        }
        Ok(())
    }

    pub fn main() -> anyhow::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();

        let mut args = env::args().skip(1);
        let backend: BackendType = args
            .next()
            .context("Unexpected number of arguments 1")?
            .parse()
            .map_err(anyhow::Error::msg)?;
        let scenario: Scenario = args
            .next()
            .context("Unexpected number of arguments 2")?
            .parse()
            .map_err(anyhow::Error::msg)?;
        anyhow::ensure!(args.next().is_none(), "unexpected extra arguments");

        tracing::info!(%backend, %scenario, "starting");
        match backend {
            BackendType::Exception => run::<ExceptionBackend>(scenario),
            BackendType::Fault => run::<FaultBackend>(scenario),
        }
    }
}
