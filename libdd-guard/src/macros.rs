// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Runs a block as a guarded region.
///
/// ```no_run
/// # use libdd_guard::guard;
/// # fn parse(_: &str) {}
/// # let path = "maps/e1m1.pak";
/// guard!("LoadPackage" => { parse(path) });
/// // The message is only formatted if a failure is captured.
/// guard!("LoadPackage", "file={}", path => { parse(path) });
/// ```
#[macro_export]
macro_rules! guard {
    ($name:expr => $body:block) => {
        $crate::guard($name, || $body)
    };
    ($name:expr, $fmt:literal $(, $arg:expr)* => $body:block) => {
        $crate::guardf(
            $name,
            |w: &mut dyn ::core::fmt::Write| {
                ::core::fmt::Write::write_fmt(w, ::core::format_args!($fmt $(, $arg)*))
            },
            || $body,
        )
    };
}

/// Runs a block as a guarded region named after the enclosing function.
#[macro_export]
macro_rules! guard_fn {
    ($body:block) => {
        $crate::guard($crate::function_name!(), || $body)
    };
}

/// Name of the enclosing function, without its module path. With the `full-function-names`
/// feature the module path is kept.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        $crate::__private::function_name($crate::__private::type_name_of(f))
    }};
}

/// Reports a fatal error and terminates the process.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::fatal(::core::format_args!($($arg)*))
    };
}

/// Raises a failure from guarded code. Outside of any guarded region this is [`fatal!`].
#[macro_export]
macro_rules! raise {
    ($($arg:tt)*) => {
        $crate::raise(::core::format_args!($($arg)*))
    };
}

/// Asserts a condition; on failure the cause is `assertion failed: <condition>`.
///
/// Inside guarded regions the failure travels through the guards like any other; outside, it
/// goes straight to the fatal path.
#[macro_export]
macro_rules! guard_assert {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::raise!("assertion failed: {}", ::core::stringify!($cond))
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::raise!(
                "assertion failed: {}: {}",
                ::core::stringify!($cond),
                ::core::format_args!($($arg)+)
            )
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{capture_fatal, serial};

    fn named_after_me() -> &'static str {
        crate::function_name!()
    }

    #[cfg(not(feature = "full-function-names"))]
    #[test]
    fn function_name_strips_the_path() {
        assert_eq!(named_after_me(), "named_after_me");
        let from_closure = (|| crate::function_name!())();
        assert_eq!(from_closure, "function_name_strips_the_path");
    }

    #[cfg(feature = "full-function-names")]
    #[test]
    fn function_name_keeps_the_path() {
        assert_eq!(named_after_me(), "libdd_guard::macros::tests::named_after_me");
        let from_closure = (|| crate::function_name!())();
        assert_eq!(
            from_closure,
            "libdd_guard::macros::tests::function_name_keeps_the_path"
        );
    }

    fn guarded_by_name() -> usize {
        crate::guard_fn!({ crate::frames::snapshot().len() })
    }

    #[cfg(all(feature = "guard", not(feature = "full-function-names")))]
    #[test]
    fn guard_fn_pushes_the_function_name() {
        assert_eq!(guarded_by_name(), 1);
        let names = crate::guard_fn!({ crate::frames::snapshot() });
        assert_eq!(names, ["guard_fn_pushes_the_function_name"]);
    }

    #[cfg(feature = "guard")]
    #[test]
    fn assertion_outside_guards_is_fatal() {
        let _lock = serial();
        let x = 0;
        let delivered = capture_fatal(|| crate::guard_assert!(x > 0)).unwrap_err();
        assert_eq!(delivered.text, "assertion failed: x > 0");
        assert_eq!(delivered.path, "<none>");
    }

    #[cfg(feature = "guard")]
    #[test]
    fn assertion_inside_guards_names_the_frames() {
        let _lock = serial();
        let depth = 3;
        let delivered = capture_fatal(|| {
            crate::guard!("Render", "pass {}", depth => {
                crate::guard!("Blit" => { crate::guard_assert!(depth < 2, "depth was {}", depth) })
            })
        })
        .unwrap_err();
        assert_eq!(
            delivered.text,
            "Render (pass 3): Blit: assertion failed: depth < 2: depth was 3"
        );
        assert_eq!(delivered.path, "Render/Blit");
    }

    #[test]
    fn passing_assertions_do_nothing() {
        crate::guard_assert!(1 + 1 == 2);
    }

    #[test]
    fn fatal_macro_formats() {
        let _lock = serial();
        let delivered = capture_fatal(|| crate::fatal!("code {:03}", 7)).unwrap_err();
        assert_eq!(delivered.text, "code 007");
    }
}
