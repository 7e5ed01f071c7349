// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// The unwind backend the test app installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    Exception,
    Fault,
}

impl BackendType {
    /// Returns the string representation used in command-line arguments.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exception => "exception",
            Self::Fault => "fault",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[Self::Exception, Self::Fault]
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exception" => Ok(Self::Exception),
            "fault" => Ok(Self::Fault),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// What the test app does once the backend is installed.
/// Unless noted otherwise, guarded work runs under the nested regions `A`, `B` and `C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Everything completes; the app exits successfully.
    NestedOk,
    /// `raise!("divide by zero")` after a checked division fails.
    IntegerDivide,
    /// Plain Rust integer division by zero (a panic).
    PanicDivide,
    /// Integer division by zero in machine code (SIGFPE where the CPU traps).
    HardwareDivide,
    /// The region `Recurse` entered three times recursively.
    Recursion,
    /// A region with a formatted message.
    Message,
    /// `guard_assert!` with no guarded region active.
    AssertUnguarded,
    /// Null pointer dereference (SIGSEGV via inline assembly).
    NullDeref,
    /// Null pointer dereference outside any guarded region.
    NullDerefUnguarded,
    /// Null pointer dereference after `disable()`.
    NullDerefDisabled,
    /// A worker thread fails inside `Worker` while `Main` is active on the main thread.
    Thread,
    /// Null pointer dereference outside any guarded region, with a `SA_SIGINFO` SIGSEGV handler
    /// installed before the guard backend.
    ChainedSigaction,
    /// As `ChainedSigaction`, with a plain `sa_handler` handler.
    ChainedHandler,
    /// A report sink that itself calls `fatal!`.
    FatalInSink,
    /// A report sink that panics.
    PanicInSink,
    /// `raise!` with `TerminationMode::Abort`.
    AbortMode,
}

impl Scenario {
    /// Returns the string representation used in command-line arguments.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NestedOk => "nested_ok",
            Self::IntegerDivide => "integer_divide",
            Self::PanicDivide => "panic_divide",
            Self::HardwareDivide => "hardware_divide",
            Self::Recursion => "recursion",
            Self::Message => "message",
            Self::AssertUnguarded => "assert_unguarded",
            Self::NullDeref => "null_deref",
            Self::NullDerefUnguarded => "null_deref_unguarded",
            Self::NullDerefDisabled => "null_deref_disabled",
            Self::Thread => "thread",
            Self::ChainedSigaction => "chained_sigaction",
            Self::ChainedHandler => "chained_handler",
            Self::FatalInSink => "fatal_in_sink",
            Self::PanicInSink => "panic_in_sink",
            Self::AbortMode => "abort_mode",
        }
    }

    /// Returns all available scenarios.
    pub const fn all() -> &'static [Self] {
        &[
            Self::NestedOk,
            Self::IntegerDivide,
            Self::PanicDivide,
            Self::HardwareDivide,
            Self::Recursion,
            Self::Message,
            Self::AssertUnguarded,
            Self::NullDeref,
            Self::NullDerefUnguarded,
            Self::NullDerefDisabled,
            Self::Thread,
            Self::ChainedSigaction,
            Self::ChainedHandler,
            Self::FatalInSink,
            Self::PanicInSink,
            Self::AbortMode,
        ]
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|scenario| scenario.as_str() == s)
            .ok_or_else(|| format!("Unknown scenario: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for scenario in Scenario::all() {
            assert_eq!(scenario.as_str().parse::<Scenario>(), Ok(*scenario));
        }
        for backend in BackendType::all() {
            assert_eq!(backend.to_string().parse::<BackendType>(), Ok(*backend));
        }
        assert!("nope".parse::<Scenario>().is_err());
    }
}
