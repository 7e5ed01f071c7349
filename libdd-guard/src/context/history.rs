// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The error history buffer: a process-wide, fixed-capacity copy of the most recent report.
//!
//! Everything in here is allocation-free so that it can be used from a signal handler. The
//! global buffer is protected by a spin flag that is only ever *tried*: a writer that cannot get
//! the flag after a bounded number of attempts gives up instead of blocking. This matters when
//! a fault interrupts the thread that currently holds the flag.

use std::cell::UnsafeCell;
use std::fmt;
use std::hint;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

/// Capacity, in bytes, of the error history buffer.
pub const ERROR_HISTORY_CAPACITY: usize = 2048;

const LOCK_SPIN_LIMIT: usize = 10_000;

/// Largest index `<= max` that lies on a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut index = max;
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// A fixed-capacity UTF-8 string living inline.
///
/// Writes that do not fit are truncated at a char boundary; they never fail and never allocate.
pub(crate) struct FixedBuf<const N: usize> {
    len: usize,
    bytes: [u8; N],
}

impl<const N: usize> FixedBuf<N> {
    pub(crate) const fn new() -> Self {
        Self {
            len: 0,
            bytes: [0; N],
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        // SAFETY: only whole UTF-8 sequences copied from `&str`s are ever stored.
        unsafe { std::str::from_utf8_unchecked(&self.bytes[..self.len]) }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    /// Replaces the content. Returns `false` if `s` had to be truncated.
    pub(crate) fn set(&mut self, s: &str) -> bool {
        self.clear();
        self.push_str(s)
    }

    /// Appends `s`. Returns `false` if it had to be truncated.
    pub(crate) fn push_str(&mut self, s: &str) -> bool {
        let take = floor_char_boundary(s, N - self.len);
        self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        take == s.len()
    }

    /// Inserts `s` in front of the current content, dropping the tail of the old content if
    /// needed. Returns `false` if anything was dropped.
    pub(crate) fn prefix(&mut self, s: &str) -> bool {
        let head = floor_char_boundary(s, N);
        let kept = floor_char_boundary(self.as_str(), N - head);
        let complete = head == s.len() && kept == self.len;
        self.bytes.copy_within(..kept, head);
        self.bytes[..head].copy_from_slice(&s.as_bytes()[..head]);
        self.len = head + kept;
        complete
    }
}

impl<const N: usize> fmt::Write for FixedBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // Truncation is not an error: a partial report beats a formatting failure.
        self.push_str(s);
        Ok(())
    }
}

impl<const N: usize> fmt::Debug for FixedBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

pub(crate) struct ErrorHistory {
    busy: AtomicBool,
    text: UnsafeCell<FixedBuf<ERROR_HISTORY_CAPACITY>>,
}

// SAFETY: `text` is only reached through `HistoryGuard`, which holds `busy`.
unsafe impl Sync for ErrorHistory {}

struct HistoryGuard<'a> {
    history: &'a ErrorHistory,
}

impl ErrorHistory {
    const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            text: UnsafeCell::new(FixedBuf::new()),
        }
    }

    fn try_lock(&self) -> Option<HistoryGuard<'_>> {
        for _ in 0..LOCK_SPIN_LIMIT {
            if self
                .busy
                .compare_exchange_weak(false, true, Acquire, Relaxed)
                .is_ok()
            {
                return Some(HistoryGuard { history: self });
            }
            hint::spin_loop();
        }
        None
    }

    /// Overwrites the buffer with `text`. Returns `false` if the buffer could not be acquired.
    pub(crate) fn store(&self, text: &str) -> bool {
        match self.try_lock() {
            Some(mut guard) => {
                guard.text().set(text);
                true
            }
            None => false,
        }
    }

    /// Copies the buffer out. Returns `None` if the buffer could not be acquired.
    pub(crate) fn read(&self) -> Option<String> {
        self.try_lock()
            .map(|mut guard| guard.text().as_str().to_owned())
    }

    pub(crate) fn clear(&self) {
        if let Some(mut guard) = self.try_lock() {
            guard.text().clear();
        }
    }
}

impl HistoryGuard<'_> {
    fn text(&mut self) -> &mut FixedBuf<ERROR_HISTORY_CAPACITY> {
        // SAFETY: we hold `busy`, so nobody else is looking at the buffer.
        unsafe { &mut *self.history.text.get() }
    }
}

impl Drop for HistoryGuard<'_> {
    fn drop(&mut self) {
        self.history.busy.store(false, Release);
    }
}

pub(crate) static ERROR_HISTORY: ErrorHistory = ErrorHistory::new();

/// Returns a copy of the most recently captured report, or an empty string if nothing has been
/// captured yet.
///
/// Returns `None` while another thread is writing a report into the buffer. The buffer is
/// overwritten by every capture; copy it out before the next one.
pub fn last_report() -> Option<String> {
    ERROR_HISTORY.read()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn push_truncates_at_capacity() {
        let mut buf = FixedBuf::<8>::new();
        assert!(buf.push_str("abcd"));
        assert!(!buf.push_str("efghij"));
        assert_eq!(buf.as_str(), "abcdefgh");
        assert!(!buf.push_str("k"));
        assert_eq!(buf.as_str(), "abcdefgh");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut buf = FixedBuf::<5>::new();
        // 'é' is two bytes; the second one would straddle the capacity.
        assert!(!buf.push_str("abcé"));
        assert_eq!(buf.as_str(), "abc");
    }

    #[test]
    fn prefix_accumulates_outermost_first() {
        let mut buf = FixedBuf::<64>::new();
        buf.set("divide by zero");
        buf.prefix("C: ");
        buf.prefix("B: ");
        buf.prefix("A: ");
        assert_eq!(buf.as_str(), "A: B: C: divide by zero");
    }

    #[test]
    fn prefix_drops_the_tail_when_full() {
        let mut buf = FixedBuf::<10>::new();
        buf.set("0123456789");
        assert!(!buf.prefix("ab"));
        assert_eq!(buf.as_str(), "ab01234567");

        // A prefix larger than the whole buffer keeps only its own head.
        assert!(!buf.prefix("this does not fit"));
        assert_eq!(buf.as_str(), "this does ");
    }

    #[test]
    fn formatting_into_a_full_buffer_is_not_an_error() {
        let mut buf = FixedBuf::<4>::new();
        assert!(write!(buf, "{}-{}", 1234, 5678).is_ok());
        assert_eq!(buf.as_str(), "1234");
    }

    #[test]
    fn history_store_overwrites() {
        let _lock = crate::test_utils::serial();
        assert!(ERROR_HISTORY.store("first"));
        assert!(ERROR_HISTORY.store("second"));
        assert_eq!(last_report().as_deref(), Some("second"));
        ERROR_HISTORY.clear();
        assert_eq!(last_report().as_deref(), Some(""));
    }

    #[test]
    fn history_gives_up_instead_of_blocking() {
        let history = ErrorHistory::new();
        let held = history.try_lock();
        assert!(held.is_some());
        assert!(!history.store("blocked"));
        // A busy buffer is not the same as an empty one.
        assert_eq!(history.read(), None);
        drop(held);
        assert!(history.store("free"));
        assert_eq!(history.read().as_deref(), Some("free"));
    }

    #[test]
    fn history_is_bounded() {
        let history = ErrorHistory::new();
        let long = "x".repeat(ERROR_HISTORY_CAPACITY * 2);
        history.store(&long);
        assert_eq!(history.read().map(|text| text.len()), Some(ERROR_HISTORY_CAPACITY));
    }
}
