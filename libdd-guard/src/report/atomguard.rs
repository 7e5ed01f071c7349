// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct AtomGuardError;

impl fmt::Display for AtomGuardError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Reentrancy guard error: already in use")
    }
}

impl Error for AtomGuardError {}

/// Exclusive claim on a counter, released on drop.
pub struct AtomGuard<'a> {
    counter: &'a AtomicU64,
}

impl<'a> AtomGuard<'a> {
    pub fn new(counter: &'a AtomicU64) -> Result<Self, AtomGuardError> {
        // A CAS from 0 to 1 rather than increment-then-check, so a losing caller never
        // disturbs the count.
        match counter.compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => Ok(AtomGuard { counter }),
            Err(_) => Err(AtomGuardError),
        }
    }
}

impl Drop for AtomGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_fails_until_release() {
        let counter = AtomicU64::new(0);
        let first = AtomGuard::new(&counter);
        assert!(first.is_ok());
        assert!(AtomGuard::new(&counter).is_err());
        drop(first);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(AtomGuard::new(&counter).is_ok());
    }
}
