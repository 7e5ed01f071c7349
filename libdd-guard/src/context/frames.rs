// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The per-thread stack of guarded regions.
//!
//! Every thread owns its own stack, so push/pop/snapshot need no synchronization. The storage is
//! a `const`-initialised thread local without a destructor, which makes it readable from a
//! signal handler running on the same thread: the fault backend walks it while the faulting
//! frames are still live.
//!
//! Only the first [`MAX_GUARD_DEPTH`] frames are recorded by name. Deeper frames are still
//! counted, so push/pop stay balanced at any depth.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;

/// Number of frames whose names are kept for reports built from the stack.
pub const MAX_GUARD_DEPTH: usize = 128;

/// A caller-supplied message attached to a frame, formatted only when a failure is captured.
pub trait FrameMessage {
    fn write_message(&self, w: &mut dyn fmt::Write) -> fmt::Result;
}

impl<F> FrameMessage for F
where
    F: Fn(&mut dyn fmt::Write) -> fmt::Result,
{
    fn write_message(&self, w: &mut dyn fmt::Write) -> fmt::Result {
        self(w)
    }
}

#[derive(Clone, Copy)]
pub(crate) struct FrameEntry {
    pub(crate) name: &'static str,
    // Points into the stack frame of the guard that pushed this entry. The entry is cleared by
    // that guard's `FrameGuard` before the message goes away.
    message: Option<*const (dyn FrameMessage + 'static)>,
}

impl FrameEntry {
    pub(crate) fn message(&self) -> Option<&dyn FrameMessage> {
        // SAFETY: see the field comment; entries are only read while their guard is alive.
        self.message.map(|message| unsafe { &*message })
    }
}

/// One element of the stack as seen by a report builder.
#[derive(Clone, Copy)]
pub(crate) enum FrameRef {
    Entry(FrameEntry),
    /// Frames past [`MAX_GUARD_DEPTH`]; only their number is known.
    Elided(usize),
}

struct FrameStack {
    depth: Cell<usize>,
    entries: [Cell<Option<FrameEntry>>; MAX_GUARD_DEPTH],
}

thread_local! {
    static FRAMES: FrameStack = const {
        FrameStack {
            depth: Cell::new(0),
            entries: [const { Cell::new(None) }; MAX_GUARD_DEPTH],
        }
    };
}

/// Scoped handle for one pushed frame. Dropping it pops the frame.
///
/// The handle is neither `Send` nor `Sync`: a frame can only be released by the thread that
/// pushed it.
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct FrameGuard<'a> {
    index: usize,
    name: &'static str,
    _scope: PhantomData<(&'a (), *const ())>,
}

/// Registers `name` as the innermost frame of the current thread.
pub fn push(name: &'static str) -> FrameGuard<'static> {
    enter(name, None)
}

pub(crate) fn push_with_message<'a>(
    name: &'static str,
    message: Option<&'a dyn FrameMessage>,
) -> FrameGuard<'a> {
    let message = message.map(|message| {
        let message: *const (dyn FrameMessage + 'a) = message;
        // SAFETY: only the lifetime is erased. The returned guard borrows for 'a and clears the
        // entry on drop, so the pointer is never read after 'a ends.
        unsafe {
            std::mem::transmute::<*const (dyn FrameMessage + 'a), *const (dyn FrameMessage + 'static)>(
                message,
            )
        }
    });
    enter(name, message)
}

fn enter<'a>(
    name: &'static str,
    message: Option<*const (dyn FrameMessage + 'static)>,
) -> FrameGuard<'a> {
    let index = FRAMES.with(|stack| {
        let index = stack.depth.get();
        if let Some(slot) = stack.entries.get(index) {
            slot.set(Some(FrameEntry { name, message }));
        }
        stack.depth.set(index + 1);
        index
    });
    FrameGuard {
        index,
        name,
        _scope: PhantomData,
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        // The thread local may already be gone if a guard outlives thread teardown.
        let depth = FRAMES.try_with(|stack| {
            let depth = stack.depth.get();
            if let Some(slot) = stack.entries.get(self.index) {
                slot.set(None);
            }
            // Frames above us were leaked and are discarded. A frame below us that was already
            // released keeps the depth where it left it.
            stack.depth.set(self.index.min(depth));
            depth
        });
        if cfg!(debug_assertions) && matches!(depth, Ok(depth) if depth != self.index + 1) {
            crate::fatal!(
                "guard frame '{}' released out of order (depth {}, expected {})",
                self.name,
                depth.unwrap_or_default(),
                self.index + 1
            );
        }
    }
}

/// Number of guarded regions currently active on this thread.
pub fn depth() -> usize {
    FRAMES.try_with(|stack| stack.depth.get()).unwrap_or(0)
}

/// Names of the active frames, outermost first. Frames past [`MAX_GUARD_DEPTH`] are summarised
/// by a trailing `"..."`.
pub fn snapshot() -> Vec<&'static str> {
    let mut names = Vec::with_capacity(depth().min(MAX_GUARD_DEPTH + 1));
    let _ = FRAMES.try_with(|stack| {
        let depth = stack.depth.get();
        names.extend(
            stack.entries[..depth.min(MAX_GUARD_DEPTH)]
                .iter()
                .filter_map(|slot| slot.get().map(|entry| entry.name)),
        );
        if depth > MAX_GUARD_DEPTH {
            names.push(crate::report::ELIDED_SEGMENT);
        }
    });
    names
}

/// Calls `f` for every active frame, innermost first. Does not allocate.
pub(crate) fn visit_innermost_first(mut f: impl FnMut(FrameRef)) {
    let _ = FRAMES.try_with(|stack| {
        let depth = stack.depth.get();
        if depth > MAX_GUARD_DEPTH {
            f(FrameRef::Elided(depth - MAX_GUARD_DEPTH));
        }
        for slot in stack.entries[..depth.min(MAX_GUARD_DEPTH)].iter().rev() {
            if let Some(entry) = slot.get() {
                f(FrameRef::Entry(entry));
            }
        }
    });
}
