// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Report formatting shared by every backend.
//!
//! A report is rendered by writing the cause and then prefixing one `"<segment>: "` per frame,
//! innermost first. The call path is built the same way with `/` separators. Both backends go
//! through [`ReportBuilder`], so the text they produce is byte-for-byte identical.

pub(crate) mod atomguard;
pub(crate) mod fatal;
pub(crate) mod sink;

use crate::context::frames::{FrameMessage, FrameRef};
use crate::context::history::{FixedBuf, ERROR_HISTORY_CAPACITY};
use serde::Serialize;
use std::fmt::{self, Write};
use std::panic::{self, AssertUnwindSafe};

/// Longest rendered frame message; longer ones are truncated.
pub(crate) const MAX_MESSAGE_LEN: usize = 256;
/// Longest rendered segment (`name (message)`).
const MAX_SEGMENT_LEN: usize = 512;
/// Longest rendered call path.
pub(crate) const MAX_PATH_LEN: usize = 1024;

/// Separator written after each segment.
pub const SEGMENT_SEPARATOR: &str = ": ";
/// Separator between frame names in the call path.
pub const PATH_SEPARATOR: &str = "/";
/// Call path shown when no guarded region was active.
pub const EMPTY_PATH: &str = "<none>";
/// Stand-in for frames too deep to be recorded by name.
pub const ELIDED_SEGMENT: &str = "...";
/// Stand-in for a frame message whose formatter panicked.
pub const MESSAGE_FAILED: &str = "<message failed>";

/// Where a fatal report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Origin {
    /// A language-level failure (panic or `raise!`) captured at guard boundaries.
    Panic,
    /// An OS fault delivered as the given signal.
    Signal(i32),
    /// A direct call to the fatal error path.
    Fatal,
}

/// One guarded frame as carried by an in-flight report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Segment {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            message: None,
        }
    }

    /// Builds the segment for a frame, formatting its message now.
    pub(crate) fn capture(name: &'static str, message: Option<&dyn FrameMessage>) -> Self {
        Self {
            name,
            message: message.map(|message| render_message(message).as_str().to_owned()),
        }
    }
}

/// A failure on its way out through guard boundaries.
///
/// `path` is ordered outermost first; each boundary adds itself in front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedReport {
    pub cause: String,
    pub path: Vec<Segment>,
}

impl CapturedReport {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            path: vec![],
        }
    }

    /// Adds an enclosing frame.
    pub fn prepend(&mut self, segment: Segment) {
        self.path.insert(0, segment);
    }

    pub fn path_string(&self) -> String {
        self.builder().path().to_owned()
    }

    /// The combined description, e.g. `A: B: C: divide by zero`.
    pub fn text(&self) -> String {
        self.builder().text().to_owned()
    }

    pub(crate) fn builder(&self) -> ReportBuilder<'_> {
        let mut builder = ReportBuilder::new(&self.cause);
        for segment in self.path.iter().rev() {
            builder.prepend(segment.name, segment.message.as_deref());
        }
        builder
    }
}

fn render_message(message: &dyn FrameMessage) -> FixedBuf<MAX_MESSAGE_LEN> {
    let rendered = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut rendered = FixedBuf::new();
        // A formatter returning an error leaves whatever it managed to write.
        let _ = message.write_message(&mut rendered);
        rendered
    }));
    // A panicking one must not replace the report in flight.
    rendered.unwrap_or_else(|_| {
        let mut rendered = FixedBuf::new();
        rendered.set(MESSAGE_FAILED);
        rendered
    })
}

fn write_segment(w: &mut dyn Write, name: &str, message: Option<&str>) -> fmt::Result {
    match message {
        Some(message) => write!(w, "{name} ({message})"),
        None => w.write_str(name),
    }
}

/// Allocation-free report renderer.
pub(crate) struct ReportBuilder<'a> {
    cause: &'a str,
    text: FixedBuf<ERROR_HISTORY_CAPACITY>,
    path: FixedBuf<MAX_PATH_LEN>,
}

impl<'a> ReportBuilder<'a> {
    pub(crate) fn new(cause: &'a str) -> Self {
        let mut text = FixedBuf::new();
        text.set(cause);
        Self {
            cause,
            text,
            path: FixedBuf::new(),
        }
    }

    /// Adds the next enclosing frame, so frames must be fed innermost first.
    pub(crate) fn prepend(&mut self, name: &str, message: Option<&str>) {
        let mut segment = FixedBuf::<MAX_SEGMENT_LEN>::new();
        let _ = write_segment(&mut segment, name, message);
        segment.push_str(SEGMENT_SEPARATOR);
        self.text.prefix(segment.as_str());

        if !self.path.is_empty() {
            self.path.prefix(PATH_SEPARATOR);
        }
        self.path.prefix(name);
    }

    pub(crate) fn prepend_frame(&mut self, frame: FrameRef) {
        match frame {
            FrameRef::Entry(entry) => match entry.message() {
                Some(message) => {
                    let message = render_message(message);
                    self.prepend(entry.name, Some(message.as_str()));
                }
                None => self.prepend(entry.name, None),
            },
            FrameRef::Elided(_) => self.prepend(ELIDED_SEGMENT, None),
        }
    }

    pub(crate) fn cause(&self) -> &str {
        self.cause
    }

    pub(crate) fn text(&self) -> &str {
        self.text.as_str()
    }

    pub(crate) fn path(&self) -> &str {
        if self.path.is_empty() {
            EMPTY_PATH
        } else {
            self.path.as_str()
        }
    }

    pub(crate) fn finish(&self, origin: Origin) -> FatalReport<'_> {
        FatalReport {
            text: self.text(),
            path: self.path(),
            cause: self.cause(),
            origin,
        }
    }
}

/// The completed report handed to the [`ReportSink`](crate::ReportSink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FatalReport<'a> {
    /// Frames and cause joined, as stored in the error history buffer.
    pub text: &'a str,
    /// Frame names joined with `/`, outermost first.
    pub path: &'a str,
    pub cause: &'a str,
    pub origin: Origin,
}
