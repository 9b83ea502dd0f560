//! Error taxonomy and the diagnostic log abstraction.

use thiserror::Error;

/// A source location attached to a diagnostic message.
#[derive(Debug, Clone)]
pub struct MsgLocation {
    pub pretty_path: String,
    pub line: u32,
    pub column: u32,
}

/// Severity of a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    Error,
    Warning,
    Debug,
}

/// A single diagnostic message, with an optional primary location and
/// "note" locations (used by e.g. `AmbiguousImport`'s two "here" notes).
#[derive(Debug, Clone)]
pub struct Msg {
    pub kind: MsgKind,
    pub text: String,
    pub location: Option<MsgLocation>,
    pub notes: Vec<(String, Option<MsgLocation>)>,
}

/// Accumulates diagnostics for one linker run.
///
/// Callers short-circuit after Scan and after per-chunk printing if
/// [`Log::has_errors`] is true.
#[derive(Debug, Default)]
pub struct Log {
    messages: Vec<Msg>,
}

impl Log {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, text: impl Into<String>, location: Option<MsgLocation>) {
        self.messages.push(Msg {
            kind: MsgKind::Error,
            text: text.into(),
            location,
            notes: Vec::new(),
        });
    }

    pub fn error_with_notes(
        &mut self,
        text: impl Into<String>,
        location: Option<MsgLocation>,
        notes: Vec<(String, Option<MsgLocation>)>,
    ) {
        self.messages.push(Msg {
            kind: MsgKind::Error,
            text: text.into(),
            location,
            notes,
        });
    }

    pub fn warn(&mut self, text: impl Into<String>, location: Option<MsgLocation>) {
        self.messages.push(Msg {
            kind: MsgKind::Warning,
            text: text.into(),
            location,
            notes: Vec::new(),
        });
    }

    pub fn debug(&mut self, text: impl Into<String>, location: Option<MsgLocation>) {
        self.messages.push(Msg {
            kind: MsgKind::Debug,
            text: text.into(),
            location,
            notes: Vec::new(),
        });
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.kind == MsgKind::Error)
    }

    #[must_use]
    pub fn messages(&self) -> &[Msg] {
        &self.messages
    }

    pub fn extend(&mut self, other: Log) {
        self.messages.extend(other.messages);
    }
}

/// Fatal errors: conditions that abort the whole link, as opposed to
/// diagnostics recorded in [`Log`] (which may or may not be fatal
/// depending on [`MsgKind`]).
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("cyclic chunk import graph: {0}")]
    CyclicChunkImport(String),

    #[error("panic while printing \"{path}\": {text}")]
    InternalPanic { path: String, text: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("css error: {0}")]
    Css(String),

    #[error("{count} error(s) during link")]
    HadErrors { count: usize },
}

pub type LinkResult<T> = Result<T, LinkError>;
