use xi_rope::{Delta, Rope, RopeInfo, delta::Builder};

use crate::editing::SpanDoc;

/// Edit commands over the plain-text projection.
///
/// Ranges and offsets are byte offsets into the buffer; callers are expected
/// to pass char-boundary-aligned values (the surface produces them from the
/// selection tracker).
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    InsertText { at: usize, text: String },
    DeleteRange { range: std::ops::Range<usize> },
    ReplaceRange { range: std::ops::Range<usize>, text: String },
}

/// Compiles a command into an invertible xi-rope delta.
///
/// Out-of-bounds ranges are clamped to the buffer rather than panicking;
/// the clamp mirrors `SpanDoc::slice` behavior.
pub(crate) fn compile_command(doc: &SpanDoc, cmd: &Cmd) -> Delta<RopeInfo> {
    let len = doc.len();
    let clamp = |range: &std::ops::Range<usize>| {
        let start = range.start.min(len);
        let end = range.end.min(len).max(start);
        start..end
    };

    let mut builder = Builder::new(len);
    match cmd {
        Cmd::InsertText { at, text } => {
            let at = (*at).min(len);
            builder.replace(at..at, Rope::from(text.as_str()));
        }
        Cmd::DeleteRange { range } => {
            builder.delete(clamp(range));
        }
        Cmd::ReplaceRange { range, text } => {
            builder.replace(clamp(range), Rope::from(text.as_str()));
        }
    }
    builder.build()
}

/// Where the caret lands after a command: immediately after inserted text,
/// or at the start of a deletion.
pub(crate) fn selection_after(doc: &SpanDoc, cmd: &Cmd) -> std::ops::Range<usize> {
    let len = doc.len();
    match cmd {
        Cmd::InsertText { at, text } => {
            let caret = (*at).min(len) + text.len();
            caret..caret
        }
        Cmd::DeleteRange { range } => {
            let caret = range.start.min(len);
            caret..caret
        }
        Cmd::ReplaceRange { range, text } => {
            let caret = range.start.min(len) + text.len();
            caret..caret
        }
    }
}
