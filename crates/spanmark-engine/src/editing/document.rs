use xi_rope::{Delta, Rope, RopeInfo, delta::DeltaElement};

use crate::editing::{Cmd, EditPatch, commands};
use crate::registry::SpanStyle;

/// A contiguous run of text carrying one formatting attribute.
///
/// Ranges are byte offsets into the plain-text projection. Spans are kept
/// sorted and normalized: identical styles never overlap or touch.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FormatSpan {
    pub style: SpanStyle,
    pub range: std::ops::Range<usize>,
}

impl FormatSpan {
    pub fn new(style: SpanStyle, range: std::ops::Range<usize>) -> Self {
        Self { style, range }
    }

    /// True if the span's range fully contains `range`.
    pub fn covers(&self, range: &std::ops::Range<usize>) -> bool {
        self.range.start <= range.start && range.end <= self.range.end
    }
}

/// The live form of a document: a rope buffer holding the plain-text
/// projection plus a normalized list of formatting spans over it.
///
/// The rope is the single source of truth for offsets. Markup never enters
/// the buffer, so a byte offset here is exactly the "logical offset" the
/// selection tracker hands around, and it stays valid across any re-render.
/// Text edits flow through [`Cmd`]s compiled to xi-rope deltas; spans and
/// the selection are transformed through each delta so formatting survives
/// arbitrary edits.
#[derive(Clone)]
pub struct SpanDoc {
    /// Plain-text projection (visible characters only).
    buffer: Rope,
    /// Sorted, normalized formatting spans.
    spans: Vec<FormatSpan>,
    /// Current selection/cursor position as byte offsets in the buffer.
    selection: std::ops::Range<usize>,
    /// Version counter incremented on each mutation (enables change detection).
    version: u64,
}

impl SpanDoc {
    pub fn new() -> Self {
        Self::from_text("")
    }

    pub fn from_text(text: &str) -> Self {
        Self::from_parts(text, Vec::new())
    }

    /// Builds a document from text and spans, normalizing the span list.
    pub fn from_parts(text: &str, spans: Vec<FormatSpan>) -> Self {
        let buffer = Rope::from(text);
        let len = buffer.len();
        let mut doc = Self {
            buffer,
            spans,
            selection: len..len,
            version: 0,
        };
        doc.normalize_spans();
        doc
    }

    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }

    pub fn spans(&self) -> &[FormatSpan] {
        &self.spans
    }

    pub fn selection(&self) -> std::ops::Range<usize> {
        self.selection.clone()
    }

    /// Sets the selection, clamping both ends into the buffer.
    pub fn set_selection(&mut self, selection: std::ops::Range<usize>) {
        let len = self.len();
        let start = selection.start.min(len);
        let end = selection.end.min(len).max(start);
        self.selection = start..end;
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Slice the buffer to a cow string, clamping the range to the buffer
    /// bounds to prevent a rope panic on stale ranges.
    pub fn slice(&self, range: std::ops::Range<usize>) -> std::borrow::Cow<'_, str> {
        let len = self.buffer.len();
        let start = range.start.min(len);
        let end = range.end.min(len).max(start);
        self.buffer.slice_to_cow(start..end)
    }

    /// Clamps an offset into `[0, len]` and down to the nearest char
    /// boundary. Out-of-range restore requests recover this way instead of
    /// failing (the content may have changed under the caller).
    pub fn clamp_offset(&self, offset: usize) -> usize {
        let text = self.text();
        let mut clamped = offset.min(text.len());
        while clamped > 0 && !text.is_char_boundary(clamped) {
            clamped -= 1;
        }
        if clamped != offset {
            log::debug!("clamped offset {} to {} (len {})", offset, clamped, text.len());
        }
        clamped
    }

    /// Apply a text edit command.
    ///
    /// Pipeline: compile the command to a delta, apply it to the buffer,
    /// transform every span and the selection through the delta, drop spans
    /// that collapsed to nothing, and bump the version.
    pub fn apply(&mut self, cmd: Cmd) -> EditPatch {
        let delta = commands::compile_command(self, &cmd);

        // Changed ranges in post-edit coordinates
        let mut changed = Vec::new();
        let mut new_pos = 0;
        for el in &delta.els {
            match el {
                DeltaElement::Copy(from, to) => {
                    new_pos += to - from;
                }
                DeltaElement::Insert(inserted) => {
                    changed.push(new_pos..new_pos + inserted.len());
                    new_pos += inserted.len();
                }
            }
        }

        let new_selection = commands::selection_after(self, &cmd);

        self.buffer = delta.apply(&self.buffer);
        self.transform_spans(&delta);
        self.set_selection(new_selection.clone());
        self.version += 1;

        EditPatch {
            changed,
            new_selection,
            version: self.version,
        }
    }

    /// Inserts a formatting span and re-normalizes. Bumps the version.
    pub fn insert_span(&mut self, span: FormatSpan) {
        self.spans.push(span);
        self.normalize_spans();
        self.version += 1;
    }

    /// Removes the span at `idx`, returning it. Bumps the version.
    pub fn remove_span(&mut self, idx: usize) -> FormatSpan {
        let span = self.spans.remove(idx);
        self.version += 1;
        span
    }

    /// Finds the span that fully covers `range` and answers to `format_id`,
    /// if any. This is the "already wrapped?" ancestor check of the toggle
    /// engine, expressed over spans instead of element ancestors.
    pub fn covering_span(
        &self,
        range: &std::ops::Range<usize>,
        format_id: crate::registry::FormatId,
    ) -> Option<usize> {
        self.spans
            .iter()
            .position(|s| s.style.matches(format_id) && s.covers(range))
    }

    /// The styles active at a given offset, in span order.
    pub fn styles_at(&self, offset: usize) -> Vec<&SpanStyle> {
        self.spans
            .iter()
            .filter(|s| s.range.start <= offset && offset < s.range.end)
            .map(|s| &s.style)
            .collect()
    }

    /// Sorts spans and merges overlapping or touching spans of identical
    /// style. Empty spans are dropped. Equal ranges keep insertion order so
    /// the span applied last stays innermost when rendered.
    pub fn normalize_spans(&mut self) {
        self.spans.retain(|s| s.range.start < s.range.end);
        self.spans
            .sort_by(|a, b| {
                a.range
                    .start
                    .cmp(&b.range.start)
                    .then(b.range.end.cmp(&a.range.end))
            });
        let mut merged: Vec<FormatSpan> = Vec::with_capacity(self.spans.len());
        for span in self.spans.drain(..) {
            if let Some(prev) = merged
                .iter_mut()
                .rev()
                .find(|p| p.style == span.style && p.range.end >= span.range.start)
            {
                prev.range.end = prev.range.end.max(span.range.end);
            } else {
                merged.push(span);
            }
        }
        self.spans = merged;
    }

    /// Transforms every span's endpoints through the delta.
    ///
    /// Span starts map with `after = true` and ends with `after = false`,
    /// so text inserted exactly at a span edge falls outside the span
    /// (typing at the boundary of bold text stays unformatted).
    fn transform_spans(&mut self, delta: &Delta<RopeInfo>) {
        for span in &mut self.spans {
            span.range.start = map_offset_through(delta, span.range.start, true);
            span.range.end = map_offset_through(delta, span.range.end, false);
        }
        self.normalize_spans();
    }
}

impl Default for SpanDoc {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpanDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanDoc")
            .field("text", &self.text())
            .field("spans", &self.spans)
            .field("selection", &self.selection)
            .field("version", &self.version)
            .finish()
    }
}

impl PartialEq for SpanDoc {
    fn eq(&self, other: &Self) -> bool {
        // Compare buffer content as strings; the rope itself has no
        // structural equality
        self.buffer.to_string() == other.buffer.to_string()
            && self.spans == other.spans
            && self.selection == other.selection
            && self.version == other.version
    }
}

/// Maps an offset in pre-delta coordinates to post-delta coordinates.
///
/// Walks the delta's `Copy`/`Insert` elements the way the old buffer is
/// consumed: gaps between copies are deletions, inserts extend the new
/// buffer. `after` decides which side of an insertion a coinciding offset
/// lands on.
pub(crate) fn map_offset_through(delta: &Delta<RopeInfo>, offset: usize, after: bool) -> usize {
    let mut old_pos = 0;
    let mut new_pos = 0;
    for el in &delta.els {
        match el {
            DeltaElement::Copy(from, to) => {
                if offset < *from && offset >= old_pos {
                    // Inside a deleted gap: collapse to the deletion point
                    return new_pos;
                }
                if offset >= *from && offset < *to {
                    return new_pos + (offset - from);
                }
                new_pos += to - from;
                old_pos = *to;
            }
            DeltaElement::Insert(node) => {
                if offset == old_pos && !after {
                    return new_pos;
                }
                new_pos += node.len();
            }
        }
    }
    // Offset at or past the end of the consumed old document
    new_pos
}
