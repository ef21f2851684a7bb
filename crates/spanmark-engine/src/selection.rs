//! Selection tracking over the plain-text projection.
//!
//! Host-framework node/offset pairs are invalidated whenever a surface
//! re-renders, so all cross-render selection state is offset-based. This
//! module converts between pointer positions, raw anchor/focus pairs, and
//! logical offsets.

use serde::{Deserialize, Serialize};

use crate::SpanDoc;
use crate::geom::{Point, Rect};

/// A normalized selection: `start <= end`, collapsed when equal.
///
/// Collapsed selections are carets; they never trigger the floating toolbar
/// or formatting actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    /// Builds a selection from two endpoints in either order.
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    pub fn caret(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl From<std::ops::Range<usize>> for Selection {
    fn from(r: std::ops::Range<usize>) -> Self {
        Selection::new(r.start, r.end)
    }
}

/// One visible character in a laid-out text run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    /// Length of the character in bytes.
    pub byte_len: usize,
    /// Horizontal advance width.
    pub advance: f32,
}

/// A laid-out fragment of text: one visual line (or part of one) with its
/// on-screen rect and per-character advances.
///
/// The renderer produces these; only visible characters appear. Line breaks
/// contribute nothing here because the canonical `\n` already lives in the
/// buffer between consecutive runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    /// Byte offset in the projection where this run starts.
    pub start: usize,
    pub rect: Rect,
    pub glyphs: Vec<Glyph>,
}

impl TextRun {
    /// Byte offset just past the last character of the run.
    pub fn end(&self) -> usize {
        self.start + self.glyphs.iter().map(|g| g.byte_len).sum::<usize>()
    }
}

/// The geometry the rendering adapter reports for the current frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceLayout {
    pub runs: Vec<TextRun>,
}

impl SurfaceLayout {
    /// Rect of the caret slot at `offset`, if the offset falls inside a run.
    /// Used to anchor the floating toolbar.
    pub fn caret_rect(&self, offset: usize) -> Option<Rect> {
        for run in &self.runs {
            if offset < run.start || offset > run.end() {
                continue;
            }
            let mut x = run.rect.x;
            let mut pos = run.start;
            for glyph in &run.glyphs {
                if pos >= offset {
                    break;
                }
                x += glyph.advance;
                pos += glyph.byte_len;
            }
            return Some(Rect::new(x, run.rect.y, 1.0, run.rect.height));
        }
        None
    }
}

/// Maps a pointer position to a logical offset.
///
/// Picks the run under the pointer (or the nearest one when the pointer is
/// in a margin), then walks the run's advances and snaps to the closest
/// character boundary, so a click between two characters lands between
/// them. Returns 0 for an empty layout: an empty surface is a valid caret
/// at offset zero.
pub fn capture_click_offset(layout: &SurfaceLayout, point: Point) -> usize {
    let Some(run) = nearest_run(layout, point) else {
        return 0;
    };

    let mut x = run.rect.x;
    let mut pos = run.start;
    for glyph in &run.glyphs {
        if point.x < x + glyph.advance / 2.0 {
            return pos;
        }
        x += glyph.advance;
        pos += glyph.byte_len;
    }
    pos
}

fn nearest_run<'a>(layout: &'a SurfaceLayout, point: Point) -> Option<&'a TextRun> {
    if let Some(hit) = layout.runs.iter().find(|r| r.rect.contains(point)) {
        return Some(hit);
    }
    // Outside any run: closest vertical band wins, then horizontal distance
    layout.runs.iter().min_by(|a, b| {
        let da = band_distance(&a.rect, point);
        let db = band_distance(&b.rect, point);
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    })
}

fn band_distance(rect: &Rect, point: Point) -> (f32, f32) {
    let dy = if point.y < rect.y {
        rect.y - point.y
    } else if point.y >= rect.bottom() {
        point.y - rect.bottom()
    } else {
        0.0
    };
    let dx = if point.x < rect.x {
        rect.x - point.x
    } else if point.x >= rect.right() {
        point.x - rect.right()
    } else {
        0.0
    };
    (dy, dx)
}

/// Places a collapsed selection at `offset`, clamping out-of-range requests
/// to the nearest valid boundary. Returns the offset actually used.
pub fn restore_cursor(doc: &mut SpanDoc, offset: usize) -> usize {
    let clamped = doc.clamp_offset(offset);
    doc.set_selection(clamped..clamped);
    clamped
}

/// Maps a raw anchor/focus pair to a normalized selection over a surface of
/// `len` bytes. Returns `None` when the range lies entirely outside the
/// surface; partial overlap clamps.
pub fn normalize_selection(len: usize, anchor: usize, focus: usize) -> Option<Selection> {
    let lo = anchor.min(focus);
    let hi = anchor.max(focus);
    if lo > len {
        return None;
    }
    Some(Selection::new(lo, hi.min(len)))
}
