//! Format toggling over the span buffer.
//!
//! Given a selection and a format id, decides whether to apply or remove
//! the format and performs the structural edit. The "already wrapped?"
//! ancestor walk of a DOM implementation becomes a covering-span lookup
//! here; unwrapping removes the covering span wholesale, which is what
//! makes re-selecting bold text and clicking Bold remove bold instead of
//! nesting it.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::editing::{Cmd, EditPatch, FormatSpan, SpanDoc};
use crate::registry::{FormatId, SpanStyle};
use crate::selection::Selection;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToggleError {
    /// A format action was invoked with an empty or absent selection.
    /// Recovered by the caller as a non-fatal "select text first" notice.
    #[error("no active selection")]
    NoSelection,
    #[error("not a valid URL: {0}")]
    InvalidUrl(String),
    #[error("format `{0}` requires a value")]
    MissingValue(FormatId),
}

/// Toggles `format_id` on the current selection.
///
/// Link is deliberately asymmetric: instead of creating a link span it
/// replaces the selection with the literal markdown `[text](url)`, which is
/// what keeps the hybrid persisted form round-trippable. Do not "fix" this
/// to produce an anchor.
pub fn toggle(
    doc: &mut SpanDoc,
    selection: Selection,
    format_id: FormatId,
    value: Option<&str>,
    default_scheme: &str,
) -> Result<EditPatch, ToggleError> {
    let selection = clamp_selection(doc, selection)?;
    let range = selection.as_range();

    // Already wrapped and toggleable: unwrap the covering span
    if format_id.is_toggleable()
        && let Some(idx) = doc.covering_span(&range, format_id)
    {
        let removed = doc.remove_span(idx);
        let caret = removed.range.end;
        doc.set_selection(caret..caret);
        return Ok(EditPatch {
            changed: vec![removed.range],
            new_selection: doc.selection(),
            version: doc.version(),
        });
    }

    if format_id == FormatId::Link {
        let url = normalize_url(value, default_scheme)?;
        let label = doc.slice(range.clone()).into_owned();
        let literal = format!("[{label}]({url})");
        return Ok(doc.apply(Cmd::ReplaceRange {
            range,
            text: literal,
        }));
    }

    let mut style =
        SpanStyle::from_parts(format_id, value).map_err(|_| ToggleError::MissingValue(format_id))?;
    if let SpanStyle::Code { block } = &mut style {
        *block = doc.slice(range.clone()).contains('\n');
    }

    doc.insert_span(FormatSpan::new(style, range.clone()));
    doc.set_selection(range.end..range.end);
    Ok(EditPatch {
        changed: vec![range],
        new_selection: doc.selection(),
        version: doc.version(),
    })
}

/// Normalizes a URL for the link dialog: trims, rejects empty or
/// whitespace-bearing input, and prefixes a bare host with the default
/// scheme. Returns the absolute URL to embed.
pub fn normalize_url(value: Option<&str>, default_scheme: &str) -> Result<String, ToggleError> {
    static SCHEME_RE: OnceLock<Regex> = OnceLock::new();
    let re = SCHEME_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:").expect("static regex"));

    let raw = value.ok_or(ToggleError::MissingValue(FormatId::Link))?.trim();
    if raw.is_empty() || raw.chars().any(char::is_whitespace) {
        return Err(ToggleError::InvalidUrl(raw.to_string()));
    }
    if re.is_match(raw) {
        Ok(raw.to_string())
    } else {
        Ok(format!("{default_scheme}://{raw}"))
    }
}

/// Rejects empty and out-of-surface selections, clamping a partially
/// overlapping one into the buffer.
fn clamp_selection(doc: &SpanDoc, selection: Selection) -> Result<Selection, ToggleError> {
    if selection.start >= doc.len() {
        return Err(ToggleError::NoSelection);
    }
    let clamped = Selection::new(selection.start, selection.end.min(doc.len()));
    if clamped.is_empty() {
        return Err(ToggleError::NoSelection);
    }
    Ok(clamped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize;

    const SCHEME: &str = "https";

    fn toggle_ok(doc: &mut SpanDoc, sel: (usize, usize), id: FormatId, value: Option<&str>) {
        toggle(doc, Selection::new(sel.0, sel.1), id, value, SCHEME)
            .expect("toggle should succeed");
    }

    #[test]
    fn bold_applies_to_a_selection() {
        let mut doc = SpanDoc::from_text("Hello world");
        toggle_ok(&mut doc, (6, 11), FormatId::Bold, None);
        assert_eq!(serialize::to_persisted(&doc), "Hello <strong>world</strong>");
    }

    #[test]
    fn re_toggling_bold_removes_it() {
        let mut doc = SpanDoc::from_text("Hello world");
        toggle_ok(&mut doc, (6, 11), FormatId::Bold, None);
        toggle_ok(&mut doc, (6, 11), FormatId::Bold, None);
        assert!(doc.spans().is_empty());
        assert_eq!(serialize::to_persisted(&doc), "Hello world");
    }

    #[test]
    fn toggle_is_idempotent_for_every_toggleable_format() {
        for id in FormatId::ALL.into_iter().filter(|id| id.is_toggleable()) {
            let mut doc = SpanDoc::from_text("Hello world");
            let before = doc.clone();
            toggle_ok(&mut doc, (2, 7), id, None);
            toggle_ok(&mut doc, (2, 7), id, None);
            assert_eq!(doc.text(), before.text(), "text changed for {id}");
            assert_eq!(doc.spans(), before.spans(), "spans changed for {id}");
        }
    }

    #[test]
    fn sub_selection_of_formatted_text_unwraps_whole_span() {
        let mut doc = SpanDoc::from_text("Hello world");
        toggle_ok(&mut doc, (0, 11), FormatId::Bold, None);
        // Re-selecting just "world" still removes the whole wrapping span
        toggle_ok(&mut doc, (6, 11), FormatId::Bold, None);
        assert!(doc.spans().is_empty());
    }

    #[test]
    fn caret_lands_after_unwrapped_content() {
        let mut doc = SpanDoc::from_text("Hello world");
        toggle_ok(&mut doc, (6, 11), FormatId::Bold, None);
        toggle_ok(&mut doc, (6, 9), FormatId::Bold, None);
        assert_eq!(doc.selection(), 11..11);
    }

    #[test]
    fn empty_selection_is_rejected() {
        let mut doc = SpanDoc::from_text("Hello");
        let err = toggle(&mut doc, Selection::caret(3), FormatId::Bold, None, SCHEME);
        assert_eq!(err.unwrap_err(), ToggleError::NoSelection);
    }

    #[test]
    fn selection_outside_surface_is_rejected() {
        let mut doc = SpanDoc::from_text("Hello");
        let err = toggle(&mut doc, Selection::new(10, 20), FormatId::Bold, None, SCHEME);
        assert_eq!(err.unwrap_err(), ToggleError::NoSelection);
    }

    #[test]
    fn code_upgrades_to_block_when_selection_spans_lines() {
        let mut doc = SpanDoc::from_text("a\nb and c");
        toggle_ok(&mut doc, (0, 3), FormatId::Code, None);
        assert_eq!(doc.spans()[0].style, SpanStyle::Code { block: true });

        let mut doc = SpanDoc::from_text("a b");
        toggle_ok(&mut doc, (0, 3), FormatId::Code, None);
        assert_eq!(doc.spans()[0].style, SpanStyle::Code { block: false });
    }

    #[test]
    fn link_inserts_markdown_literal_not_a_span() {
        let mut doc = SpanDoc::from_text("Hello world");
        toggle_ok(&mut doc, (6, 11), FormatId::Link, Some("example.com"));
        assert_eq!(doc.text(), "Hello [world](https://example.com)");
        assert!(doc.spans().is_empty());
        assert_eq!(
            serialize::to_persisted(&doc),
            "Hello [world](https://example.com)"
        );
    }

    #[test]
    fn link_with_scheme_is_kept_verbatim() {
        let mut doc = SpanDoc::from_text("Hello world");
        toggle_ok(&mut doc, (6, 11), FormatId::Link, Some("http://e.com/x"));
        assert_eq!(doc.text(), "Hello [world](http://e.com/x)");
    }

    #[test]
    fn invalid_urls_are_rejected_without_mutation() {
        for bad in ["", "   ", "two words"] {
            let mut doc = SpanDoc::from_text("Hello world");
            let before = doc.clone();
            let err = toggle(
                &mut doc,
                Selection::new(6, 11),
                FormatId::Link,
                Some(bad),
                SCHEME,
            );
            assert!(matches!(err, Err(ToggleError::InvalidUrl(_))));
            assert_eq!(doc, before);
        }
    }

    #[test]
    fn color_requires_a_value() {
        let mut doc = SpanDoc::from_text("Hello");
        let err = toggle(&mut doc, Selection::new(0, 5), FormatId::Color, None, SCHEME);
        assert_eq!(err.unwrap_err(), ToggleError::MissingValue(FormatId::Color));
    }

    #[test]
    fn recoloring_keeps_the_newer_color_innermost() {
        let mut doc = SpanDoc::from_text("x");
        toggle_ok(&mut doc, (0, 1), FormatId::Color, Some("red"));
        toggle_ok(&mut doc, (0, 1), FormatId::Color, Some("blue"));
        assert_eq!(
            serialize::to_persisted(&doc),
            r#"<span style="color: red"><span style="color: blue">x</span></span>"#
        );
    }

    #[test]
    fn url_normalization_rules() {
        assert_eq!(
            normalize_url(Some("example.com"), "https").unwrap(),
            "https://example.com"
        );
        assert_eq!(
            normalize_url(Some("  http://a.b  "), "https").unwrap(),
            "http://a.b"
        );
        assert_eq!(
            normalize_url(Some("mailto:a@b.c"), "https").unwrap(),
            "mailto:a@b.c"
        );
        assert!(normalize_url(Some(""), "https").is_err());
        assert!(normalize_url(None, "https").is_err());
    }
}
