/*!
 * # Content Serializer
 *
 * Converts between the persisted hybrid string and the live span buffer.
 *
 * The persisted form is a single string that is either raw HTML or a small
 * markdown subset; no schema field distinguishes the two. The sole
 * discriminator is "does the string contain a `<...>` tag", and it must be
 * preserved exactly for backward compatibility with previously stored
 * content. Literal angle-bracket or `**` text can therefore misclassify;
 * that ambiguity is detected and logged, never auto-corrected.
 *
 * - **`markdown`**: fixed-order substitution passes for the subset
 * - **`html`**: lenient single-pass parser for the tag subset
 * - **`render`**: span buffer back to a persisted string
 *
 * Round-trip contract: `to_persisted(&to_live(x))` may rewrite equivalent
 * markup (a markdown `**a**` becomes `<strong>a</strong>` once edited) but
 * re-loading it reproduces the same visible text and the same format spans.
 * Whitespace and newlines pass through verbatim in both directions.
 */

mod html;
mod markdown;
mod render;

use std::sync::OnceLock;

use regex::Regex;

use crate::SpanDoc;
use crate::registry::markers;

/// Loads a persisted string into the live span-buffer form.
pub fn to_live(persisted: &str) -> SpanDoc {
    if looks_like_html(persisted) {
        if looks_like_markdown(persisted) {
            log::warn!(
                "persisted content mixes HTML markup and markdown-style delimiters; loading as HTML"
            );
        }
        html::parse_html(persisted)
    } else {
        markdown::parse_markdown(persisted)
    }
}

/// Serializes the live form back to a persisted string.
///
/// A document with no formatting is emitted verbatim so plain text
/// round-trips byte-for-byte. Formatted documents are emitted as HTML.
pub fn to_persisted(doc: &SpanDoc) -> String {
    render::render(doc)
}

/// Canonical form of a persisted string: load it and serialize it back.
pub fn normalize(persisted: &str) -> String {
    to_persisted(&to_live(persisted))
}

/// The markup discriminator: any `<...>` pair marks the string as HTML.
fn looks_like_html(s: &str) -> bool {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| Regex::new(r"<[^<>]+>").expect("static regex"));
    re.is_match(s)
}

fn looks_like_markdown(s: &str) -> bool {
    s.contains(markers::BOLD) || s.contains(markers::STRIKETHROUGH) || s.contains(markers::CODE)
}
