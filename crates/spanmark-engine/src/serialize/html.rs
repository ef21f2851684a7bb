//! Lenient parser for the persisted HTML subset.
//!
//! Recognized tags map to span styles; everything else degrades without
//! data loss: unknown tags are dropped but their content is kept, entities
//! are decoded, a `<` that doesn't scan as a tag stays literal text, and
//! elements left open at end of input are auto-closed the way a DOM parser
//! would nest them.

use std::sync::OnceLock;

use regex::Regex;

use crate::SpanDoc;
use crate::editing::FormatSpan;
use crate::registry::{self, SpanStyle, tags};

struct ScannedTag {
    name: String,
    closing: bool,
    self_closing: bool,
    attrs: String,
}

struct OpenElement {
    name: String,
    styles: Vec<SpanStyle>,
    start: usize,
}

/// Parses the HTML subset into a span buffer.
pub(crate) fn parse_html(input: &str) -> SpanDoc {
    let mut text = String::new();
    let mut raw = String::new();
    let mut open: Vec<OpenElement> = Vec::new();
    let mut spans: Vec<FormatSpan> = Vec::new();

    let flush = |raw: &mut String, text: &mut String| {
        if !raw.is_empty() {
            text.push_str(&html_escape::decode_html_entities(raw));
            raw.clear();
        }
    };

    let mut i = 0;
    while i < input.len() {
        if input.as_bytes()[i] == b'<'
            && let Some((tag, next)) = scan_tag(input, i)
        {
            flush(&mut raw, &mut text);
            handle_tag(tag, &mut text, &mut open, &mut spans);
            i = next;
            continue;
        }
        let Some(ch) = input[i..].chars().next() else {
            break;
        };
        raw.push(ch);
        i += ch.len_utf8();
    }
    flush(&mut raw, &mut text);

    // Auto-close whatever is still open
    while let Some(el) = open.pop() {
        close_element(el, text.len(), &mut spans);
    }

    SpanDoc::from_parts(&text, spans)
}

fn handle_tag(
    tag: ScannedTag,
    text: &mut String,
    open: &mut Vec<OpenElement>,
    spans: &mut Vec<FormatSpan>,
) {
    if tag.closing {
        let Some(idx) = open.iter().rposition(|e| e.name == tag.name) else {
            return; // stray closing tag
        };
        // Close unclosed children along the way, DOM-style
        while open.len() > idx {
            if let Some(el) = open.pop() {
                close_element(el, text.len(), spans);
            }
        }
        return;
    }

    if tag.name == tags::BREAK {
        text.push('\n');
        return;
    }
    if tags::VOID.contains(&tag.name.as_str()) || tag.self_closing {
        return;
    }

    let styles = styles_for_open_tag(&tag, open);
    open.push(OpenElement {
        name: tag.name,
        styles,
        start: text.len(),
    });
}

fn styles_for_open_tag(tag: &ScannedTag, open: &[OpenElement]) -> Vec<SpanStyle> {
    if tag.name == tags::PRE {
        return vec![SpanStyle::Code { block: true }];
    }
    if tag.name == tags::CODE {
        // A code element inside pre is part of the block wrapper, not a
        // second code span
        if open.iter().any(|e| e.name == tags::PRE) {
            return Vec::new();
        }
        return vec![SpanStyle::Code { block: false }];
    }
    if tag.name == tags::ANCHOR {
        return match attr_value(&tag.attrs, AttrKind::Href) {
            Some(url) => vec![SpanStyle::Link { url }],
            None => Vec::new(),
        };
    }
    if tag.name == tags::SPAN {
        return attr_value(&tag.attrs, AttrKind::Style)
            .map(|css| styles_from_css(&css))
            .unwrap_or_default();
    }
    registry::style_for_basic_tag(&tag.name)
        .map(|s| vec![s])
        .unwrap_or_default()
}

fn close_element(el: OpenElement, end: usize, spans: &mut Vec<FormatSpan>) {
    for style in el.styles {
        spans.push(FormatSpan::new(style, el.start..end));
    }
}

/// Scans one tag starting at the `<` at `at`. Returns the tag and the index
/// just past the `>`, or `None` when the text does not form a tag (in which
/// case the `<` stays literal).
fn scan_tag(input: &str, at: usize) -> Option<(ScannedTag, usize)> {
    let rel = input[at..].find('>')?;
    let body = &input[at + 1..at + rel];
    if body.is_empty() {
        return None;
    }
    let closing = body.starts_with('/');
    let body = body.strip_prefix('/').unwrap_or(body);
    let self_closing = body.ends_with('/');
    let body = body.strip_suffix('/').unwrap_or(body);

    let name_len = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .count();
    if name_len == 0 {
        return None;
    }
    let name = body[..name_len].to_ascii_lowercase();
    let attrs = body[name_len..].to_string();
    Some((
        ScannedTag {
            name,
            closing,
            self_closing,
            attrs,
        },
        at + rel + 1,
    ))
}

enum AttrKind {
    Href,
    Style,
}

fn attr_value(attrs: &str, kind: AttrKind) -> Option<String> {
    static HREF_RE: OnceLock<Regex> = OnceLock::new();
    static STYLE_RE: OnceLock<Regex> = OnceLock::new();
    let re = match kind {
        AttrKind::Href => HREF_RE.get_or_init(|| {
            Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
                .expect("static regex")
        }),
        AttrKind::Style => STYLE_RE.get_or_init(|| {
            Regex::new(r#"(?i)\bstyle\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
                .expect("static regex")
        }),
    };
    let caps = re.captures(attrs)?;
    let value = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))?;
    Some(html_escape::decode_html_entities(value.as_str()).into_owned())
}

/// Extracts color declarations from an inline style attribute. Anything
/// other than `color` and `background-color` is ignored.
fn styles_from_css(css: &str) -> Vec<SpanStyle> {
    let mut styles = Vec::new();
    for decl in css.split(';') {
        let Some((key, value)) = decl.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim().to_ascii_lowercase().as_str() {
            "color" => styles.push(SpanStyle::Color(value.to_string())),
            "background-color" | "background" => {
                styles.push(SpanStyle::Background(value.to_string()))
            }
            _ => {}
        }
    }
    styles
}
