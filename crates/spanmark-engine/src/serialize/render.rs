//! Renders a span buffer back to the persisted string form.
//!
//! A document with no spans is emitted verbatim — plain text must
//! round-trip byte-for-byte, and emitting no markup keeps the string on the
//! markdown side of the discriminator. Once spans exist the output is HTML:
//! text segments are entity-escaped and spans become their registry tags,
//! split at span boundaries so the result is always well nested even when
//! spans partially overlap.

use std::cmp::Reverse;

use crate::SpanDoc;
use crate::registry::SpanStyle;

pub(crate) fn render(doc: &SpanDoc) -> String {
    let text = doc.text();
    let spans = doc.spans();
    if spans.is_empty() {
        return text;
    }

    let mut bounds: Vec<usize> = vec![0, text.len()];
    bounds.extend(spans.iter().flat_map(|s| [s.range.start, s.range.end]));
    bounds.sort_unstable();
    bounds.dedup();

    let mut out = String::new();
    let mut stack: Vec<usize> = Vec::new();

    for window in bounds.windows(2) {
        let (a, b) = (window[0], window[1]);

        let mut desired: Vec<usize> = (0..spans.len())
            .filter(|&i| spans[i].range.start <= a && b <= spans[i].range.end)
            .collect();
        desired.sort_by_key(|&i| {
            (
                spans[i].range.start,
                Reverse(spans[i].range.end),
                spans[i].style.rank(),
                i,
            )
        });

        // Close until the stack is a prefix of the desired nesting, then
        // open whatever is missing
        while !stack.is_empty()
            && (stack.len() > desired.len() || stack[..] != desired[..stack.len()])
        {
            if let Some(i) = stack.pop() {
                out.push_str(&closing_tag(&spans[i].style));
            }
        }
        for &i in &desired[stack.len()..] {
            out.push_str(&opening_tag(&spans[i].style));
            stack.push(i);
        }

        out.push_str(&html_escape::encode_text(&text[a..b]));
    }

    while let Some(i) = stack.pop() {
        out.push_str(&closing_tag(&spans[i].style));
    }
    out
}

fn opening_tag(style: &SpanStyle) -> String {
    match style {
        SpanStyle::Bold => "<strong>".to_string(),
        SpanStyle::Italic => "<em>".to_string(),
        SpanStyle::Underline => "<u>".to_string(),
        SpanStyle::Strikethrough => "<s>".to_string(),
        SpanStyle::Code { block: false } => "<code>".to_string(),
        SpanStyle::Code { block: true } => "<pre><code>".to_string(),
        SpanStyle::Link { url } => format!(
            r#"<a href="{}">"#,
            html_escape::encode_double_quoted_attribute(url)
        ),
        SpanStyle::Color(v) => format!(
            r#"<span style="color: {}">"#,
            html_escape::encode_double_quoted_attribute(v)
        ),
        SpanStyle::Background(v) => format!(
            r#"<span style="background-color: {}">"#,
            html_escape::encode_double_quoted_attribute(v)
        ),
    }
}

fn closing_tag(style: &SpanStyle) -> String {
    match style {
        SpanStyle::Bold => "</strong>".to_string(),
        SpanStyle::Italic => "</em>".to_string(),
        SpanStyle::Underline => "</u>".to_string(),
        SpanStyle::Strikethrough => "</s>".to_string(),
        SpanStyle::Code { block: false } => "</code>".to_string(),
        SpanStyle::Code { block: true } => "</code></pre>".to_string(),
        SpanStyle::Link { .. } => "</a>".to_string(),
        SpanStyle::Color(_) | SpanStyle::Background(_) => "</span>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editing::FormatSpan;

    fn doc(text: &str, spans: Vec<(SpanStyle, std::ops::Range<usize>)>) -> SpanDoc {
        SpanDoc::from_parts(
            text,
            spans
                .into_iter()
                .map(|(style, range)| FormatSpan::new(style, range))
                .collect(),
        )
    }

    #[test]
    fn no_spans_emits_text_verbatim() {
        let d = doc("a < b & c\nnext line", vec![]);
        assert_eq!(render(&d), "a < b & c\nnext line");
    }

    #[test]
    fn single_span_wraps_its_range() {
        let d = doc("Hello world", vec![(SpanStyle::Bold, 6..11)]);
        assert_eq!(render(&d), "Hello <strong>world</strong>");
    }

    #[test]
    fn text_is_escaped_once_markup_exists() {
        let d = doc("a < b", vec![(SpanStyle::Bold, 0..1)]);
        assert_eq!(render(&d), "<strong>a</strong> &lt; b");
    }

    #[test]
    fn nested_spans_nest_tags() {
        let d = doc(
            "ab",
            vec![(SpanStyle::Bold, 0..2), (SpanStyle::Italic, 1..2)],
        );
        assert_eq!(render(&d), "<strong>a<em>b</em></strong>");
    }

    #[test]
    fn partially_overlapping_spans_split_into_well_nested_tags() {
        let d = doc(
            "abcd",
            vec![(SpanStyle::Bold, 0..3), (SpanStyle::Italic, 2..4)],
        );
        assert_eq!(
            render(&d),
            "<strong>ab<em>c</em></strong><em>d</em>"
        );
    }

    #[test]
    fn link_href_is_attribute_escaped() {
        let d = doc(
            "x",
            vec![(
                SpanStyle::Link {
                    url: "https://e.com/?a=1&b=\"2\"".to_string(),
                },
                0..1,
            )],
        );
        assert_eq!(
            render(&d),
            r#"<a href="https://e.com/?a=1&amp;b=&quot;2&quot;">x</a>"#
        );
    }

    #[test]
    fn same_range_spans_keep_application_order() {
        let d = doc(
            "x",
            vec![
                (SpanStyle::Color("red".to_string()), 0..1),
                (SpanStyle::Color("blue".to_string()), 0..1),
            ],
        );
        // The later-applied color is innermost, so it wins
        assert_eq!(
            render(&d),
            r#"<span style="color: red"><span style="color: blue">x</span></span>"#
        );
    }

    #[test]
    fn block_code_uses_pre_wrapper() {
        let d = doc("a\nb", vec![(SpanStyle::Code { block: true }, 0..3)]);
        assert_eq!(render(&d), "<pre><code>a\nb</code></pre>");
    }
}
