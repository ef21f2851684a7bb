//! Markdown-subset substitution.
//!
//! The persisted markdown form is not CommonMark: it is a fixed sequence of
//! substitution passes, and the order is normative because patterns nest.
//! Each pass scans the plain-text pieces produced by earlier passes (and
//! the bodies of earlier spans), so `**a *b* c**` yields italic inside
//! bold. Code bodies become raw zones for the passes that run after the
//! code pass; unclosed delimiters stay literal text.

use crate::SpanDoc;
use crate::editing::FormatSpan;
use crate::registry::{SpanStyle, markers};

enum Node {
    Text(String),
    Styled { style: SpanStyle, children: Vec<Node> },
}

/// Parses the markdown subset into a span buffer.
///
/// Pass order: bold, italic, strikethrough, code, link.
pub(crate) fn parse_markdown(input: &str) -> SpanDoc {
    let mut nodes = vec![Node::Text(input.to_string())];
    nodes = run_pass(nodes, &|text| split_delimited(text, markers::BOLD, &|_| SpanStyle::Bold));
    nodes = run_pass(nodes, &|text| {
        split_delimited(text, markers::ITALIC, &|_| SpanStyle::Italic)
    });
    nodes = run_pass(nodes, &|text| {
        split_delimited(text, markers::STRIKETHROUGH, &|_| SpanStyle::Strikethrough)
    });
    nodes = run_pass(nodes, &|text| {
        split_delimited(text, markers::CODE, &|body| SpanStyle::Code {
            block: body.contains('\n'),
        })
    });
    nodes = run_pass(nodes, &split_links);

    let mut text = String::new();
    let mut spans = Vec::new();
    flatten(nodes, &mut text, &mut spans);
    SpanDoc::from_parts(&text, spans)
}

/// Applies one substitution pass to every text piece, recursing into the
/// bodies of spans produced by earlier passes. Code bodies are raw zones:
/// once the code pass has run, nothing descends into them.
fn run_pass(nodes: Vec<Node>, split: &dyn Fn(&str) -> Vec<Node>) -> Vec<Node> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            Node::Text(text) => out.extend(split(&text)),
            Node::Styled { style, children } => {
                let children = if matches!(style, SpanStyle::Code { .. }) {
                    children
                } else {
                    run_pass(children, split)
                };
                out.push(Node::Styled { style, children });
            }
        }
    }
    out
}

fn flatten(nodes: Vec<Node>, text: &mut String, spans: &mut Vec<FormatSpan>) {
    for node in nodes {
        match node {
            Node::Text(s) => text.push_str(&s),
            Node::Styled { style, children } => {
                let start = text.len();
                flatten(children, text, spans);
                spans.push(FormatSpan::new(style, start..text.len()));
            }
        }
    }
}

/// Splits one text piece on a symmetric delimiter.
///
/// An opening delimiter with no closing partner (or an empty body) stays
/// literal; the scan continues past it without consuming anything.
fn split_delimited(
    text: &str,
    delim: &str,
    make: &dyn Fn(&str) -> SpanStyle,
) -> Vec<Node> {
    let mut out = Vec::new();
    let mut seg_start = 0;
    let mut scan = 0;

    while let Some(rel) = text[scan..].find(delim) {
        let open = scan + rel;
        let body_start = open + delim.len();
        match text[body_start..].find(delim) {
            Some(0) => {
                // Empty body: the opening delimiter stays literal
                scan = body_start;
            }
            Some(rel2) => {
                let close = body_start + rel2;
                if seg_start < open {
                    out.push(Node::Text(text[seg_start..open].to_string()));
                }
                let body = &text[body_start..close];
                out.push(Node::Styled {
                    style: make(body),
                    children: vec![Node::Text(body.to_string())],
                });
                seg_start = close + delim.len();
                scan = seg_start;
            }
            None => {
                // No closer anywhere: leave the opener literal
                scan = body_start;
            }
        }
    }

    if seg_start < text.len() || out.is_empty() {
        out.push(Node::Text(text[seg_start..].to_string()));
    }
    out
}

/// Splits `[text](url)` links out of one text piece.
///
/// Both the label and the URL must be non-empty and the `](` junction must
/// be immediate; anything else stays literal.
fn split_links(text: &str) -> Vec<Node> {
    let mut out = Vec::new();
    let mut seg_start = 0;
    let mut scan = 0;

    while let Some(rel) = text[scan..].find(markers::LINK_TEXT_OPEN) {
        let open = scan + rel;
        let label_start = open + 1;
        let Some(close_rel) = text[label_start..].find(markers::LINK_TEXT_CLOSE) else {
            break;
        };
        let label_end = label_start + close_rel;
        let junction = label_end + 1;
        if !text[junction..].starts_with(markers::LINK_URL_OPEN) {
            scan = label_start;
            continue;
        }
        let url_start = junction + 1;
        let Some(url_rel) = text[url_start..].find(markers::LINK_URL_CLOSE) else {
            scan = label_start;
            continue;
        };
        let url_end = url_start + url_rel;

        let label = &text[label_start..label_end];
        let url = &text[url_start..url_end];
        if label.is_empty() || url.is_empty() {
            scan = label_start;
            continue;
        }

        if seg_start < open {
            out.push(Node::Text(text[seg_start..open].to_string()));
        }
        out.push(Node::Styled {
            style: SpanStyle::Link {
                url: url.to_string(),
            },
            children: vec![Node::Text(label.to_string())],
        });
        seg_start = url_end + 1;
        scan = seg_start;
    }

    if seg_start < text.len() || out.is_empty() {
        out.push(Node::Text(text[seg_start..].to_string()));
    }
    out
}
