//! # Format Registry
//!
//! Static mapping between format identifiers and their structural
//! representation. All tag names and markdown delimiters the system knows
//! about live here; the serializer and toggle engine call these constants
//! and never hardcode `<strong>` or `**` themselves.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown format id: {0}")]
    UnknownFormat(String),
    #[error("format `{0}` requires a value")]
    MissingValue(FormatId),
}

/// String-keyed format identifier, as used by the toolbar callback
/// (`applyFormat(formatId, value)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatId {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    Link,
    Color,
    BackgroundColor,
}

impl FormatId {
    pub const ALL: [FormatId; 8] = [
        FormatId::Bold,
        FormatId::Italic,
        FormatId::Underline,
        FormatId::Strikethrough,
        FormatId::Code,
        FormatId::Link,
        FormatId::Color,
        FormatId::BackgroundColor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FormatId::Bold => "bold",
            FormatId::Italic => "italic",
            FormatId::Underline => "underline",
            FormatId::Strikethrough => "strikethrough",
            FormatId::Code => "code",
            FormatId::Link => "link",
            FormatId::Color => "color",
            FormatId::BackgroundColor => "backgroundColor",
        }
    }

    /// A toggleable format, applied to already-formatted text, removes the
    /// formatting instead of nesting it.
    pub fn is_toggleable(self) -> bool {
        matches!(
            self,
            FormatId::Bold
                | FormatId::Italic
                | FormatId::Underline
                | FormatId::Strikethrough
                | FormatId::Code
        )
    }

    /// Link and the two color formats carry a value (URL or color string).
    pub fn requires_value(self) -> bool {
        matches!(
            self,
            FormatId::Link | FormatId::Color | FormatId::BackgroundColor
        )
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormatId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| RegistryError::UnknownFormat(s.to_string()))
    }
}

/// Structural representation of one formatting attribute.
///
/// These are the tagged variants a renderer consumes; the output markup
/// (HTML tag, markdown delimiter, terminal style) is derived from them,
/// never the other way around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanStyle {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    /// Inline code, or a block when the wrapped text spans lines.
    Code { block: bool },
    Link { url: String },
    Color(String),
    Background(String),
}

impl SpanStyle {
    /// Builds a style from the toolbar callback's parts.
    ///
    /// `Code` defaults to inline; the toggle engine upgrades it to a block
    /// when the selected text contains a newline.
    pub fn from_parts(id: FormatId, value: Option<&str>) -> Result<Self, RegistryError> {
        let value_for = |id| {
            value
                .map(str::to_string)
                .ok_or(RegistryError::MissingValue(id))
        };
        Ok(match id {
            FormatId::Bold => SpanStyle::Bold,
            FormatId::Italic => SpanStyle::Italic,
            FormatId::Underline => SpanStyle::Underline,
            FormatId::Strikethrough => SpanStyle::Strikethrough,
            FormatId::Code => SpanStyle::Code { block: false },
            FormatId::Link => SpanStyle::Link {
                url: value_for(id)?,
            },
            FormatId::Color => SpanStyle::Color(value_for(id)?),
            FormatId::BackgroundColor => SpanStyle::Background(value_for(id)?),
        })
    }

    pub fn format_id(&self) -> FormatId {
        match self {
            SpanStyle::Bold => FormatId::Bold,
            SpanStyle::Italic => FormatId::Italic,
            SpanStyle::Underline => FormatId::Underline,
            SpanStyle::Strikethrough => FormatId::Strikethrough,
            SpanStyle::Code { .. } => FormatId::Code,
            SpanStyle::Link { .. } => FormatId::Link,
            SpanStyle::Color(_) => FormatId::Color,
            SpanStyle::Background(_) => FormatId::BackgroundColor,
        }
    }

    pub fn matches(&self, id: FormatId) -> bool {
        self.format_id() == id
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            SpanStyle::Link { url } => Some(url),
            SpanStyle::Color(v) | SpanStyle::Background(v) => Some(v),
            _ => None,
        }
    }

    /// Nesting order when rendering overlapping spans: lower ranks open
    /// further out. Ties fall back to span insertion order, so the span
    /// applied last ends up innermost (its CSS wins).
    pub(crate) fn rank(&self) -> u8 {
        match self {
            SpanStyle::Link { .. } => 0,
            SpanStyle::Code { block: true } => 1,
            SpanStyle::Background(_) => 2,
            SpanStyle::Color(_) => 3,
            SpanStyle::Code { block: false } => 4,
            SpanStyle::Bold => 5,
            SpanStyle::Italic => 6,
            SpanStyle::Underline => 7,
            SpanStyle::Strikethrough => 8,
        }
    }
}

/// HTML tag names, owned here per the knowledge-ownership rule.
pub mod tags {
    pub const BOLD: &[&str] = &["strong", "b"];
    pub const ITALIC: &[&str] = &["em", "i"];
    pub const UNDERLINE: &[&str] = &["u"];
    pub const STRIKETHROUGH: &[&str] = &["s", "del", "strike"];
    pub const CODE: &str = "code";
    pub const PRE: &str = "pre";
    pub const ANCHOR: &str = "a";
    pub const SPAN: &str = "span";
    pub const BREAK: &str = "br";
    /// Void elements that never take a closing tag.
    pub const VOID: &[&str] = &["br", "hr", "img", "input", "meta"];
}

/// Markdown delimiters of the persisted subset, in substitution order.
pub mod markers {
    pub const BOLD: &str = "**";
    pub const ITALIC: &str = "*";
    pub const STRIKETHROUGH: &str = "~~";
    pub const CODE: &str = "`";
    pub const LINK_TEXT_OPEN: char = '[';
    pub const LINK_TEXT_CLOSE: char = ']';
    pub const LINK_URL_OPEN: char = '(';
    pub const LINK_URL_CLOSE: char = ')';
}

/// Maps a basic (value-free) tag name to its style.
///
/// `a`, `span` and `pre` are handled by the HTML parser directly because
/// they carry attributes or wrap a `code` child.
pub fn style_for_basic_tag(name: &str) -> Option<SpanStyle> {
    if tags::BOLD.contains(&name) {
        Some(SpanStyle::Bold)
    } else if tags::ITALIC.contains(&name) {
        Some(SpanStyle::Italic)
    } else if tags::UNDERLINE.contains(&name) {
        Some(SpanStyle::Underline)
    } else if tags::STRIKETHROUGH.contains(&name) {
        Some(SpanStyle::Strikethrough)
    } else if name == tags::CODE {
        Some(SpanStyle::Code { block: false })
    } else {
        None
    }
}
