//! OneBot v11 message segments and their inline tag form.
//!
//! A segment is one typed unit of message content. In canonical text each
//! non-text segment becomes an inline pseudo-tag:
//!
//! - `text` → the literal text
//! - `image` → `[CQ:image,file=<url>]`
//! - `voice` / `record` → `[CQ:record,file=<url>]`
//! - `at` → `[CQ:at,qq=<id>]`
//! - `markdown` → the flattened rich card (see [`card`](super::card))

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::card::{self, ImagePolicy};

// ============================================================================
// Segment
// ============================================================================

/// A OneBot v11 message segment.
///
/// Deserialization never fails on an unknown `type`; such segments are kept
/// as [`Segment::Unknown`] and contribute nothing to canonical text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSegment", into = "RawSegment")]
pub enum Segment {
    /// Plain text content.
    Text(TextData),
    /// Image referenced by file name or URL.
    Image(MediaData),
    /// Voice record referenced by file name or URL.
    Record(MediaData),
    /// Mention of a user.
    At(AtData),
    /// Rich card payload.
    Markdown(MarkdownData),
    /// Any other segment type.
    Unknown {
        /// The `type` field as received.
        kind: String,
        /// The `data` block as received.
        data: Value,
    },
}

/// Text segment data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextData {
    /// The text content.
    pub text: String,
}

/// Image or voice segment data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaData {
    /// File name, URL or `base64://` payload.
    pub file: String,
}

/// Mention segment data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AtData {
    /// Mentioned user id, or `all`.
    pub qq: String,
}

/// Markdown segment data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarkdownData {
    /// Card envelope: a JSON object, entity-escaped JSON text, or a
    /// `base64://` encoded JSON document.
    pub data: Value,
}

/// Sort rank used when building a segment list from canonical text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    /// Mentions come first.
    Mention,
    /// Then text runs.
    Text,
    /// Then images.
    Image,
    /// Everything else keeps its relative order at the end.
    Other,
}

impl Segment {
    /// Creates a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text(TextData { text: text.into() })
    }

    /// Creates an image segment.
    pub fn image(file: impl Into<String>) -> Self {
        Segment::Image(MediaData { file: file.into() })
    }

    /// Creates a voice segment.
    pub fn record(file: impl Into<String>) -> Self {
        Segment::Record(MediaData { file: file.into() })
    }

    /// Creates a mention segment.
    pub fn at(qq: impl Into<String>) -> Self {
        Segment::At(AtData { qq: qq.into() })
    }

    /// Returns the sort rank of this segment.
    pub fn category(&self) -> Category {
        match self {
            Segment::At(_) => Category::Mention,
            Segment::Text(_) => Category::Text,
            Segment::Image(_) => Category::Image,
            _ => Category::Other,
        }
    }

    /// Renders this segment as a canonical text fragment.
    pub fn to_canonical(&self, images: ImagePolicy) -> String {
        match self {
            Segment::Text(data) => data.text.clone(),
            Segment::Image(data) => format!("[CQ:image,file={}]", data.file),
            Segment::Record(data) => format!("[CQ:record,file={}]", data.file),
            Segment::At(data) => format!("[CQ:at,qq={}]", data.qq),
            Segment::Markdown(data) => card::decode_payload(&data.data, images),
            Segment::Unknown { kind, .. } => {
                debug!(kind = %kind, "Skipping unsupported segment type");
                String::new()
            }
        }
    }
}

// ============================================================================
// Wire representation
// ============================================================================

/// The `{type, data}` shape segments take on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSegment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Reads a string-ish field from a segment data block.
///
/// Numbers are accepted and rendered in decimal.
fn field(data: &Value, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

impl From<RawSegment> for Segment {
    fn from(raw: RawSegment) -> Self {
        match raw.kind.as_str() {
            "text" => Segment::text(field(&raw.data, "text")),
            "image" => Segment::image(field(&raw.data, "file")),
            "voice" | "record" => Segment::record(field(&raw.data, "file")),
            "at" => Segment::at(field(&raw.data, "qq")),
            "markdown" => Segment::Markdown(MarkdownData {
                data: raw.data.get("data").cloned().unwrap_or(Value::Null),
            }),
            _ => Segment::Unknown {
                kind: raw.kind,
                data: raw.data,
            },
        }
    }
}

impl From<Segment> for RawSegment {
    fn from(segment: Segment) -> Self {
        let (kind, key, value) = match segment {
            Segment::Text(d) => ("text", "text", Value::String(d.text)),
            Segment::Image(d) => ("image", "file", Value::String(d.file)),
            Segment::Record(d) => ("record", "file", Value::String(d.file)),
            Segment::At(d) => ("at", "qq", Value::String(d.qq)),
            Segment::Markdown(d) => ("markdown", "data", d.data),
            Segment::Unknown { kind, data } => return RawSegment { kind, data },
        };
        let mut data = Map::new();
        data.insert(key.to_string(), value);
        RawSegment {
            kind: kind.to_string(),
            data: Value::Object(data),
        }
    }
}

// ============================================================================
// Canonical text parsing
// ============================================================================

const TAG_OPEN: &str = "[CQ:";

/// Splits canonical text into segments in order of appearance.
///
/// Recognised tags become typed segments; unrecognised or unterminated tags
/// are kept as text.
pub fn parse_canonical(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        let Some(start) = rest.find(TAG_OPEN) else {
            segments.push(Segment::text(rest));
            break;
        };
        if start > 0 {
            segments.push(Segment::text(&rest[..start]));
        }

        let tag = &rest[start..];
        let Some(end) = tag.find(']') else {
            segments.push(Segment::text(tag));
            break;
        };

        let body = &tag[TAG_OPEN.len()..end];
        match tag_to_segment(body) {
            Some(segment) => segments.push(segment),
            None => segments.push(Segment::text(&tag[..=end])),
        }
        rest = &tag[end + 1..];
    }

    segments
}

/// Converts the inside of a `[CQ:...]` tag into a segment.
fn tag_to_segment(body: &str) -> Option<Segment> {
    let name = body.split(',').next()?;
    let get = |key: &str| {
        body.split(',')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| unescape_cq_text(v))
    };

    match name {
        "image" => get("file").map(Segment::image),
        "record" => get("file").map(Segment::record),
        "at" => get("qq").map(Segment::at),
        _ => None,
    }
}

/// Unescapes CQ entities back to plain characters.
pub fn unescape_cq_text(text: &str) -> String {
    text.replace("&#91;", "[")
        .replace("&#93;", "]")
        .replace("&#44;", ",")
        .replace("&amp;", "&")
}

// ============================================================================
// Tests
// ============================================================================
