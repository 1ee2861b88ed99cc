//! Message content in its three wire shapes.
//!
//! Peers send `params.message` as a plain string, a list of segments, or a
//! single segment object. [`MessageContent`] captures which one arrived so
//! the codec branches on the tag instead of probing JSON types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::card::ImagePolicy;
use super::segment::{Segment, parse_canonical};

/// Message content as received from a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain canonical text.
    Text(String),
    /// Ordered list of segments. Elements that are not `{type, data}`
    /// objects are skipped.
    Segments(#[serde(deserialize_with = "lenient_segments")] Vec<Segment>),
    /// A single segment object.
    Segment(Segment),
    /// Any other JSON value.
    Unsupported(Value),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl MessageContent {
    /// Decodes the content into canonical text.
    ///
    /// Plain strings are returned verbatim; segments are rendered in input
    /// order. An unsupported shape yields empty text.
    pub fn decode(&self, images: ImagePolicy) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Segments(segments) => segments
                .iter()
                .map(|segment| segment.to_canonical(images))
                .collect(),
            MessageContent::Segment(segment) => segment.to_canonical(images),
            MessageContent::Unsupported(value) => {
                warn!(
                    kind = json_kind(value),
                    "Unsupported message format, expected string, segment list or segment map"
                );
                String::new()
            }
        }
    }
}

/// Builds a segment list from canonical text.
///
/// Segments are ordered mentions first, then text, then images, then
/// anything else; order within each group is preserved.
pub fn encode(canonical: &str) -> Vec<Segment> {
    let mut segments = parse_canonical(canonical);
    segments.sort_by_key(Segment::category);
    segments
}

fn lenient_segments<'de, D>(deserializer: D) -> Result<Vec<Segment>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Vec::<Value>::deserialize(deserializer)?;
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Segment>(item) {
            Ok(segment) => Some(segment),
            Err(e) => {
                debug!(error = %e, "Skipping malformed message segment");
                None
            }
        })
        .collect())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn content(value: Value) -> MessageContent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_plain_string_verbatim() {
        let c = content(json!("hello [CQ:at,qq=1]"));
        assert!(matches!(c, MessageContent::Text(_)));
        assert_eq!(c.decode(ImagePolicy::Inline), "hello [CQ:at,qq=1]");
    }

    #[test]
    fn test_decode_segment_list_in_input_order() {
        let c = content(json!([
            {"type": "image", "data": {"file": "http://x/a.png"}},
            {"type": "text", "data": {"text": "caption"}},
            {"type": "at", "data": {"qq": "7"}}
        ]));
        assert_eq!(
            c.decode(ImagePolicy::Inline),
            "[CQ:image,file=http://x/a.png]caption[CQ:at,qq=7]"
        );
    }

    #[test]
    fn test_decode_single_segment_map() {
        let c = content(json!({"type": "record", "data": {"file": "http://x/v.silk"}}));
        assert!(matches!(c, MessageContent::Segment(_)));
        assert_eq!(c.decode(ImagePolicy::Inline), "[CQ:record,file=http://x/v.silk]");
    }

    #[test]
    fn test_decode_markdown_segment() {
        let c = content(json!({
            "type": "markdown",
            "data": {"data": {"markdown": {"content": "![a](https://x/p.png)hi"}}}
        }));
        assert_eq!(c.decode(ImagePolicy::Inline), "[CQ:image,file=https://x/p.png]hi");
        assert_eq!(c.decode(ImagePolicy::Strip), "hi");
    }

    #[test]
    fn test_unsupported_shape_is_empty() {
        let c = content(json!(42));
        assert!(matches!(c, MessageContent::Unsupported(_)));
        assert_eq!(c.decode(ImagePolicy::Inline), "");

        let c = content(json!({"text": "no type"}));
        assert!(matches!(c, MessageContent::Unsupported(_)));
    }

    #[test]
    fn test_segment_list_skips_malformed_elements() {
        let c = content(json!([
            {"type": "text", "data": {"text": "hi"}},
            "x",
            {"type": 3, "data": {}},
            {"type": "at", "data": {"qq": 5}}
        ]));
        assert_eq!(
            c,
            MessageContent::Segments(vec![Segment::text("hi"), Segment::at("5")])
        );
        assert_eq!(c.decode(ImagePolicy::Inline), "hi[CQ:at,qq=5]");

        let c = content(json!([1, 2]));
        assert_eq!(c, MessageContent::Segments(Vec::new()));
        assert_eq!(c.decode(ImagePolicy::Inline), "");
    }

    #[test]
    fn test_encode_orders_categories() {
        let decoded = content(json!([
            {"type": "image", "data": {"file": "http://x/a.png"}},
            {"type": "text", "data": {"text": "look"}},
            {"type": "at", "data": {"qq": "7"}}
        ]))
        .decode(ImagePolicy::Inline);

        assert_eq!(
            encode(&decoded),
            vec![
                Segment::at("7"),
                Segment::text("look"),
                Segment::image("http://x/a.png"),
            ]
        );
    }

    #[test]
    fn test_encode_serializes_as_segment_array() {
        let json = serde_json::to_value(encode("hi [CQ:at,qq=3]")).unwrap();
        assert_eq!(
            json,
            json!([
                {"type": "at", "data": {"qq": "3"}},
                {"type": "text", "data": {"text": "hi "}}
            ])
        );
    }
}
