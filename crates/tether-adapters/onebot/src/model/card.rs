//! Rich card decoding.
//!
//! A card is an optional markdown body plus an optional keyboard of button
//! rows. Decoding flattens both into canonical text that stays within
//! [`CONTENT_BUDGET`]:
//!
//! 1. The body is cleaned of peer markup. Command inputs become their inner
//!    text padded with spaces; user mentions are removed.
//! 2. If that exceeds the budget, the body is cleaned again without padding.
//! 3. The keyboard is appended after a blank line only when the body fits.
//! 4. Markdown image links are rewritten to image tags or stripped.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::CONTENT_BUDGET;
use tracing::{trace, warn};

use super::segment::unescape_cq_text;

static AT_USER_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<qqbot-at-user id="[^"]*" />"#).expect("valid regex"));

static CMD_INPUT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<qqbot-cmd-input[^>]*text='([^']*)'[^>]*show='([^']*)'[^>]*/>")
        .expect("valid regex")
});

static MARKDOWN_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[.*?\]\((https?://[^)]+)\)").expect("valid regex"));

/// What to do with markdown image links while flattening a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImagePolicy {
    /// Rewrite `![alt](url)` into `[CQ:image,file=url]`.
    #[default]
    Inline,
    /// Remove image links entirely.
    Strip,
}

// ============================================================================
// Envelope
// ============================================================================

/// A rich card envelope as peers send it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RichCard {
    /// Markdown body.
    #[serde(default)]
    pub markdown: Option<MarkdownBody>,
    /// Keyboard, either inline or a template reference.
    #[serde(default)]
    pub keyboard: Option<Keyboard>,
    /// Rows given at the top level instead of inside `keyboard`.
    #[serde(default)]
    pub rows: Vec<ButtonRow>,
}

/// Markdown body: literal content or a template reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkdownBody {
    /// Template id when the body is a template reference.
    #[serde(default)]
    pub custom_template_id: Option<String>,
    /// Template parameters.
    #[serde(default)]
    pub params: Vec<TemplateParam>,
    /// Literal markdown content.
    #[serde(default)]
    pub content: String,
}

/// One template parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateParam {
    /// Parameter name.
    #[serde(default)]
    pub key: String,
    /// Parameter values.
    #[serde(default)]
    pub values: Vec<String>,
}

/// Keyboard attached to a card.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Keyboard {
    /// Template id when the keyboard is a template reference.
    #[serde(default)]
    pub id: Option<String>,
    /// Inline keyboard layout.
    #[serde(default)]
    pub content: Option<KeyboardLayout>,
}

/// Inline keyboard layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyboardLayout {
    /// Button rows, top to bottom.
    #[serde(default)]
    pub rows: Vec<ButtonRow>,
}

/// A row of buttons.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ButtonRow {
    /// Buttons, left to right.
    #[serde(default)]
    pub buttons: Vec<Button>,
}

/// A keyboard button. Buttons missing render data or an action are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Button {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub render_data: Option<RenderData>,
    #[serde(default)]
    pub action: Option<ButtonAction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderData {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub visited_label: String,
    #[serde(default)]
    pub style: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ButtonAction {
    /// `0` opens a link; anything else is an in-chat action.
    #[serde(default, rename = "type")]
    pub kind: i64,
    #[serde(default)]
    pub data: String,
}

// ============================================================================
// Rendering
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Spacing {
    Padded,
    Bare,
}

impl RichCard {
    /// Flattens the card into canonical text.
    pub fn render(&self, images: ImagePolicy) -> String {
        let body = self.markdown.as_ref().map_or("", |md| md.content.as_str());

        let mut text = clean_markdown(body, Spacing::Padded);
        trace!(len = text.len(), "Cleaned markdown body");
        if text.len() > CONTENT_BUDGET {
            text = clean_markdown(body, Spacing::Bare);
        }

        if let Some(rows) = self.layout_rows() {
            if text.len() > CONTENT_BUDGET {
                trace!("Markdown body over budget, keyboard omitted");
            } else {
                let keyboard = render_keyboard(rows);
                if !keyboard.is_empty() {
                    if !text.is_empty() {
                        text.push_str("\n\n");
                    }
                    text.push_str(&keyboard);
                }
            }
        }

        match images {
            ImagePolicy::Inline => MARKDOWN_IMAGE
                .replace_all(&text, |caps: &Captures| format!("[CQ:image,file={}]", &caps[1]))
                .into_owned(),
            ImagePolicy::Strip => MARKDOWN_IMAGE.replace_all(&text, "").into_owned(),
        }
    }

    /// Rows from the inline keyboard, falling back to top-level rows.
    fn layout_rows(&self) -> Option<&[ButtonRow]> {
        if let Some(layout) = self.keyboard.as_ref().and_then(|kb| kb.content.as_ref()) {
            Some(&layout.rows)
        } else if !self.rows.is_empty() {
            Some(&self.rows)
        } else {
            None
        }
    }
}

fn clean_markdown(content: &str, spacing: Spacing) -> String {
    let content = AT_USER_TAG.replace_all(content, "");
    CMD_INPUT_TAG
        .replace_all(&content, |caps: &Captures| match spacing {
            Spacing::Padded => format!(" {} ", &caps[1]),
            Spacing::Bare => caps[1].to_string(),
        })
        .into_owned()
}

/// Renders button rows as `data:label` entries, one line per row.
pub fn render_keyboard(rows: &[ButtonRow]) -> String {
    rows.iter()
        .filter_map(|row| {
            let buttons: Vec<String> = row
                .buttons
                .iter()
                .filter_map(|button| {
                    let render = button.render_data.as_ref()?;
                    let action = button.action.as_ref()?;
                    let mut label = render.label.clone();
                    if label.chars().next().is_some_and(is_emoji) {
                        label.push_str("   ");
                    }
                    Some(if action.kind != 0 {
                        format!(" {}:{}", action.data, label)
                    } else {
                        format!("{}:{}", action.data, label)
                    })
                })
                .collect();
            (!buttons.is_empty()).then(|| buttons.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_emoji(c: char) -> bool {
    matches!(
        u32::from(c),
        0x1F300..=0x1F5FF
            | 0x1F600..=0x1F64F
            | 0x1F680..=0x1F6FF
            | 0x1F700..=0x1F77F
            | 0x1F780..=0x1F7FF
            | 0x1F800..=0x1F8FF
            | 0x1F900..=0x1F9FF
            | 0x1FA00..=0x1FA6F
            | 0x1FA70..=0x1FAFF
    )
}

// ============================================================================
// Payload decoding
// ============================================================================

/// Decodes the `data` field of a markdown segment into canonical text.
///
/// Accepts a card object, a `base64://` encoded card, or entity-escaped
/// card JSON. Anything unreadable yields empty text.
pub fn decode_payload(payload: &Value, images: ImagePolicy) -> String {
    let card = match payload {
        Value::Object(_) => {
            serde_json::from_value::<RichCard>(payload.clone()).map_err(|e| e.to_string())
        }
        Value::String(text) => match text.strip_prefix("base64://") {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map_err(|e| e.to_string())
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string())),
            None => serde_json::from_str(&unescape_cq_text(text)).map_err(|e| e.to_string()),
        },
        other => Err(format!("unexpected markdown payload: {other}")),
    };

    match card {
        Ok(card) => card.render(images),
        Err(e) => {
            warn!(error = %e, "Failed to decode markdown card");
            String::new()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
