use serde::{Deserialize, Serialize};

use crate::domain::SenderId;

/// `custom.type` value the action server uses for markdown tables.
pub const TABLE_MARKDOWN_TYPE: &str = "table_markdown";

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub sender: SenderId,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomPayload>,
}

impl WebhookReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn table_markdown(data: impl Into<String>) -> Self {
        Self {
            custom: Some(CustomPayload {
                kind: TABLE_MARKDOWN_TYPE.to_string(),
                data: Some(data.into()),
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl CustomPayload {
    fn table_data(&self) -> Option<&str> {
        if self.kind != TABLE_MARKDOWN_TYPE {
            return None;
        }
        self.data.as_deref().filter(|data| !data.is_empty())
    }
}

/// Flattens a webhook response into the single string the formatter reads.
///
/// Text parts are newline-joined and trimmed; every `table_markdown` payload
/// is then appended as its own fenced block.
pub fn compose_reply_text(replies: &[WebhookReply]) -> String {
    let mut composed = replies
        .iter()
        .map(|reply| reply.text.as_deref().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    for data in replies
        .iter()
        .filter_map(|reply| reply.custom.as_ref())
        .filter_map(CustomPayload::table_data)
    {
        composed.push('\n');
        composed.push_str(FENCE);
        composed.push('\n');
        composed.push_str(data);
        composed.push('\n');
        composed.push_str(FENCE);
    }

    composed
}
