//! Provider-neutral transcript types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Synthetic message carrying tool results back to the model.
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned id used to pair the result with the call.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
        /// Reasoning text rather than an answer.
        #[serde(default)]
        thought: bool,
    },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    Image {
        mime_type: String,
        #[serde(with = "crate::util::base64_bytes")]
        data: Vec<u8>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text {
            text: text.into(),
            thought: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn assistant(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Assistant,
            parts,
        }
    }

    pub fn tool_results(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Tool,
            parts,
        }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    /// Concatenated non-thought text.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text, thought: false } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Text of the most recent assistant message, if any.
pub fn last_assistant_text(conversation: &[Message]) -> Option<String> {
    conversation
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(Message::text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parts_serialize_with_type_tag() {
        let message = Message::assistant(vec![
            Part::text("Adding a sphere."),
            Part::ToolCall(ToolCall {
                id: "call_1".into(),
                name: "create_shape".into(),
                arguments: json!({ "shapes": [] }),
            }),
        ]);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["parts"][0]["type"], "text");
        assert_eq!(value["parts"][1]["type"], "tool_call");
        assert_eq!(value["parts"][1]["name"], "create_shape");
    }

    #[test]
    fn image_data_is_base64() {
        let part = Part::Image {
            mime_type: "image/png".into(),
            data: vec![1, 2, 3],
        };
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["data"], "AQID");
        let back: Part = serde_json::from_value(value).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn last_assistant_text_skips_thoughts() {
        let conversation = vec![
            Message::user("hi"),
            Message::assistant(vec![
                Part::Text { text: "thinking".into(), thought: true },
                Part::text("Done."),
            ]),
        ];
        assert_eq!(last_assistant_text(&conversation).as_deref(), Some("Done."));
    }
}
