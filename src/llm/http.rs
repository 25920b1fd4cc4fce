//! HTTP provider for Anthropic Messages and OpenAI-compatible Chat Completions.
//! Translates the provider-neutral transcript into each wire format and back.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use crate::conversation::{Message, Part, Role, ToolCall, ToolResult};
use crate::settings::{LlmProvider, LlmProviderConfig};
use crate::tools::ToolDeclaration;

use super::{ModelResponse, Provider, ProviderError};

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-4o";
const MAX_TOKENS: u32 = 4096;

pub const SYSTEM_PROMPT: &str = "You are a 3D scene assistant for a ray tracer. \
Build and edit the scene only through the provided tools: create, update and remove shapes and lights, \
set the camera and the environment lighting. Every shape and light needs a unique id. \
Vectors are [x, y, z] arrays; colors are [r, g, b] with components from 0 to 1 for albedo. \
When a tool reports errors, read them, fix the arguments and call it again. \
Use render_scene to check your work visually when it matters, and get_scene_state when unsure \
what the scene holds. When the scene is done, reply with a short description and no tool calls.";

/// A configured endpoint, key and model for one wire format.
#[derive(Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    name: String,
    url: String,
    api_key: String,
    model: String,
    format: LlmProvider,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("model", &self.model)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl HttpProvider {
    /// Resolve a provider config into a concrete URL, key and model.
    ///
    /// # Errors
    /// Returns [`ProviderError::Fatal`] when the API key is missing.
    pub fn from_config(client: reqwest::Client, name: &str, config: &LlmProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::Fatal(format!("no API key configured for provider \"{name}\"")))?
            .to_string();

        let (url, model) = match config.provider {
            LlmProvider::Anthropic => (
                config.base_url.clone().unwrap_or_else(|| ANTHROPIC_URL.to_string()),
                config.model.clone().unwrap_or_else(|| ANTHROPIC_MODEL.to_string()),
            ),
            LlmProvider::OpenAiCompatible => {
                let base = config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
                (
                    format!("{}/chat/completions", base.trim_end_matches('/')),
                    config.model.clone().unwrap_or_else(|| OPENAI_MODEL.to_string()),
                )
            }
        };

        Ok(Self {
            client,
            name: name.to_string(),
            url,
            api_key,
            model,
            format: config.provider,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self, conversation: &[Message], tools: &[ToolDeclaration]) -> reqwest::RequestBuilder {
        match self.format {
            LlmProvider::Anthropic => self
                .client
                .post(&self.url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&anthropic_body(&self.model, conversation, tools)),
            LlmProvider::OpenAiCompatible => self
                .client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("content-type", "application/json")
                .json(&openai_body(&self.model, conversation, tools)),
        }
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, conversation: &[Message], tools: &[ToolDeclaration]) -> Result<ModelResponse, ProviderError> {
        debug!(provider = %self.name, model = %self.model, messages = conversation.len(), "sending request");
        let response = self.request(conversation, tools).send().await.map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Fatal(format!("failed to parse response: {e}")))?;

        match self.format {
            LlmProvider::Anthropic => parse_anthropic_response(&json),
            LlmProvider::OpenAiCompatible => parse_openai_response(&json),
        }
    }
}

fn classify_send_error(e: reqwest::Error) -> ProviderError {
    let message = format!("API request failed: {e}");
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ProviderError::Transient(message)
    } else {
        ProviderError::Fatal(message)
    }
}

fn classify_status(status: reqwest::StatusCode, text: &str) -> ProviderError {
    let message = format!("API error {status}: {text}");
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Transient(message)
    } else {
        ProviderError::Fatal(message)
    }
}

fn encode_image(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Tool responses go over the wire as JSON text.
fn response_text(result: &ToolResult) -> String {
    serde_json::to_string(&result.response).unwrap_or_default()
}

// ── Anthropic ────────────────────────────────────────────────────

fn anthropic_block(part: &Part) -> Value {
    match part {
        Part::Text { text, .. } => json!({ "type": "text", "text": text }),
        Part::ToolCall(call) => json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": if call.arguments.is_object() { call.arguments.clone() } else { json!({}) },
        }),
        Part::ToolResult(result) => json!({
            "type": "tool_result",
            "tool_use_id": result.call_id,
            "content": response_text(result),
        }),
        Part::Image { mime_type, data } => json!({
            "type": "image",
            "source": { "type": "base64", "media_type": mime_type, "data": encode_image(data) },
        }),
    }
}

pub(crate) fn anthropic_messages(conversation: &[Message]) -> Vec<Value> {
    // Anthropic rejects empty text blocks and messages without content.
    let sendable = |p: &&Part| !matches!(p, Part::Text { text, .. } if text.is_empty());
    conversation
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::Assistant => "assistant",
                // Tool results travel in a user turn.
                Role::User | Role::Tool => "user",
            };
            // tool_result blocks must lead their message.
            let mut parts: Vec<&Part> = m.parts.iter().filter(|p| matches!(p, Part::ToolResult(_))).collect();
            parts.extend(m.parts.iter().filter(|p| !matches!(p, Part::ToolResult(_))).filter(sendable));
            (!parts.is_empty()).then(|| {
                json!({
                    "role": role,
                    "content": parts.into_iter().map(anthropic_block).collect::<Vec<_>>(),
                })
            })
        })
        .collect()
}

pub(crate) fn anthropic_body(model: &str, conversation: &[Message], tools: &[ToolDeclaration]) -> Value {
    let tools: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.parameters,
            })
        })
        .collect();
    json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "system": SYSTEM_PROMPT,
        "tools": tools,
        "messages": anthropic_messages(conversation),
    })
}

pub(crate) fn parse_anthropic_response(json: &Value) -> Result<ModelResponse, ProviderError> {
    let blocks = json
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Fatal("no content in Anthropic response".to_string()))?;

    let mut parts = Vec::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                let text = block.get("text").and_then(Value::as_str).unwrap_or("");
                parts.push(Part::text(text));
            }
            Some("thinking") => {
                let text = block.get("thinking").and_then(Value::as_str).unwrap_or("");
                parts.push(Part::Text {
                    text: text.to_string(),
                    thought: true,
                });
            }
            Some("tool_use") => parts.push(Part::ToolCall(ToolCall {
                id: block.get("id").and_then(Value::as_str).unwrap_or("").to_string(),
                name: block.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                arguments: block.get("input").cloned().unwrap_or(Value::Null),
            })),
            _ => {}
        }
    }
    Ok(ModelResponse::new(parts))
}

// ── OpenAI-compatible ────────────────────────────────────────────

fn image_url(mime_type: &str, data: &[u8]) -> Value {
    json!({
        "type": "image_url",
        "image_url": { "url": format!("data:{mime_type};base64,{}", encode_image(data)) },
    })
}

fn joined_text(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// User content is a plain string unless it carries images.
fn openai_user_message(parts: &[Part]) -> Option<Value> {
    let has_images = parts.iter().any(|p| matches!(p, Part::Image { .. }));
    if !has_images {
        let text = joined_text(parts);
        return (!text.is_empty()).then(|| json!({ "role": "user", "content": text }));
    }
    let content: Vec<Value> = parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text, .. } => Some(json!({ "type": "text", "text": text })),
            Part::Image { mime_type, data } => Some(image_url(mime_type, data)),
            _ => None,
        })
        .collect();
    Some(json!({ "role": "user", "content": content }))
}

pub(crate) fn openai_messages(conversation: &[Message]) -> Vec<Value> {
    let mut out = vec![json!({ "role": "system", "content": SYSTEM_PROMPT })];

    for message in conversation {
        match message.role {
            Role::User => out.extend(openai_user_message(&message.parts)),
            Role::Assistant => {
                let text = joined_text(&message.parts);
                let tool_calls: Vec<Value> = message
                    .tool_calls()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": serde_json::to_string(&call.arguments).unwrap_or_default(),
                            }
                        })
                    })
                    .collect();

                let mut msg = serde_json::Map::new();
                msg.insert("role".to_string(), Value::String("assistant".to_string()));
                if !text.is_empty() {
                    msg.insert("content".to_string(), Value::String(text));
                }
                if !tool_calls.is_empty() {
                    msg.insert("tool_calls".to_string(), Value::Array(tool_calls));
                }
                out.push(Value::Object(msg));
            }
            Role::Tool => {
                for part in &message.parts {
                    if let Part::ToolResult(result) = part {
                        out.push(json!({
                            "role": "tool",
                            "tool_call_id": result.call_id,
                            "content": response_text(result),
                        }));
                    }
                }
                // Tool messages can't hold images; send them in a follow-up user turn.
                let images: Vec<Part> = message
                    .parts
                    .iter()
                    .filter(|p| matches!(p, Part::Image { .. }))
                    .cloned()
                    .collect();
                if !images.is_empty() {
                    out.extend(openai_user_message(&images));
                }
            }
        }
    }
    out
}

pub(crate) fn openai_body(model: &str, conversation: &[Message], tools: &[ToolDeclaration]) -> Value {
    let tools: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect();
    json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "messages": openai_messages(conversation),
        "tools": tools,
    })
}

pub(crate) fn parse_openai_response(json: &Value) -> Result<ModelResponse, ProviderError> {
    let message = json
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| ProviderError::Fatal("no message in OpenAI response".to_string()))?;

    let mut parts = Vec::new();

    if let Some(reasoning) = message.get("reasoning_content").and_then(Value::as_str) {
        if !reasoning.is_empty() {
            parts.push(Part::Text {
                text: reasoning.to_string(),
                thought: true,
            });
        }
    }

    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            parts.push(Part::text(text));
        }
    }

    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for tc in tool_calls {
            let func = tc.get("function").unwrap_or(&Value::Null);
            let arguments = func.get("arguments").and_then(Value::as_str).unwrap_or("{}");
            parts.push(Part::ToolCall(ToolCall {
                id: tc.get("id").and_then(Value::as_str).unwrap_or("").to_string(),
                name: func.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                arguments: serde_json::from_str(arguments).unwrap_or(Value::Null),
            }));
        }
    }

    Ok(ModelResponse::new(parts))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::tools::tool_declarations;

    fn transcript() -> Vec<Message> {
        vec![
            Message::user("Add a red ball."),
            Message::assistant(vec![
                Part::Text {
                    text: "planning".into(),
                    thought: true,
                },
                Part::ToolCall(ToolCall {
                    id: "toolu_1".into(),
                    name: "render_scene".into(),
                    arguments: json!({}),
                }),
            ]),
            Message::tool_results(vec![
                Part::Image {
                    mime_type: "image/png".into(),
                    data: vec![1, 2, 3],
                },
                Part::ToolResult(ToolResult {
                    call_id: "toolu_1".into(),
                    name: "render_scene".into(),
                    response: json!({ "success": true }),
                }),
            ]),
        ]
    }

    fn config(provider: LlmProvider, key: Option<&str>) -> LlmProviderConfig {
        LlmProviderConfig {
            provider,
            api_key: key.map(str::to_string),
            base_url: None,
            model: None,
        }
    }

    #[test]
    fn resolves_default_urls_and_models() {
        let client = reqwest::Client::new();
        let anthropic = HttpProvider::from_config(client.clone(), "anthropic", &config(LlmProvider::Anthropic, Some("k"))).unwrap();
        assert_eq!(anthropic.url(), ANTHROPIC_URL);
        assert_eq!(anthropic.model(), ANTHROPIC_MODEL);

        let mut oai = config(LlmProvider::OpenAiCompatible, Some("k"));
        oai.base_url = Some("http://localhost:11434/v1/".into());
        oai.model = Some("llama3".into());
        let local = HttpProvider::from_config(client.clone(), "local", &oai).unwrap();
        assert_eq!(local.url(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(local.model(), "llama3");

        let missing = HttpProvider::from_config(client, "anthropic", &config(LlmProvider::Anthropic, Some("")));
        assert!(matches!(missing, Err(ProviderError::Fatal(_))));
    }

    #[test]
    fn anthropic_body_carries_tools_and_tool_results() {
        let body = anthropic_body("m", &transcript(), &tool_declarations());
        assert_eq!(body["system"], SYSTEM_PROMPT);
        assert_eq!(body["tools"][0]["name"], "create_shape");
        assert!(body["tools"][0]["input_schema"]["properties"].is_object());

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["text"], "planning");
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(messages[2]["content"][1]["source"]["data"], "AQID");
    }

    #[test]
    fn anthropic_messages_drop_empty_text() {
        let conversation = vec![
            Message::user("hi"),
            Message::assistant(vec![
                Part::text(""),
                Part::Text {
                    text: String::new(),
                    thought: true,
                },
                Part::ToolCall(ToolCall {
                    id: "toolu_1".into(),
                    name: "get_scene_state".into(),
                    arguments: json!({}),
                }),
            ]),
            Message::assistant(vec![Part::text("")]),
        ];
        let messages = anthropic_messages(&conversation);
        assert_eq!(messages.len(), 2);
        let content = messages[1]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["type"], "tool_use");
    }

    #[test]
    fn openai_body_splits_tool_results_and_images() {
        let body = openai_body("m", &transcript(), &tool_declarations());
        assert_eq!(body["tools"][0]["type"], "function");
        assert!(body["tools"][0]["function"]["parameters"].is_object());

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "Add a red ball.");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["name"], "render_scene");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["content"], r#"{"success":true}"#);
        assert_eq!(messages[4]["role"], "user");
        assert_eq!(messages[4]["content"][0]["image_url"]["url"], "data:image/png;base64,AQID");
    }

    #[test]
    fn parses_anthropic_thinking_text_and_tool_use() {
        let json = json!({
            "stop_reason": "tool_use",
            "content": [
                { "type": "thinking", "thinking": "a sphere fits" },
                { "type": "text", "text": "Adding it." },
                { "type": "tool_use", "id": "toolu_9", "name": "create_shape", "input": { "shapes": [] } }
            ]
        });
        let response = parse_anthropic_response(&json).unwrap();
        assert_eq!(response.parts.len(), 3);
        assert!(matches!(&response.parts[0], Part::Text { thought: true, .. }));
        assert_eq!(response.parts[1], Part::text("Adding it."));
        let call = response.tool_calls().next().unwrap();
        assert_eq!(call.id, "toolu_9");
        assert_eq!(call.arguments, json!({ "shapes": [] }));
    }

    #[test]
    fn parses_openai_reasoning_and_string_arguments() {
        let json = json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "reasoning_content": "think",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "remove_shape", "arguments": "{\"id\":\"s1\"}" }
                    }]
                }
            }]
        });
        let response = parse_openai_response(&json).unwrap();
        assert_eq!(response.parts.len(), 2);
        assert!(matches!(&response.parts[0], Part::Text { thought: true, .. }));
        assert_eq!(response.tool_calls().next().unwrap().arguments, json!({ "id": "s1" }));

        assert!(parse_openai_response(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        assert!(matches!(
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down"),
            ProviderError::Transient(_)
        ));
        assert!(matches!(classify_status(reqwest::StatusCode::BAD_GATEWAY, ""), ProviderError::Transient(_)));
        let fatal = classify_status(reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert_eq!(fatal, ProviderError::Fatal("API error 401 Unauthorized: bad key".into()));
    }
}
