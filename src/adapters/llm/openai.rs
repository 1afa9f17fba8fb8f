//! Chat completions wire format.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use super::{Completion, Entry, LlmSettings, PendingCall};
use crate::error::AdapterError;

#[derive(Debug, Serialize)]
pub(super) struct RequestBody<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl Message {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<WireToolCall>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<WireToolCall>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded argument object.
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub(super) fn request_body<'a>(settings: &'a LlmSettings, history: &[Entry]) -> RequestBody<'a> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if let Some(system) = settings.system_prompt() {
        messages.push(Message::text("system", system));
    }
    for entry in history {
        messages.push(match entry {
            Entry::User(text) => Message::text("user", text.as_str()),
            Entry::Assistant { text, calls } => Message {
                role: "assistant".to_string(),
                content: text.clone(),
                tool_calls: calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: function_kind(),
                        function: WireFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect(),
                tool_call_id: None,
            },
            Entry::ToolResult { call_id, content } => Message {
                tool_call_id: Some(call_id.clone()),
                ..Message::text("tool", content.as_str())
            },
        });
    }

    let tools: Vec<Value> = settings
        .tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description.clone().unwrap_or_default(),
                    "parameters": tool.schema(),
                }
            })
        })
        .collect();

    RequestBody {
        model: &settings.model,
        messages,
        tools: if tools.is_empty() { None } else { Some(tools) },
        temperature: settings.temperature,
    }
}

pub(super) fn parse_completion(body: &str) -> Result<Completion, AdapterError> {
    let response: CompletionResponse = serde_json::from_str(body)?;
    let tokens = response
        .usage
        .map(|usage| usage.prompt_tokens + usage.completion_tokens)
        .unwrap_or(0);
    let message = response
        .choices
        .into_iter()
        .next()
        .ok_or(AdapterError::InvalidResponse("response did not contain any choices"))?
        .message;

    let calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            let arguments = if call.function.arguments.trim().is_empty() {
                Value::Object(Map::new())
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|_| {
                    AdapterError::InvalidResponse("tool call arguments contained invalid json")
                })?
            };
            Ok(PendingCall {
                id: call.id,
                name: call.function.name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>, AdapterError>>()?;

    Ok(Completion {
        text: message.content,
        calls,
        tokens,
    })
}
