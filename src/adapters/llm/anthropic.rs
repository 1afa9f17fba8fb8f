//! Messages API wire format.
//!
//! Tool calls and their results travel as content blocks. Results go back in a
//! `user` message, and consecutive entries of the same role share one message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Completion, Entry, LlmSettings, PendingCall};
use crate::error::AdapterError;

pub(super) const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
pub(super) struct RequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Tool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Block kinds this adapter does not act on, such as `thinking`.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<Block>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

fn push_block(messages: &mut Vec<Message>, role: &'static str, block: Block) {
    match messages.last_mut() {
        Some(last) if last.role == role => last.content.push(block),
        _ => messages.push(Message {
            role,
            content: vec![block],
        }),
    }
}

pub(super) fn request_body<'a>(settings: &'a LlmSettings, history: &[Entry]) -> RequestBody<'a> {
    let mut messages: Vec<Message> = Vec::with_capacity(history.len());
    for entry in history {
        match entry {
            Entry::User(text) => push_block(&mut messages, "user", Block::Text { text: text.clone() }),
            Entry::Assistant { text, calls } => {
                if let Some(text) = text.as_deref().filter(|t| !t.is_empty()) {
                    push_block(&mut messages, "assistant", Block::Text { text: text.to_string() });
                }
                for call in calls {
                    push_block(
                        &mut messages,
                        "assistant",
                        Block::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: call.arguments.clone(),
                        },
                    );
                }
            }
            Entry::ToolResult { call_id, content } => push_block(
                &mut messages,
                "user",
                Block::ToolResult {
                    tool_use_id: call_id.clone(),
                    content: content.clone(),
                },
            ),
        }
    }

    let tools = settings
        .tools
        .iter()
        .map(|tool| Tool {
            name: &tool.name,
            description: tool.description.as_deref().unwrap_or_default(),
            input_schema: tool.schema(),
        })
        .collect();

    RequestBody {
        model: &settings.model,
        max_tokens: settings.max_tokens,
        system: settings.system_prompt(),
        messages,
        tools,
        temperature: settings.temperature,
    }
}

pub(super) fn parse_completion(body: &str) -> Result<Completion, AdapterError> {
    let response: MessagesResponse = serde_json::from_str(body)?;
    let tokens = response
        .usage
        .map(|usage| usage.input_tokens + usage.output_tokens)
        .unwrap_or(0);

    let mut text: Vec<String> = Vec::new();
    let mut calls = Vec::new();
    for block in response.content {
        match block {
            Block::Text { text: t } => text.push(t),
            Block::ToolUse { id, name, input } => calls.push(PendingCall {
                id,
                name,
                arguments: input,
            }),
            Block::ToolResult { .. } | Block::Other => {}
        }
    }

    Ok(Completion {
        text: if text.is_empty() { None } else { Some(text.join("\n")) },
        calls,
        tokens,
    })
}
