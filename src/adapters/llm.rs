use std::{
    env, fs,
    path::Path,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    adapters::{AgentAdapter, SessionContext},
    error::AdapterError,
    state::merge_state,
    types::{AgentResponse, State, ToolCall},
};

mod anthropic;
mod openai;

fn default_max_rounds() -> usize {
    8
}

fn default_max_tokens() -> u32 {
    4096
}

/// Wire format spoken by the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Chat completions (`/chat/completions`), also served by most compatible gateways.
    #[default]
    OpenAi,
    /// Messages API (`/messages`).
    Anthropic,
}

impl Provider {
    fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    fn default_api_key_env(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

/// Settings file for [`LlmAdapter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: Provider,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Defaults to the provider's public endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key; defaults per provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Completion rounds allowed per user message before the turn is closed.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Output token cap, required by the Anthropic API.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

impl LlmSettings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| AdapterError::Settings(format!("{}: {e}", path.display())))?;
        serde_yaml::from_str(&content)
            .map_err(|e| AdapterError::Settings(format!("{}: {e}", path.display())))
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }

    fn system_prompt(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
    }
}

/// A tool the model may call, answered from canned fixtures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parameter name to either a JSON type name or a full property schema.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub fixtures: Vec<ToolFixture>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFixture {
    pub when: Value,
    pub then: Value,
}

impl ToolSpec {
    fn schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, def) in &self.parameters {
            let property = match def {
                Value::Object(_) => def.clone(),
                other => json!({ "type": other }),
            };
            properties.insert(name.clone(), property);
            required.push(Value::String(name.clone()));
        }
        json!({ "type": "object", "properties": properties, "required": required })
    }

    fn respond(&self, arguments: &Value) -> Value {
        self.fixtures
            .iter()
            .find(|fixture| value_is_subset(&fixture.when, arguments))
            .map(|fixture| fixture.then.clone())
            .or_else(|| self.default.clone())
            .unwrap_or_else(|| json!({ "error": format!("no fixture matched for {}", self.name) }))
    }
}

fn value_is_subset(expected: &Value, actual: &Value) -> bool {
    let (Value::Object(expected), Value::Object(actual)) = (expected, actual) else {
        return expected == actual;
    };
    expected
        .iter()
        .all(|(k, v)| actual.get(k).is_some_and(|av| value_is_subset(v, av)))
}

/// Conversation kept by the adapter, rendered into each provider's wire format per request.
#[derive(Debug, Clone, PartialEq)]
enum Entry {
    User(String),
    Assistant {
        text: Option<String>,
        calls: Vec<PendingCall>,
    },
    ToolResult {
        call_id: String,
        content: String,
    },
}

/// A tool call requested by the model, arguments already decoded.
#[derive(Debug, Clone, PartialEq)]
struct PendingCall {
    id: String,
    name: String,
    arguments: Value,
}

/// One model reply, independent of the provider.
#[derive(Debug)]
struct Completion {
    text: Option<String>,
    calls: Vec<PendingCall>,
    tokens: u64,
}

/// Agent backed by a hosted chat model.
///
/// Conversation history lives in the adapter and is cleared by `reset`. Tool
/// calls are answered from the settings' fixtures; a fixture result carrying a
/// `state_changes` object feeds the turn's state delta.
#[derive(Debug, Clone)]
pub struct LlmAdapter {
    client: Client,
    settings: LlmSettings,
    api_key: String,
    history: Vec<Entry>,
}

impl LlmAdapter {
    pub fn new(settings: LlmSettings) -> Result<Self, AdapterError> {
        let key_env = settings.api_key_env().to_string();
        let api_key = env::var(&key_env).map_err(|_| AdapterError::MissingApiKey(key_env))?;
        Self::with_api_key(settings, api_key)
    }

    pub fn with_api_key(
        settings: LlmSettings,
        api_key: impl Into<String>,
    ) -> Result<Self, AdapterError> {
        let timeout = Duration::from_millis(settings.request_timeout_ms.unwrap_or(60_000));
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            settings,
            api_key: api_key.into(),
            history: Vec::new(),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        Self::new(LlmSettings::from_file(path)?)
    }

    fn request(&self) -> RequestBuilder {
        let base = self.settings.base_url();
        match self.settings.provider {
            Provider::OpenAi => self
                .client
                .post(format!("{base}/chat/completions"))
                .bearer_auth(&self.api_key)
                .json(&openai::request_body(&self.settings, &self.history)),
            Provider::Anthropic => self
                .client
                .post(format!("{base}/messages"))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", anthropic::API_VERSION)
                .json(&anthropic::request_body(&self.settings, &self.history)),
        }
    }

    async fn complete(&self) -> Result<Completion, AdapterError> {
        let response = self.request().send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&text) {
                return Err(AdapterError::Provider(envelope.error.message));
            }
            return Err(AdapterError::Provider(format!("unexpected status {status}: {text}")));
        }

        match self.settings.provider {
            Provider::OpenAi => openai::parse_completion(&text),
            Provider::Anthropic => anthropic::parse_completion(&text),
        }
    }

    fn run_tool(&self, call: &PendingCall) -> ToolCall {
        let started = Instant::now();
        let result = match self.settings.tools.iter().find(|tool| tool.name == call.name) {
            Some(tool) => tool.respond(&call.arguments),
            None => json!({ "error": format!("unknown tool: {}", call.name) }),
        };

        ToolCall {
            name: call.name.clone(),
            arguments: match &call.arguments {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            },
            result,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

#[async_trait]
impl AgentAdapter for LlmAdapter {
    async fn send_message(
        &mut self,
        message: &str,
        _context: &SessionContext<'_>,
    ) -> Result<AgentResponse, AdapterError> {
        self.history.push(Entry::User(message.to_string()));

        let mut tool_calls = Vec::new();
        let mut state_changes = State::new();
        let mut text = Vec::new();
        let mut tokens = 0u64;

        for _ in 0..self.settings.max_rounds.max(1) {
            let completion = self.complete().await?;
            tokens += completion.tokens;
            if let Some(content) = completion.text.as_deref().filter(|c| !c.is_empty()) {
                text.push(content.to_string());
            }

            let calls = completion.calls;
            self.history.push(Entry::Assistant {
                text: completion.text,
                calls: calls.clone(),
            });
            if calls.is_empty() {
                break;
            }

            for call in &calls {
                let record = self.run_tool(call);
                if let Some(Value::Object(delta)) = record.result.get("state_changes") {
                    merge_state(&mut state_changes, delta);
                }
                let content = match &record.result {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                self.history.push(Entry::ToolResult {
                    call_id: call.id.clone(),
                    content,
                });
                tool_calls.push(record);
            }
        }

        let mut response = AgentResponse::new(text.join("\n")).with_metadata("tokens", tokens);
        response.tool_calls = tool_calls;
        response.state_changes = state_changes;
        Ok(response)
    }

    async fn reset(&mut self) -> Result<(), AdapterError> {
        self.history.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}

/// Error body shape shared by both APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn settings() -> LlmSettings {
        serde_yaml::from_str(
            r#"
model: gpt-4o-mini
system_prompt: You are a support agent.
tools:
  - name: lookup_order
    description: Find an order
    parameters:
      order_id: string
      verbose: { type: boolean, description: include history }
    fixtures:
      - when: { order_id: o1 }
        then: { found: true, status: delivered }
    default: { found: false }
  - name: process_refund
    parameters: { order_id: string }
    fixtures:
      - when: {}
        then: { success: true, state_changes: { status: refunded } }
"#,
        )
        .unwrap()
    }

    #[test]
    fn settings_fill_defaults_per_provider() {
        let settings = settings();
        assert_eq!(settings.provider, Provider::OpenAi);
        assert_eq!(settings.base_url(), "https://api.openai.com/v1");
        assert_eq!(settings.api_key_env(), "OPENAI_API_KEY");
        assert_eq!(settings.max_rounds, 8);
        assert_eq!(settings.max_tokens, 4096);
        assert_eq!(settings.tools.len(), 2);

        let claude: LlmSettings = serde_yaml::from_str(
            "provider: anthropic\nmodel: claude-sonnet-4-5\nbase_url: http://localhost:9000/v1/\n",
        )
        .unwrap();
        assert_eq!(claude.provider, Provider::Anthropic);
        assert_eq!(claude.api_key_env(), "ANTHROPIC_API_KEY");
        assert_eq!(claude.base_url(), "http://localhost:9000/v1");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let parsed = serde_yaml::from_str::<LlmSettings>("provider: cohere\nmodel: x\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn tool_schema_marks_every_parameter_required() {
        let schema = settings().tools[0].schema();
        assert_eq!(schema["properties"]["order_id"], json!({ "type": "string" }));
        assert_eq!(schema["properties"]["verbose"]["type"], "boolean");
        assert_eq!(schema["required"], json!(["order_id", "verbose"]));
    }

    #[test]
    fn fixtures_match_by_subset_then_default() {
        let tool = &settings().tools[0];
        assert_eq!(tool.respond(&json!({ "order_id": "o1", "verbose": true }))["status"], "delivered");
        assert_eq!(tool.respond(&json!({ "order_id": "o9" })), json!({ "found": false }));
    }

    #[test]
    fn run_tool_records_arguments_and_unknown_tools() {
        let adapter = LlmAdapter::with_api_key(settings(), "test-key").unwrap();
        let call = PendingCall {
            id: "call_1".into(),
            name: "process_refund".into(),
            arguments: json!({ "order_id": "o1" }),
        };
        let record = adapter.run_tool(&call);
        assert_eq!(record.arguments.get("order_id"), Some(&json!("o1")));
        assert_eq!(record.result["state_changes"]["status"], "refunded");

        let unknown = PendingCall {
            name: "wipe_db".into(),
            arguments: json!({}),
            ..call
        };
        let record = adapter.run_tool(&unknown);
        assert!(record.result["error"].as_str().unwrap().contains("wipe_db"));
    }

    #[tokio::test]
    async fn reset_clears_history() {
        let mut adapter = LlmAdapter::with_api_key(settings(), "test-key").unwrap();
        adapter.history.push(Entry::User("hello".into()));
        adapter.reset().await.unwrap();
        assert!(adapter.history.is_empty());
    }
}
