use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keyed state tree carried through a run. Keys keep their insertion order.
pub type State = Map<String, Value>;

/// A single tool invocation reported by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub latency_ms: f64,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
            result: Value::Null,
            latency_ms: 0.0,
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = result;
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// Everything the agent produced for one user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub state_changes: State,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl AgentResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tool_calls: Vec::new(),
            state_changes: State::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn with_state_change(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state_changes.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Token count reported in `metadata.tokens`, zero when missing or not a number.
    pub fn tokens(&self) -> u64 {
        match self.metadata.get("tokens") {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Cost reported in `metadata.cost`, zero when missing or not a number.
    pub fn cost(&self) -> f64 {
        self.metadata
            .get("cost")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    pub fn latency_ms(&self) -> f64 {
        self.tool_calls.iter().map(|call| call.latency_ms).sum()
    }
}

/// One user message and the agent's answer to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: usize,
    pub user_message: String,
    pub agent_response: AgentResponse,
    /// Checkpoints first reached on this turn.
    #[serde(default)]
    pub elapsed_checkpoints: Vec<String>,
    /// Working state after this turn's delta was merged.
    #[serde(default)]
    pub cumulative_state: State,
}

/// A complete replay of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub scenario: String,
    #[serde(default)]
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub final_state: State,
    /// Reached checkpoint ids in the order they were reached.
    #[serde(default)]
    pub checkpoints_reached: Vec<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub total_latency_ms: f64,
}

impl Run {
    /// Distinct tool names invoked anywhere in the run.
    pub fn called_tools(&self) -> BTreeSet<&str> {
        self.turns
            .iter()
            .flat_map(|turn| turn.agent_response.tool_calls.iter())
            .map(|call| call.name.as_str())
            .collect()
    }
}

/// Aggregate over k runs of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub project: String,
    pub scenario: String,
    pub k: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runs: Vec<Run>,
    pub pass_k: f64,
    pub state_correctness: f64,
    pub checkpoint_completion: f64,
    pub tool_accuracy: f64,
    pub forbidden_tool_violations: usize,
    pub avg_turns: f64,
    pub avg_tokens: u64,
    pub avg_cost: f64,
    pub avg_latency_ms: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraint_violations: Vec<String>,
}

impl EvalResult {
    /// Copy of the scalar metrics without the run list.
    pub fn summary(&self) -> EvalResult {
        EvalResult {
            project: self.project.clone(),
            scenario: self.scenario.clone(),
            k: self.k,
            runs: Vec::new(),
            pass_k: self.pass_k,
            state_correctness: self.state_correctness,
            checkpoint_completion: self.checkpoint_completion,
            tool_accuracy: self.tool_accuracy,
            forbidden_tool_violations: self.forbidden_tool_violations,
            avg_turns: self.avg_turns,
            avg_tokens: self.avg_tokens,
            avg_cost: self.avg_cost,
            avg_latency_ms: self.avg_latency_ms,
            constraint_violations: self.constraint_violations.clone(),
        }
    }
}
