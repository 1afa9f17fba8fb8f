use async_trait::async_trait;

use crate::{
    error::AdapterError,
    types::{AgentResponse, State, Turn},
};

pub mod llm;
pub mod scripted;

pub use llm::{LlmAdapter, LlmSettings, Provider, ToolFixture, ToolSpec};
pub use scripted::ScriptedAdapter;

/// Read-only view of the run handed to the adapter on every turn.
///
/// Adapters report state changes through [`AgentResponse::state_changes`]; they
/// never see a mutable handle on the working state.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext<'a> {
    pub session_id: &'a str,
    pub turn_number: usize,
    pub initial_state: &'a State,
    pub current_state: &'a State,
    pub history: &'a [Turn],
}

/// The agent under test.
#[async_trait]
pub trait AgentAdapter: Send {
    async fn send_message(
        &mut self,
        message: &str,
        context: &SessionContext<'_>,
    ) -> Result<AgentResponse, AdapterError>;

    /// Returns the agent to a clean state before a new run.
    async fn reset(&mut self) -> Result<(), AdapterError>;

    fn name(&self) -> &str;
}
