use std::{fs, path::Path};

use async_trait::async_trait;

use crate::{
    adapters::{AgentAdapter, SessionContext},
    error::AdapterError,
    types::AgentResponse,
};

/// Replays a fixed list of responses, one per message, in order.
///
/// Once the list is exhausted every further message gets a bare `"no more"`
/// response. [`AgentAdapter::reset`] rewinds to the first response.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAdapter {
    responses: Vec<AgentResponse>,
    current: usize,
    received: Vec<String>,
}

impl ScriptedAdapter {
    pub fn new(responses: Vec<AgentResponse>) -> Self {
        Self {
            responses,
            current: 0,
            received: Vec::new(),
        }
    }

    /// Reads a YAML or JSON list of responses.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| AdapterError::Settings(format!("{}: {e}", path.display())))?;
        let is_json = path.extension().and_then(|s| s.to_str()) == Some("json");
        let responses: Vec<AgentResponse> = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| AdapterError::Settings(format!("{}: {e}", path.display())))?
        };
        Ok(Self::new(responses))
    }

    /// Messages received since construction, across resets.
    pub fn received(&self) -> &[String] {
        &self.received
    }

    fn next_response(&mut self) -> AgentResponse {
        match self.responses.get(self.current) {
            Some(response) => {
                self.current += 1;
                response.clone()
            }
            None => AgentResponse::new("no more"),
        }
    }
}

#[async_trait]
impl AgentAdapter for ScriptedAdapter {
    async fn send_message(
        &mut self,
        message: &str,
        _context: &SessionContext<'_>,
    ) -> Result<AgentResponse, AdapterError> {
        self.received.push(message.to_string());
        Ok(self.next_response())
    }

    async fn reset(&mut self) -> Result<(), AdapterError> {
        self.current = 0;
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
