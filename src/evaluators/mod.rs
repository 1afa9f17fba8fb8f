//! Metrics computed over a finished set of runs of one scenario.

use crate::{scenario::Scenario, types::Run};

pub mod dag;
pub mod efficiency;
pub mod state;
pub mod tool_accuracy;

pub use dag::DagProgressEvaluator;
pub use efficiency::{EfficiencyEvaluator, EfficiencyReport};
pub use state::StateEvaluator;
pub use tool_accuracy::{ToolAccuracy, ToolAccuracyEvaluator};

pub trait Evaluator {
    type Output;

    fn evaluate(&self, runs: &[Run], scenario: &Scenario) -> Self::Output;
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::{
        scenario::{Checkpoint, Scenario},
        types::{AgentResponse, Run, State, ToolCall, Turn},
    };

    pub fn scenario(checkpoints: Vec<Checkpoint>) -> Scenario {
        Scenario {
            name: "eval".into(),
            description: String::new(),
            tags: Vec::new(),
            initial_state: State::new(),
            conversation_script: Vec::new(),
            success: checkpoints.last().map(|cp| cp.id.clone()).unwrap_or_default(),
            checkpoints,
            expected_final_state: State::new(),
            expected_tools: Default::default(),
            constraints: Default::default(),
        }
    }

    pub fn run(reached: &[&str]) -> Run {
        Run {
            run_id: "r".into(),
            scenario: "eval".into(),
            turns: Vec::new(),
            final_state: State::new(),
            checkpoints_reached: reached.iter().map(|s| s.to_string()).collect(),
            success: false,
            total_tokens: 0,
            total_cost: 0.0,
            total_latency_ms: 0.0,
        }
    }

    /// A run with one turn per entry, each turn calling the listed tools.
    pub fn run_with_tools(turn_tools: &[&[&str]]) -> Run {
        let mut run = run(&[]);
        for (i, tools) in turn_tools.iter().enumerate() {
            let response = tools
                .iter()
                .fold(AgentResponse::new("ok"), |resp, name| resp.with_tool_call(ToolCall::new(*name)));
            run.turns.push(Turn {
                turn_id: i,
                user_message: format!("message {i}"),
                agent_response: response,
                elapsed_checkpoints: Vec::new(),
                cumulative_state: State::new(),
            });
        }
        run
    }
}
