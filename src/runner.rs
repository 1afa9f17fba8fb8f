use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    adapters::{AgentAdapter, SessionContext},
    dag::validate_dag,
    error::{AdapterError, ScenarioError},
    evaluators::{
        DagProgressEvaluator, EfficiencyEvaluator, Evaluator, StateEvaluator,
        ToolAccuracyEvaluator,
    },
    scenario::Scenario,
    state::{compare_state, merge_state},
    types::{AgentResponse, EvalResult, Run, Turn},
};

/// Replays `scenario` once against `adapter`.
///
/// Messages are sent in script order. After each reply the state delta is merged,
/// newly reachable checkpoints are recorded and the run stops early as soon as
/// the success checkpoint is reached. Adapter errors are returned as-is.
pub async fn execute_run(
    adapter: &mut dyn AgentAdapter,
    scenario: &Scenario,
    run_id: impl Into<String>,
) -> Result<Run, AdapterError> {
    let run_id = run_id.into();
    let mut state = scenario.initial_state.clone();
    let mut turns: Vec<Turn> = Vec::new();
    let mut reached: Vec<String> = Vec::new();
    let mut total_tokens = 0u64;
    let mut total_cost = 0.0;
    let mut total_latency_ms = 0.0;

    for (i, message) in scenario.conversation_script.iter().enumerate() {
        let context = SessionContext {
            session_id: &run_id,
            turn_number: i,
            initial_state: &scenario.initial_state,
            current_state: &state,
            history: &turns,
        };
        let response = adapter.send_message(message, &context).await?;

        if !response.state_changes.is_empty() {
            merge_state(&mut state, &response.state_changes);
        }

        let newly_reached = newly_reached(scenario, &reached, &response);
        reached.extend(newly_reached.iter().cloned());

        total_latency_ms += response.latency_ms();
        total_tokens += response.tokens();
        total_cost += response.cost();

        tracing::debug!(
            run_id = %run_id,
            turn = i,
            tools = response.tool_calls.len(),
            reached = ?newly_reached,
            "turn finished"
        );

        turns.push(Turn {
            turn_id: i,
            user_message: message.clone(),
            agent_response: response,
            elapsed_checkpoints: newly_reached,
            cumulative_state: state.clone(),
        });

        if reached.contains(&scenario.success) {
            break;
        }
    }

    let success = reached.contains(&scenario.success);
    tracing::info!(
        run_id = %run_id,
        scenario = %scenario.name,
        turns = turns.len(),
        success,
        "run finished"
    );

    Ok(Run {
        run_id,
        scenario: scenario.name.clone(),
        turns,
        final_state: state,
        checkpoints_reached: reached,
        success,
        total_tokens,
        total_cost,
        total_latency_ms,
    })
}

/// Checkpoints that become reached on this turn.
///
/// Dependencies are checked against `reached` as it stood before the turn, so a
/// checkpoint never unlocks a sibling within the same turn. An id declared more
/// than once is reported once.
fn newly_reached(scenario: &Scenario, reached: &[String], response: &AgentResponse) -> Vec<String> {
    let reached: HashSet<&str> = reached.iter().map(String::as_str).collect();
    let mut invoked: HashMap<&str, &Map<String, Value>> = HashMap::new();
    for call in &response.tool_calls {
        invoked.insert(call.name.as_str(), &call.arguments);
    }

    let mut collected: HashSet<&str> = HashSet::new();
    scenario
        .checkpoints
        .iter()
        .filter(|cp| !reached.contains(cp.id.as_str()))
        .filter(|cp| cp.depends_on.iter().all(|dep| reached.contains(dep.as_str())))
        .filter(|cp| cp.require.is_satisfied_by(&invoked))
        .filter(|cp| collected.insert(cp.id.as_str()))
        .map(|cp| cp.id.clone())
        .collect()
}

/// Runs `scenario` `k` times back to back and aggregates the metrics.
///
/// The adapter is reset before every run. A run counts toward pass^k only when it
/// reached the success checkpoint and its final state matches the expectation.
pub async fn run_scenarios(
    adapter: &mut dyn AgentAdapter,
    scenario: &Scenario,
    k: usize,
    project: &str,
) -> Result<EvalResult, AdapterError> {
    let mut runs = Vec::with_capacity(k);
    for i in 0..k {
        adapter.reset().await?;
        let run_id = format!("{}-{i}", scenario.name);
        runs.push(execute_run(adapter, scenario, run_id).await?);
    }

    let state_correctness = StateEvaluator.evaluate(&runs, scenario);
    let checkpoint_completion = DagProgressEvaluator.evaluate(&runs, scenario);
    let tools = ToolAccuracyEvaluator.evaluate(&runs, scenario);
    let efficiency = EfficiencyEvaluator.evaluate(&runs, scenario);

    let pass_count = runs
        .iter()
        .filter(|run| {
            run.success && compare_state(&scenario.expected_final_state, &run.final_state).matched
        })
        .count();
    let pass_k = if k == 0 { 0.0 } else { pass_count as f64 / k as f64 };

    tracing::info!(
        scenario = %scenario.name,
        k,
        pass_k,
        checkpoint_completion,
        "scenario evaluated"
    );

    Ok(EvalResult {
        project: project.to_string(),
        scenario: scenario.name.clone(),
        k,
        runs,
        pass_k,
        state_correctness,
        checkpoint_completion,
        tool_accuracy: tools.required_tools_score,
        forbidden_tool_violations: tools.forbidden_violations,
        avg_turns: efficiency.avg_turns,
        avg_tokens: efficiency.avg_tokens,
        avg_cost: efficiency.avg_cost,
        avg_latency_ms: efficiency.avg_latency_ms,
        constraint_violations: efficiency.constraint_violations,
    })
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("scenario '{scenario}' is invalid: {source}")]
    Scenario {
        scenario: String,
        #[source]
        source: ScenarioError,
    },

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Evaluates a batch of scenarios with the same adapter, k and project.
#[derive(Debug, Clone)]
pub struct EvalRunner {
    k: usize,
    project: String,
}

impl Default for EvalRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalRunner {
    pub fn new() -> Self {
        Self {
            k: 3,
            project: "default".to_string(),
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Validates every scenario up front, then evaluates them in order.
    pub async fn run_all(
        &self,
        adapter: &mut dyn AgentAdapter,
        scenarios: &[Scenario],
    ) -> Result<Vec<EvalResult>, RunnerError> {
        for scenario in scenarios {
            validate_dag(scenario).map_err(|source| RunnerError::Scenario {
                scenario: scenario.name.clone(),
                source,
            })?;
        }

        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            tracing::info!(scenario = %scenario.name, k = self.k, adapter = adapter.name(), "running scenario");
            results.push(run_scenarios(adapter, scenario, self.k, &self.project).await?);
        }
        Ok(results)
    }
}
