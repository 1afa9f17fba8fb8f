use crate::{evaluators::Evaluator, scenario::Scenario, state::compare_state, types::Run};

/// Fraction of runs whose final state fully matches the expected final state.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateEvaluator;

impl Evaluator for StateEvaluator {
    type Output = f64;

    fn evaluate(&self, runs: &[Run], scenario: &Scenario) -> f64 {
        if runs.is_empty() {
            return 0.0;
        }
        let matched = runs
            .iter()
            .filter(|run| compare_state(&scenario.expected_final_state, &run.final_state).matched)
            .count();
        matched as f64 / runs.len() as f64
    }
}
