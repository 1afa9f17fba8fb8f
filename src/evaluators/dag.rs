use crate::{evaluators::Evaluator, scenario::Scenario, types::Run};

/// Mean fraction of the scenario's checkpoints reached per run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DagProgressEvaluator;

impl Evaluator for DagProgressEvaluator {
    type Output = f64;

    fn evaluate(&self, runs: &[Run], scenario: &Scenario) -> f64 {
        if runs.is_empty() || scenario.checkpoints.is_empty() {
            return 0.0;
        }
        let total = scenario.checkpoints.len() as f64;
        let sum: f64 = runs
            .iter()
            .map(|run| run.checkpoints_reached.len() as f64 / total)
            .sum();
        sum / runs.len() as f64
    }
}
