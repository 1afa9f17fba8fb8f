use serde::Serialize;

use crate::{evaluators::Evaluator, scenario::Scenario, types::Run};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EfficiencyReport {
    pub avg_turns: f64,
    /// Mean token count, truncated.
    pub avg_tokens: u64,
    pub avg_cost: f64,
    pub avg_latency_ms: f64,
    /// Names of the constraints whose mean exceeded the bound.
    pub constraint_violations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EfficiencyEvaluator;

impl Evaluator for EfficiencyEvaluator {
    type Output = EfficiencyReport;

    fn evaluate(&self, runs: &[Run], scenario: &Scenario) -> EfficiencyReport {
        if runs.is_empty() {
            return EfficiencyReport::default();
        }

        let n = runs.len() as f64;
        let avg_turns = runs.iter().map(|r| r.turns.len() as f64).sum::<f64>() / n;
        let avg_tokens = runs.iter().map(|r| r.total_tokens as f64).sum::<f64>() / n;
        let avg_cost = runs.iter().map(|r| r.total_cost).sum::<f64>() / n;
        let avg_latency_ms = runs.iter().map(|r| r.total_latency_ms).sum::<f64>() / n;

        let constraints = &scenario.constraints;
        let checks = [
            ("max_turns", constraints.max_turns, avg_turns),
            ("max_cost", constraints.max_cost, avg_cost),
            ("max_latency", constraints.max_latency, avg_latency_ms),
        ];
        let constraint_violations = checks
            .into_iter()
            .filter_map(|(name, bound, value)| match bound {
                Some(bound) if bound != 0.0 && value > bound => Some(name.to_string()),
                _ => None,
            })
            .collect();

        EfficiencyReport {
            avg_turns,
            avg_tokens: avg_tokens as u64,
            avg_cost,
            avg_latency_ms,
            constraint_violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::fixtures;

    fn run(turns: usize, tokens: u64, cost: f64, latency: f64) -> Run {
        let calls: Vec<&[&str]> = vec![&[]; turns];
        let mut run = fixtures::run_with_tools(&calls);
        run.total_tokens = tokens;
        run.total_cost = cost;
        run.total_latency_ms = latency;
        run
    }

    #[test]
    fn flags_exceeded_constraints() {
        let mut scenario = fixtures::scenario(Vec::new());
        scenario.constraints.max_turns = Some(5.0);
        scenario.constraints.max_cost = Some(0.05);

        let report = EfficiencyEvaluator.evaluate(&[run(8, 100, 0.10, 50.0)], &scenario);
        assert_eq!(report.avg_turns, 8.0);
        assert_eq!(report.constraint_violations, vec!["max_turns", "max_cost"]);
    }

    #[test]
    fn averages_and_truncates_tokens() {
        let mut scenario = fixtures::scenario(Vec::new());
        scenario.constraints.max_latency = Some(100.0);

        let report = EfficiencyEvaluator.evaluate(
            &[run(2, 10, 0.01, 40.0), run(4, 15, 0.03, 80.0)],
            &scenario,
        );
        assert_eq!(report.avg_turns, 3.0);
        assert_eq!(report.avg_tokens, 12);
        assert!((report.avg_cost - 0.02).abs() < 1e-12);
        assert_eq!(report.avg_latency_ms, 60.0);
        assert!(report.constraint_violations.is_empty());
    }

    #[test]
    fn zero_bound_is_not_checked() {
        let mut scenario = fixtures::scenario(Vec::new());
        scenario.constraints.max_turns = Some(0.0);
        let report = EfficiencyEvaluator.evaluate(&[run(3, 0, 0.0, 0.0)], &scenario);
        assert!(report.constraint_violations.is_empty());
    }

    #[test]
    fn no_runs_yield_zeroes() {
        let mut scenario = fixtures::scenario(Vec::new());
        scenario.constraints.max_turns = Some(1.0);
        assert_eq!(EfficiencyEvaluator.evaluate(&[], &scenario), EfficiencyReport::default());
    }
}
