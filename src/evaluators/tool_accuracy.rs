use std::collections::BTreeSet;

use serde::Serialize;

use crate::{evaluators::Evaluator, scenario::Scenario, types::Run};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToolAccuracy {
    /// Mean per-run share of required tools that were called at least once.
    pub required_tools_score: f64,
    /// Forbidden tools called, summed over all runs.
    pub forbidden_violations: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ToolAccuracyEvaluator;

impl Evaluator for ToolAccuracyEvaluator {
    type Output = ToolAccuracy;

    fn evaluate(&self, runs: &[Run], scenario: &Scenario) -> ToolAccuracy {
        let required = &scenario.expected_tools.required;
        let forbidden: BTreeSet<&str> = scenario
            .expected_tools
            .forbidden
            .iter()
            .map(String::as_str)
            .collect();

        let mut score = 0.0;
        let mut violations = 0;
        for run in runs {
            let called = run.called_tools();
            score += if required.is_empty() {
                1.0
            } else {
                let hits = required.iter().filter(|t| called.contains(t.as_str())).count();
                hits as f64 / required.len() as f64
            };
            violations += called.intersection(&forbidden).count();
        }

        ToolAccuracy {
            required_tools_score: score / runs.len().max(1) as f64,
            forbidden_violations: violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::fixtures;

    fn refund_scenario() -> Scenario {
        let mut scenario = fixtures::scenario(Vec::new());
        scenario.expected_tools.required = vec!["lookup_order".into(), "process_refund".into()];
        scenario.expected_tools.forbidden = vec!["delete_account".into()];
        scenario
    }

    #[test]
    fn scores_required_tools_per_run() {
        let scenario = refund_scenario();
        let partial = fixtures::run_with_tools(&[&["lookup_order"], &["lookup_order"]]);
        let full = fixtures::run_with_tools(&[&["lookup_order"], &["process_refund"]]);

        let result = ToolAccuracyEvaluator.evaluate(&[partial.clone()], &scenario);
        assert_eq!(result.required_tools_score, 0.5);
        assert_eq!(result.forbidden_violations, 0);

        let result = ToolAccuracyEvaluator.evaluate(&[full.clone()], &scenario);
        assert_eq!(result.required_tools_score, 1.0);

        let result = ToolAccuracyEvaluator.evaluate(&[partial, full], &scenario);
        assert_eq!(result.required_tools_score, 0.75);
    }

    #[test]
    fn forbidden_violations_are_summed_not_averaged() {
        let scenario = refund_scenario();
        let bad = fixtures::run_with_tools(&[
            &["lookup_order", "process_refund", "delete_account"],
            &["delete_account"],
        ]);
        let result = ToolAccuracyEvaluator.evaluate(&[bad.clone(), bad], &scenario);
        assert_eq!(result.required_tools_score, 1.0);
        assert_eq!(result.forbidden_violations, 2);
    }

    #[test]
    fn no_required_tools_scores_full() {
        let scenario = fixtures::scenario(Vec::new());
        let result = ToolAccuracyEvaluator.evaluate(&[fixtures::run_with_tools(&[])], &scenario);
        assert_eq!(result.required_tools_score, 1.0);

        let result = ToolAccuracyEvaluator.evaluate(&[], &refund_scenario());
        assert_eq!(result.required_tools_score, 0.0);
        assert_eq!(result.forbidden_violations, 0);
    }
}
