use std::fmt::Write as _;

use handlebars::Handlebars;
use serde::Serialize;

use crate::{dag::blocking_info, error::ReportError, scenario::Scenario, types::EvalResult};

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>agenteval</title>
<style>
body{font-family:sans-serif;max-width:1000px;margin:40px auto}
table{border-collapse:collapse;width:100%}
th,td{border:1px solid #ddd;padding:8px;text-align:right}
td:first-child,th:first-child{text-align:left}
th{background:#1a1a2e;color:#fff}
</style>
</head>
<body>
<h1>agenteval report</h1>
<table>
<thead><tr><th>Scenario</th><th>k</th><th>pass^k</th><th>State</th><th>Checkpoints</th><th>Tool Acc</th><th>Turns</th><th>Cost</th></tr></thead>
<tbody>
{{#each rows}}
<tr><td>{{scenario}}</td><td>{{k}}</td><td>{{pass_k}}</td><td>{{state}}</td><td>{{checkpoints}}</td><td>{{tool_accuracy}}</td><td>{{turns}}</td><td>{{cost}}</td></tr>
{{/each}}
</tbody>
</table>
</body>
</html>
"#;

/// One formatted table line, shared by the text and HTML reports.
#[derive(Debug, Serialize)]
struct Row {
    scenario: String,
    k: usize,
    pass_k: String,
    state: String,
    checkpoints: String,
    tool_accuracy: String,
    turns: String,
    cost: String,
}

impl Row {
    fn new(result: &EvalResult) -> Self {
        Self {
            scenario: result.scenario.clone(),
            k: result.k,
            pass_k: percent(result.pass_k),
            state: percent(result.state_correctness),
            checkpoints: percent(result.checkpoint_completion),
            tool_accuracy: percent(result.tool_accuracy),
            turns: format!("{:.1}", result.avg_turns),
            cost: format!("${:.4}", result.avg_cost),
        }
    }
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Pretty JSON array of the results, without their runs.
pub fn json_report(results: &[EvalResult]) -> Result<String, ReportError> {
    let summaries: Vec<EvalResult> = results.iter().map(EvalResult::summary).collect();
    Ok(serde_json::to_string_pretty(&summaries)?)
}

pub fn table_report(results: &[EvalResult]) -> String {
    let rows: Vec<Row> = results.iter().map(Row::new).collect();
    let width = rows
        .iter()
        .map(|row| row.scenario.chars().count())
        .chain(std::iter::once("Scenario".len()))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:>3}  {:>7}  {:>7}  {:>11}  {:>8}  {:>5}  {:>9}",
        "Scenario", "k", "pass^k", "State", "Checkpoints", "Tool Acc", "Turns", "Cost",
    );
    let _ = writeln!(out, "{}", "-".repeat(width + 2 + 3 + 2 + 7 + 2 + 7 + 2 + 11 + 2 + 8 + 2 + 5 + 2 + 9));
    for row in rows {
        let _ = writeln!(
            out,
            "{:<width$}  {:>3}  {:>7}  {:>7}  {:>11}  {:>8}  {:>5}  {:>9}",
            row.scenario,
            row.k,
            row.pass_k,
            row.state,
            row.checkpoints,
            row.tool_accuracy,
            row.turns,
            row.cost,
        );
    }
    out
}

pub fn html_report(results: &[EvalResult]) -> Result<String, ReportError> {
    #[derive(Serialize)]
    struct Data {
        rows: Vec<Row>,
    }

    let data = Data {
        rows: results.iter().map(Row::new).collect(),
    };
    Ok(Handlebars::new().render_template(HTML_TEMPLATE, &data)?)
}

/// Per-run breakdown: reached checkpoints and, for failed runs, what is still blocked.
pub fn run_details(result: &EvalResult, scenario: &Scenario) -> String {
    let mut out = String::new();
    for run in &result.runs {
        let status = if run.success { "ok" } else { "FAILED" };
        let _ = writeln!(
            out,
            "  {} [{status}] turns={} reached=[{}]",
            run.run_id,
            run.turns.len(),
            run.checkpoints_reached.join(", ")
        );
        if !run.success {
            let info = blocking_info(scenario, &run.checkpoints_reached);
            let _ = writeln!(
                out,
                "    unblocked=[{}] blocked=[{}]",
                info.unblocked.join(", "),
                info.blocked.join(", ")
            );
        }
    }
    if !result.constraint_violations.is_empty() {
        let _ = writeln!(
            out,
            "  constraint violations: {}",
            result.constraint_violations.join(", ")
        );
    }
    out
}
