pub mod adapters;
pub mod config;
pub mod dag;
pub mod error;
pub mod evaluators;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod state;
pub mod store;
pub mod types;

pub use adapters::{AgentAdapter, LlmAdapter, LlmSettings, ScriptedAdapter, SessionContext};
pub use config::{AdapterConfig, AdapterKind, ProjectConfig, Thresholds};
pub use dag::{blocking_info, validate_dag, BlockingInfo};
pub use error::{AdapterError, ConfigError, ReportError, ScenarioError, StoreError};
pub use evaluators::{
    DagProgressEvaluator, EfficiencyEvaluator, EfficiencyReport, Evaluator, StateEvaluator,
    ToolAccuracy, ToolAccuracyEvaluator,
};
pub use runner::{execute_run, run_scenarios, EvalRunner, RunnerError};
pub use scenario::{
    load_scenario, load_scenarios, load_scenarios_from_dir, Checkpoint, Constraints,
    ExpectedTools, Requirement, Scenario,
};
pub use state::{compare_field, compare_state, merge_state, StateComparison};
pub use store::{JsonlStore, StoredResult, StoredRun};
pub use types::{AgentResponse, EvalResult, Run, State, ToolCall, Turn};
pub use schemars::JsonSchema;
