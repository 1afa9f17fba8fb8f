use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, types::EvalResult};

pub const DEFAULT_CONFIG_FILE: &str = "agenteval.yaml";

fn default_project() -> String {
    "default".to_string()
}

fn default_scenarios() -> PathBuf {
    PathBuf::from("scenarios/")
}

fn default_k() -> usize {
    3
}

/// Project settings read from `agenteval.yaml`. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_project")]
    pub project: String,
    /// Scenario file or directory.
    #[serde(default = "default_scenarios")]
    pub scenarios: PathBuf,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<AdapterConfig>,
    /// Directory for the JSONL history; nothing is stored when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<PathBuf>,
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            scenarios: default_scenarios(),
            k: default_k(),
            adapter: None,
            store: None,
            thresholds: Thresholds::default(),
        }
    }
}

impl ProjectConfig {
    pub fn from_yaml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Reads `path` when it exists, otherwise falls back to the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Canned responses from a YAML/JSON file.
    Scripted,
    /// Hosted chat model (OpenAI-compatible or Anthropic).
    Llm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub kind: AdapterKind,
    /// Response list for `scripted`, settings file for `llm`.
    pub path: PathBuf,
}

/// Minimum scores enforced in CI mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_pass_k: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_tool_accuracy: Option<f64>,
}

impl Thresholds {
    /// Human-readable failures for `result`; empty when every threshold holds.
    pub fn check(&self, result: &EvalResult) -> Vec<String> {
        let mut failures = Vec::new();
        if let Some(min) = self.min_pass_k {
            if result.pass_k < min {
                failures.push(format!(
                    "{}: pass^k {:.2} < {:.2}",
                    result.scenario, result.pass_k, min
                ));
            }
        }
        if let Some(min) = self.min_tool_accuracy {
            if result.tool_accuracy < min {
                failures.push(format!(
                    "{}: tool accuracy {:.2} < {:.2}",
                    result.scenario, result.tool_accuracy, min
                ));
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = ProjectConfig::from_yaml_str(
            r#"
project: support-bot
scenarios: tests/scenarios
k: 5
adapter: { kind: llm, path: settings.yaml }
store: .agenteval
thresholds: { min_pass_k: 0.8, min_tool_accuracy: 0.9 }
"#,
        )
        .unwrap();

        assert_eq!(config.project, "support-bot");
        assert_eq!(config.k, 5);
        assert_eq!(config.adapter.as_ref().unwrap().kind, AdapterKind::Llm);
        assert_eq!(config.store, Some(PathBuf::from(".agenteval")));
        assert_eq!(config.thresholds.min_pass_k, Some(0.8));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = ProjectConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert_eq!(config.k, 3);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProjectConfig::load_or_default(dir.path().join("agenteval.yaml")).unwrap();
        assert_eq!(config.project, "default");
    }

    #[test]
    fn thresholds_report_each_failure() {
        let thresholds = Thresholds {
            min_pass_k: Some(0.8),
            min_tool_accuracy: Some(0.9),
        };
        let mut result = EvalResult {
            project: "p".into(),
            scenario: "refund".into(),
            k: 3,
            runs: Vec::new(),
            pass_k: 2.0 / 3.0,
            state_correctness: 1.0,
            checkpoint_completion: 1.0,
            tool_accuracy: 0.5,
            forbidden_tool_violations: 0,
            avg_turns: 1.0,
            avg_tokens: 0,
            avg_cost: 0.0,
            avg_latency_ms: 0.0,
            constraint_violations: Vec::new(),
        };

        let failures = thresholds.check(&result);
        assert_eq!(failures, vec!["refund: pass^k 0.67 < 0.80", "refund: tool accuracy 0.50 < 0.90"]);

        result.pass_k = 1.0;
        result.tool_accuracy = 1.0;
        assert!(thresholds.check(&result).is_empty());
    }
}
