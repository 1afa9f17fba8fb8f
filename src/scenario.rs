use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{error::ScenarioError, state::values_equal, types::State};

/// A scripted conversation with the milestones and end state it should produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scenario {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub initial_state: State,
    #[serde(default)]
    pub conversation_script: Vec<String>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    /// Id of the checkpoint whose arrival ends the run successfully.
    #[serde(default)]
    pub success: String,
    #[serde(default)]
    pub expected_final_state: State,
    #[serde(default)]
    pub expected_tools: ExpectedTools,
    #[serde(default)]
    pub constraints: Constraints,
}

impl Scenario {
    pub fn from_yaml_str(input: &str) -> Result<Self, ScenarioError> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn from_json_str(input: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ScenarioError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn checkpoint(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|cp| cp.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Checkpoint {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub require: Requirement,
}

impl Checkpoint {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            require: Requirement::default(),
        }
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn requires_tool(mut self, name: impl Into<String>) -> Self {
        self.require.tool_called = Some(name.into());
        self
    }

    pub fn requires_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.require
            .tool_args
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Predicate over the tool calls of a single turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Requirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_called: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Map<String, Value>>,
}

impl Requirement {
    /// `invoked` maps each tool name called this turn to the arguments of its last call.
    pub fn is_satisfied_by(&self, invoked: &HashMap<&str, &Map<String, Value>>) -> bool {
        if let Some(tool) = self.tool_called.as_deref() {
            if !invoked.contains_key(tool) {
                return false;
            }
        }

        let Some(expected_args) = &self.tool_args else {
            return true;
        };
        let empty = Map::new();
        let actual_args = self
            .tool_called
            .as_deref()
            .and_then(|tool| invoked.get(tool).copied())
            .unwrap_or(&empty);

        expected_args.iter().all(|(key, expected)| {
            actual_args
                .get(key)
                .is_some_and(|actual| values_equal(expected, actual))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExpectedTools {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forbidden: Vec<String>,
}

/// Upper bounds on the per-run averages. A missing or zero bound is not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency: Option<f64>,
}

pub fn load_scenario(path: impl AsRef<Path>) -> Result<Scenario, ScenarioError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match extension(path) {
        "yaml" | "yml" => Scenario::from_yaml_str(&content),
        "json" => Scenario::from_json_str(&content),
        _ => Err(ScenarioError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Loads every `.yaml`, `.yml` and `.json` file in `dir`, ordered by file name.
pub fn load_scenarios_from_dir(dir: impl AsRef<Path>) -> Result<Vec<Scenario>, ScenarioError> {
    let dir = dir.as_ref();
    let io_err = |source| ScenarioError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && matches!(extension(&path), "yaml" | "yml" | "json") {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(|path| load_scenario(path)).collect()
}

/// Loads a single file, or every scenario file when `path` is a directory.
pub fn load_scenarios(path: impl AsRef<Path>) -> Result<Vec<Scenario>, ScenarioError> {
    let path = path.as_ref();
    if path.is_dir() {
        load_scenarios_from_dir(path)
    } else {
        Ok(vec![load_scenario(path)?])
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|s| s.to_str()).unwrap_or("")
}
