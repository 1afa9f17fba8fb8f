//! Append-only history of runs and results, one JSON record per line.

use std::{
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::StoreError,
    types::{EvalResult, Run},
};

const RUNS_FILE: &str = "runs.jsonl";
const RESULTS_FILE: &str = "results.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    pub project: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub run: Run,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: EvalResult,
}

#[derive(Debug, Clone)]
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_run(&self, run: &Run, project: &str) -> Result<(), StoreError> {
        let record = StoredRun {
            project: project.to_string(),
            created_at: Utc::now(),
            run: run.clone(),
        };
        self.append(RUNS_FILE, &record)
    }

    /// Stores the scalar metrics only; runs are saved separately with [`save_run`](Self::save_run).
    pub fn save_result(&self, result: &EvalResult) -> Result<(), StoreError> {
        let record = StoredResult {
            created_at: Utc::now(),
            result: result.summary(),
        };
        self.append(RESULTS_FILE, &record)
    }

    pub fn load_runs(
        &self,
        project: &str,
        scenario: Option<&str>,
    ) -> Result<Vec<StoredRun>, StoreError> {
        let mut runs: Vec<StoredRun> = self.read_all(RUNS_FILE)?;
        runs.retain(|r| r.project == project && scenario.map_or(true, |s| r.run.scenario == s));
        Ok(runs)
    }

    /// Matching results, newest first.
    pub fn load_results(
        &self,
        project: &str,
        scenario: Option<&str>,
    ) -> Result<Vec<StoredResult>, StoreError> {
        let mut results: Vec<StoredResult> = self.read_all(RESULTS_FILE)?;
        results.retain(|r| {
            r.result.project == project && scenario.map_or(true, |s| r.result.scenario == s)
        });
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    fn append<T: Serialize>(&self, file: &str, record: &T) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn read_all<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, StoreError> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::State;

    fn run(id: &str, scenario: &str) -> Run {
        Run {
            run_id: id.into(),
            scenario: scenario.into(),
            turns: Vec::new(),
            final_state: State::new(),
            checkpoints_reached: vec!["a".into()],
            success: true,
            total_tokens: 10,
            total_cost: 0.5,
            total_latency_ms: 3.0,
        }
    }

    fn result(project: &str, scenario: &str, pass_k: f64) -> EvalResult {
        EvalResult {
            project: project.into(),
            scenario: scenario.into(),
            k: 1,
            runs: vec![run("x", scenario)],
            pass_k,
            state_correctness: 1.0,
            checkpoint_completion: 1.0,
            tool_accuracy: 1.0,
            forbidden_tool_violations: 0,
            avg_turns: 1.0,
            avg_tokens: 10,
            avg_cost: 0.5,
            avg_latency_ms: 3.0,
            constraint_violations: Vec::new(),
        }
    }

    #[test]
    fn runs_filter_by_project_and_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path().join("history")).unwrap();

        store.save_run(&run("r1", "refund"), "demo").unwrap();
        store.save_run(&run("r2", "greet"), "demo").unwrap();
        store.save_run(&run("r3", "refund"), "other").unwrap();

        let all = store.load_runs("demo", None).unwrap();
        assert_eq!(all.len(), 2);
        let refunds = store.load_runs("demo", Some("refund")).unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].run, run("r1", "refund"));
    }

    #[test]
    fn results_are_stored_without_runs_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();

        store.save_result(&result("demo", "refund", 0.5)).unwrap();
        store.save_result(&result("demo", "refund", 1.0)).unwrap();
        store.save_result(&result("demo", "greet", 1.0)).unwrap();

        let results = store.load_results("demo", Some("refund")).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].created_at >= results[1].created_at);
        assert!(results.iter().all(|r| r.result.runs.is_empty()));
        assert!(store.load_results("nobody", None).unwrap().is_empty());
    }

    #[test]
    fn empty_store_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        assert!(store.load_runs("demo", None).unwrap().is_empty());
    }
}
