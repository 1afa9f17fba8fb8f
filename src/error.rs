use std::path::PathBuf;

use thiserror::Error;

/// Problems with a scenario definition, found while loading or validating it.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("success checkpoint '{success}' not found in checkpoints")]
    UnknownSuccessCheckpoint { success: String },

    #[error("checkpoint '{checkpoint}' depends on '{dependency}' which does not exist")]
    DanglingDependency {
        checkpoint: String,
        dependency: String,
    },

    #[error("checkpoint graph contains a cycle: visited {visited}/{total} checkpoints")]
    CyclicDependency { visited: usize, total: usize },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse scenario JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported scenario file extension: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Failures raised by an agent adapter. The runner forwards these untouched.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("missing API key: set the {0} environment variable")]
    MissingApiKey(String),

    #[error("invalid response from provider: {0}")]
    InvalidResponse(&'static str),

    #[error("invalid adapter settings: {0}")]
    Settings(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("template render error: {0}")]
    TemplateRender(#[from] handlebars::RenderError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
