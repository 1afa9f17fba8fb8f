use std::{
    fs,
    path::{Path, PathBuf},
};

use agenteval::{
    config::{AdapterConfig, AdapterKind, ProjectConfig, DEFAULT_CONFIG_FILE},
    load_scenarios,
    report::{html_report, json_report, run_details, table_report},
    validate_dag, AgentAdapter, EvalRunner, JsonlStore, LlmAdapter, Scenario, ScriptedAdapter,
};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agenteval", version)]
#[command(about = "Replay scenarios against a conversational agent and score pass^k")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scaffold a config file, an example scenario and scripted responses
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Check that scenarios load and their checkpoint graphs are acyclic
    Validate {
        /// Scenario file or directory (defaults to the configured one)
        scenario: Option<PathBuf>,

        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Run every scenario k times and print the scores
    Run {
        /// Scenario file or directory (defaults to the configured one)
        scenario: Option<PathBuf>,

        #[arg(long)]
        k: Option<usize>,

        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        #[arg(long)]
        project: Option<String>,

        #[arg(long, value_enum)]
        adapter: Option<AdapterArg>,

        /// Scripted responses or LLM settings file
        #[arg(long)]
        adapter_config: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "table")]
        output: OutputFormat,

        /// Exit with status 1 when a configured threshold is not met
        #[arg(long)]
        ci: bool,

        /// Print per-run checkpoint progress
        #[arg(long, short)]
        verbose: bool,
    },
    /// Show stored results, newest first
    History {
        #[arg(long)]
        project: Option<String>,

        #[arg(long)]
        scenario: Option<String>,

        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the JSON schema of the scenario format
    Schema,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AdapterArg {
    Scripted,
    Llm,
}

impl From<AdapterArg> for AdapterKind {
    fn from(arg: AdapterArg) -> Self {
        match arg {
            AdapterArg::Scripted => AdapterKind::Scripted,
            AdapterArg::Llm => AdapterKind::Llm,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Html,
}

const EXAMPLE_SCENARIO: &str = r#"name: refund_request
description: Customer asks for a refund on a recent order
initial_state:
  refund_status: none
conversation_script:
  - "I want a refund for order 123"
  - "Yes, please go ahead"
checkpoints:
  - id: lookup
    require: { tool_called: lookup_order, tool_args: { order_id: "123" } }
  - id: refund
    depends_on: [lookup]
    require: { tool_called: issue_refund }
success: refund
expected_final_state:
  refund_status: approved
expected_tools:
  required: [lookup_order, issue_refund]
  forbidden: [delete_account]
constraints:
  max_turns: 4
"#;

const EXAMPLE_RESPONSES: &str = r#"- message: "Order 123 is eligible for a refund. Shall I proceed?"
  tool_calls:
    - name: lookup_order
      arguments: { order_id: "123" }
      result: { status: delivered }
- message: "Your refund has been issued."
  tool_calls:
    - name: issue_refund
      arguments: { order_id: "123" }
  state_changes:
    refund_status: approved
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "agenteval=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Command::Init { path } => init(&path)?,
        Command::Validate { scenario, config } => {
            let config = ProjectConfig::load_or_default(&config)?;
            let path = scenario.unwrap_or(config.scenarios);
            if !validate(&load_scenarios(&path)?) {
                std::process::exit(1);
            }
        }
        Command::Run {
            scenario,
            k,
            config,
            project,
            adapter,
            adapter_config,
            output,
            ci,
            verbose,
        } => {
            let mut config = ProjectConfig::load_or_default(&config)?;
            if let Some(k) = k {
                config.k = k;
            }
            if let Some(project) = project {
                config.project = project;
            }
            let adapter_config = resolve_adapter(config.adapter.take(), adapter, adapter_config)?;

            let scenarios = load_scenarios(scenario.unwrap_or_else(|| config.scenarios.clone()))?;
            if scenarios.is_empty() {
                eprintln!("No scenarios found.");
                std::process::exit(2);
            }
            if !validate_quiet(&scenarios) {
                std::process::exit(1);
            }

            let mut adapter = build_adapter(&adapter_config)?;
            let runner = EvalRunner::new()
                .with_k(config.k)
                .with_project(config.project.clone());
            let results = runner.run_all(adapter.as_mut(), &scenarios).await?;

            match output {
                OutputFormat::Table => print!("{}", table_report(&results)),
                OutputFormat::Json => println!("{}", json_report(&results)?),
                OutputFormat::Html => println!("{}", html_report(&results)?),
            }
            if verbose {
                for (result, scenario) in results.iter().zip(&scenarios) {
                    println!("{}", result.scenario.bold());
                    print!("{}", run_details(result, scenario));
                }
            }

            if let Some(dir) = &config.store {
                let store = JsonlStore::open(dir)?;
                for result in &results {
                    for run in &result.runs {
                        store.save_run(run, &config.project)?;
                    }
                    store.save_result(result)?;
                }
                tracing::info!(dir = %store.dir().display(), "results stored");
            }

            if ci {
                let failures: Vec<String> = results
                    .iter()
                    .flat_map(|result| config.thresholds.check(result))
                    .collect();
                if !failures.is_empty() {
                    eprintln!("{}", "Thresholds not met:".red().bold());
                    for failure in &failures {
                        eprintln!("  - {failure}");
                    }
                    std::process::exit(1);
                }
                eprintln!("{}", "All thresholds met.".green());
            }
        }
        Command::History {
            project,
            scenario,
            config,
            limit,
        } => {
            let config = ProjectConfig::load_or_default(&config)?;
            let Some(dir) = config.store else {
                eprintln!("No store configured in {DEFAULT_CONFIG_FILE}.");
                std::process::exit(2);
            };
            let project = project.unwrap_or(config.project);
            let store = JsonlStore::open(dir)?;
            let results = store.load_results(&project, scenario.as_deref())?;
            if results.is_empty() {
                println!("No results for project '{project}'.");
            }
            for stored in results.iter().take(limit) {
                let r = &stored.result;
                println!(
                    "{}  {:<24} k={:<3} pass^k={:>6.1}%  state={:>6.1}%  tools={:>6.1}%",
                    stored.created_at.format("%Y-%m-%d %H:%M:%S"),
                    r.scenario,
                    r.k,
                    r.pass_k * 100.0,
                    r.state_correctness * 100.0,
                    r.tool_accuracy * 100.0,
                );
            }
        }
        Command::Schema => {
            let schema = schemars::schema_for!(Scenario);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

fn init(root: &Path) -> std::io::Result<()> {
    let config = ProjectConfig {
        adapter: Some(AdapterConfig {
            kind: AdapterKind::Scripted,
            path: PathBuf::from("responses.yaml"),
        }),
        store: Some(PathBuf::from(".agenteval")),
        ..ProjectConfig::default()
    };
    let config_yaml = config
        .to_yaml_string()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    fs::create_dir_all(root.join("scenarios"))?;
    write_new(&root.join(DEFAULT_CONFIG_FILE), &config_yaml)?;
    write_new(&root.join("scenarios/example.yaml"), EXAMPLE_SCENARIO)?;
    write_new(&root.join("responses.yaml"), EXAMPLE_RESPONSES)?;
    Ok(())
}

fn write_new(path: &Path, content: &str) -> std::io::Result<()> {
    if path.exists() {
        println!("{} {} (exists)", "skip".yellow(), path.display());
        return Ok(());
    }
    fs::write(path, content)?;
    println!("{} {}", "created".green(), path.display());
    Ok(())
}

fn validate(scenarios: &[Scenario]) -> bool {
    let mut ok = true;
    for scenario in scenarios {
        match validate_dag(scenario) {
            Ok(()) => println!("{} {}", "✓".green(), scenario.name),
            Err(err) => {
                ok = false;
                println!("{} {}: {err}", "✗".red(), scenario.name);
            }
        }
    }
    ok
}

fn validate_quiet(scenarios: &[Scenario]) -> bool {
    let mut ok = true;
    for scenario in scenarios {
        if let Err(err) = validate_dag(scenario) {
            ok = false;
            eprintln!("{} {}: {err}", "✗".red(), scenario.name);
        }
    }
    ok
}

fn resolve_adapter(
    configured: Option<AdapterConfig>,
    kind: Option<AdapterArg>,
    path: Option<PathBuf>,
) -> Result<AdapterConfig, String> {
    match (configured, kind, path) {
        (_, Some(kind), Some(path)) => Ok(AdapterConfig {
            kind: kind.into(),
            path,
        }),
        (Some(mut config), kind, path) => {
            if let Some(kind) = kind {
                config.kind = kind.into();
            }
            if let Some(path) = path {
                config.path = path;
            }
            Ok(config)
        }
        (None, _, _) => Err(format!(
            "no adapter configured: pass --adapter and --adapter-config or set `adapter` in {DEFAULT_CONFIG_FILE}"
        )),
    }
}

fn build_adapter(config: &AdapterConfig) -> Result<Box<dyn AgentAdapter>, agenteval::AdapterError> {
    Ok(match config.kind {
        AdapterKind::Scripted => Box::new(ScriptedAdapter::from_file(&config.path)?),
        AdapterKind::Llm => Box::new(LlmAdapter::from_file(&config.path)?),
    })
}
