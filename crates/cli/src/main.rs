//! `flowline` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the HTTP boundary (execute + webhook endpoints).
//! - `run`      — run a workflow file in production mode until Ctrl-C.
//! - `execute`  — run a workflow file once in API mode and print the output.
//! - `validate` — build and validate a workflow file without running it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use engine::{FlowEngine, WorkflowDefinition};
use nodes::DataMap;
use storage::DataStore;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "flowline",
    about = "Workflow execution engine for node-graph automations",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server.
    Serve {
        #[arg(long, env = "FLOWLINE_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// Run a workflow in production mode (loops until Ctrl-C).
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// Workflow id used for events and the state snapshot.
        #[arg(long)]
        workflow_id: Option<String>,
    },
    /// Execute a workflow once in API mode.
    Execute {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// JSON object passed as the request input.
        #[arg(long, default_value = "{}")]
        input: String,
        /// Overall timeout in seconds.
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
}

fn load_definition(path: &PathBuf) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).context("invalid workflow JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { bind } => {
            info!("starting server on {bind}");
            api::serve(&bind, DataStore::shared()).await?;
        }

        Command::Run { path, workflow_id } => {
            let definition = load_definition(&path)?;
            let workflow_id = workflow_id.or_else(|| {
                path.file_stem().map(|stem| stem.to_string_lossy().into_owned())
            });

            let mut flow_engine = FlowEngine::new(workflow_id);
            flow_engine.load_workflow(definition, None)?;

            info!("running production mode, Ctrl-C to stop");
            tokio::select! {
                result = flow_engine.run_production() => result?,
                _ = tokio::signal::ctrl_c() => {
                    warn!("interrupt received, forcing shutdown");
                    flow_engine.force_shutdown().await;
                }
            }
        }

        Command::Execute { path, input, timeout } => {
            let definition = load_definition(&path)?;
            let input: DataMap = serde_json::from_str(&input)
                .context("--input must be a JSON object")?;

            let mut flow_engine = FlowEngine::new(None);
            flow_engine.load_workflow(definition, None)?;

            let output = flow_engine
                .run_api(input, Some(std::time::Duration::from_secs(timeout)), None)
                .await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Validate { path } => {
            let definition = load_definition(&path)?;
            let mut flow_engine = FlowEngine::new(None);
            match flow_engine.load_workflow(definition, None) {
                Ok(()) => println!("workflow is valid"),
                Err(e) => {
                    eprintln!("validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
    Ok(())
}
