use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use waypoint_rs::waypoint::config::{CheckpointBackend, Config};
use waypoint_rs::waypoint::runner::{RunResponse, Runner};
use waypoint_rs::waypoint::server;
use waypoint_rs::waypoint::steps::register_builtin;
use waypoint_rs::waypoint::workflow::builder::Builder;
use waypoint_rs::waypoint::workflow::graph::StepGraph;
use waypoint_rs::waypoint::workflow::registry::{GraphRegistry, StepRegistry};
use waypoint_rs::waypoint::workflow::types::WorkflowDefinition;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to ./waypoint.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow interactively, prompting for answers when it pauses
    Run {
        /// Path to the workflow file
        #[arg(short, long)]
        file: PathBuf,

        /// Initial state as a JSON object
        #[arg(short, long)]
        state: Option<String>,

        #[arg(long)]
        run_id: Option<String>,

        /// Keep run records in the file store so `resume` can pick them up
        #[arg(long)]
        persist: bool,
    },
    /// Answer a paused run kept in the file store
    Resume {
        /// Path to the workflow file
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long)]
        run_id: String,

        #[arg(short, long)]
        answer: String,
    },
    /// Serve every workflow in the workflows directory over HTTP
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// Directory of workflow files
        #[arg(short, long)]
        workflows: Option<PathBuf>,
    },
    /// Check that a workflow file builds
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Print the JSON schema of workflow files
    Schema,
}

async fn builder() -> Builder {
    let kinds = StepRegistry::new();
    register_builtin(&kinds).await;
    Builder::new(kinds)
}

async fn runner_for(graph: StepGraph, config: Config) -> anyhow::Result<Runner> {
    let graphs = GraphRegistry::new();
    graphs.register(Arc::new(graph)).await;
    let checkpointer = config.checkpointer()?;
    Ok(Runner::new(graphs, checkpointer, Arc::new(config)))
}

fn print_value(value: &Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => println!("{}", s),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

fn print_completed(run_id: &str, state: &Value) -> anyhow::Result<()> {
    println!("Run {} completed. Final state:", run_id);
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Commands::Run {
            file,
            state,
            run_id,
            persist,
        } => {
            let input: Value = match state {
                Some(raw) => serde_json::from_str(&raw).context("--state must be JSON")?,
                None => json!({}),
            };
            if persist {
                config.checkpoint.backend = CheckpointBackend::File;
            }

            let graph = builder().await.build_graph(&file).await?;
            let name = graph.name().to_string();
            println!("Running workflow: {}", name);
            let runner = runner_for(graph, config).await?;

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut response = runner.start(&name, input, run_id).await?;

            loop {
                match response {
                    RunResponse::Completed { run_id, state } => {
                        print_completed(&run_id, &state)?;
                        break;
                    }
                    RunResponse::Paused {
                        run_id,
                        step,
                        payload,
                    } => {
                        println!("---{}---", step);
                        print_value(&payload)?;
                        print!("> ");
                        std::io::Write::flush(&mut std::io::stdout())?;

                        match lines.next_line().await? {
                            Some(answer) => {
                                response = runner.resume(&run_id, json!(answer.trim())).await?;
                            }
                            None => {
                                println!();
                                println!("Run {} left paused at step '{}'", run_id, step);
                                break;
                            }
                        }
                    }
                }
            }
        }
        Commands::Resume {
            file,
            run_id,
            answer,
        } => {
            config.checkpoint.backend = CheckpointBackend::File;
            let graph = builder().await.build_graph(&file).await?;
            let runner = runner_for(graph, config).await?;

            match runner.resume(&run_id, json!(answer)).await? {
                RunResponse::Completed { run_id, state } => print_completed(&run_id, &state)?,
                RunResponse::Paused {
                    run_id,
                    step,
                    payload,
                } => {
                    println!("Run {} paused at step '{}':", run_id, step);
                    print_value(&payload)?;
                }
            }
        }
        Commands::Serve {
            host,
            port,
            workflows,
        } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let dir = workflows.unwrap_or_else(|| config.workflows_dir.clone());

            let graphs = GraphRegistry::new();
            builder()
                .await
                .load_dir(&dir, &graphs)
                .await
                .with_context(|| format!("Failed to read workflows from {}", dir.display()))?;
            if graphs.is_empty().await {
                log::warn!("No workflows found in {}", dir.display());
            }

            let checkpointer = config.checkpointer()?;
            let runner = Arc::new(Runner::new(graphs, checkpointer, Arc::new(config)));
            if let Err(e) = server::serve(runner, &host, port).await {
                bail!("Server error: {}", e);
            }
        }
        Commands::Validate { file } => {
            let graph = builder().await.build_graph(&file).await?;
            println!(
                "Workflow '{}' is valid: {} steps, starting at '{}'",
                graph.name(),
                graph.steps().len(),
                graph.start()
            );
        }
        Commands::Schema => {
            let schema = schemars::schema_for!(WorkflowDefinition);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}
