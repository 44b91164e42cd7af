//! `plan-engine`: run plans against the local provider and inspect stored runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use plan_engine::core::types::ExecutionState;
use plan_engine::engine::{PlanExecutionEngine, RunContext};
use plan_engine::error::{RunFailedError, validate_run_id};
use plan_engine::exit_codes;
use plan_engine::io::artifact_store::{ArtifactStore, InMemoryArtifactStore};
use plan_engine::io::config::{EngineConfig, load_config};
use plan_engine::io::execution_log::write_run_log;
use plan_engine::io::file_store::FileArtifactStore;
use plan_engine::io::plan_store::load_plan;
use plan_engine::io::provider::LocalMockAdapter;
use plan_engine::logging;

const DEFAULT_CONFIG: &str = "plan-engine.toml";

#[derive(Parser)]
#[command(
    name = "plan-engine",
    version,
    about = "Budgeted plan execution engine"
)]
struct Cli {
    /// Mirror execution log entries to stderr (ignored when RUST_LOG is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a plan with the local provider and print the final snapshot.
    Run {
        /// Plan JSON file.
        #[arg(long)]
        plan: PathBuf,
        /// Repository the plan operates on.
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Run id (generated from the current time when omitted).
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        #[arg(long, value_enum, default_value_t = StoreKind::File)]
        store: StoreKind,
    },
    /// Print the stored snapshot of a run.
    Show {
        #[arg(long)]
        run_id: String,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// List run ids with a stored snapshot.
    Runs {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Check a plan file against the schema and step rules.
    Validate {
        #[arg(long)]
        plan: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// Keep snapshots for the lifetime of the command only.
    Memory,
    /// Write snapshots under `store.base_path`.
    File,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run(command: Command) -> Result<i32> {
    match command {
        Command::Run {
            plan,
            repo,
            run_id,
            config,
            store,
        } => cmd_run(&plan, &repo, run_id, &config, store).await,
        Command::Show { run_id, config } => cmd_show(&run_id, &config).await,
        Command::Runs { config } => cmd_runs(&config).await,
        Command::Validate { plan } => cmd_validate(&plan),
    }
}

async fn cmd_run(
    plan_path: &Path,
    repo: &Path,
    run_id: Option<String>,
    config_path: &Path,
    store_kind: StoreKind,
) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let plan = load_plan(plan_path)?;
    let run_id = run_id.unwrap_or_else(generate_run_id);
    validate_run_id(&run_id)?;

    let store: Arc<dyn ArtifactStore> = match store_kind {
        StoreKind::Memory => Arc::new(InMemoryArtifactStore::new()),
        StoreKind::File => Arc::new(FileArtifactStore::new(&cfg.store.base_path)),
    };
    let provider = Arc::new(LocalMockAdapter::from_config(&cfg.mock));
    let engine = PlanExecutionEngine::from_config(&cfg, provider, store)?;

    let ctx = RunContext::new(run_id.clone(), repo);
    let cancel = ctx.cancel_handle().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next iteration boundary");
            cancel.cancel();
        }
    });

    info!(run_id = %run_id, plan_id = %plan.id, "executing plan");
    let result = engine.execute_in(&plan, &ctx).await;
    if store_kind == StoreKind::File {
        // Log write failures never change the printed state or exit code.
        if let Err(err) = write_run_log(&cfg.store.base_path, &run_id, &ctx.logger().get_logs()) {
            warn!(run_id = %run_id, "could not write run log: {err:#}");
        }
    }

    match result {
        Ok(state) => {
            print_json(&state)?;
            Ok(exit_codes::for_status(state.status))
        }
        Err(err) => match err.downcast::<RunFailedError>() {
            Ok(failed) => {
                eprintln!("{}", failed);
                print_json(&failed.state)?;
                Ok(exit_codes::FAILED)
            }
            Err(err) => Err(err),
        },
    }
}

async fn cmd_show(run_id: &str, config_path: &Path) -> Result<i32> {
    let store = file_store(config_path)?;
    let state: ExecutionState = store
        .load_snapshot(run_id)
        .await?
        .ok_or_else(|| anyhow!("no snapshot for run '{run_id}'"))?;
    print_json(&state)?;
    Ok(exit_codes::OK)
}

async fn cmd_runs(config_path: &Path) -> Result<i32> {
    let store = file_store(config_path)?;
    for run_id in store.list_runs().await? {
        println!("{run_id}");
    }
    Ok(exit_codes::OK)
}

fn cmd_validate(plan_path: &Path) -> Result<i32> {
    let plan = load_plan(plan_path)?;
    println!("plan '{}' ok ({} steps)", plan.id, plan.steps.len());
    Ok(exit_codes::OK)
}

fn file_store(config_path: &Path) -> Result<FileArtifactStore> {
    let cfg: EngineConfig = load_config(config_path)?;
    Ok(FileArtifactStore::new(cfg.store.base_path))
}

fn generate_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%3f"))
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
