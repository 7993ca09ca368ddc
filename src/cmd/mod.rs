//! Command-line interface.
//!
//! Four subcommands cover the lifecycle a job graph goes through:
//! `inspect` runs only the planner (spec.md §3 supplement: the
//! editor's "validate graph" button), `compile` runs the planner and
//! builder and writes the generated workspace to disk without running
//! it, `run` additionally packages and executes that workspace in a
//! container (spec.md §4.7), and `poll` starts the trigger dispatcher
//! loop (spec.md §4.8) against a file-seeded in-memory store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, instrument};

use crate::builder::{self, StaticConnections};
use crate::config::Settings;
use crate::errors::{FlowsmithError, Result};
use crate::model::{DbConnection, Job, Trigger};
use crate::packager::{self, Executor};
use crate::trigger::store::{InMemoryStore, JobDispatcher, StateStore};
use crate::trigger::{ConnectionResolver, Dispatcher, InMemoryConnections};

/// Default number of triggers the dispatcher will poll concurrently
/// (spec.md §4.8 "bounded worker pool").
const DEFAULT_TRIGGER_POOL_CAPACITY: usize = 8;

#[derive(Parser, Debug)]
#[command(
    name = "flowsmith",
    version,
    about = "Compiles visual ETL job graphs into streaming Go programs and runs their triggers.",
    long_about = "Compiles visual ETL job graphs into streaming Go programs and runs their triggers.\n\n\
Resources:\n  • job.json: the node/port graph to compile (spec.md §3)\n  • connections.json: a map of connection id -> database connection\n  • triggers.json: a list of triggers the poller dispatches jobs from"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs in JSON format.
    #[arg(long = "log-json", global = true)]
    pub log_json: bool,

    /// Set log level (overrides RUST_LOG).
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plan a job graph and print its steps without generating code.
    Inspect {
        /// Path to a job.json file.
        job: PathBuf,
    },
    /// Plan and build a job graph into a Go workspace on disk.
    Compile {
        /// Path to a job.json file.
        job: PathBuf,
        /// Path to a connections.json file (connection id -> DbConnection).
        #[arg(long, short = 'c')]
        connections: PathBuf,
        /// Directory to materialize into; a temp directory is used if unset.
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },
    /// Compile, package, and run a job graph to completion.
    Run {
        /// Path to a job.json file.
        job: PathBuf,
        /// Path to a connections.json file (connection id -> DbConnection).
        #[arg(long, short = 'c')]
        connections: PathBuf,
    },
    /// Run the trigger dispatcher loop against a file-seeded store.
    Poll {
        /// Path to a triggers.json file (a JSON array of triggers).
        #[arg(long, short = 't')]
        triggers: PathBuf,
        /// Path to a connections.json file, for database triggers.
        #[arg(long, short = 'c')]
        connections: Option<PathBuf>,
    },
}

/// Parses arguments, initializes logging, and dispatches to the chosen
/// subcommand. The single entry point `main.rs` calls.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::log::init_tracing_with(cli.log_level.as_deref(), cli.log_json);

    match cli.command {
        Command::Inspect { job } => inspect(&job),
        Command::Compile {
            job,
            connections,
            out,
        } => compile(&job, &connections, out.as_deref()).map(|_| ()),
        Command::Run { job, connections } => run_job(&job, &connections).await,
        Command::Poll {
            triggers,
            connections,
        } => poll(&triggers, connections.as_deref()).await,
    }
}

fn load_job(path: &Path) -> Result<Job> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(FlowsmithError::from)
}

fn load_connections(path: &Path) -> Result<HashMap<String, DbConnection>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(FlowsmithError::from)
}

fn load_triggers(path: &Path) -> Result<Vec<Trigger>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(FlowsmithError::from)
}

/// Runs the planner alone and prints its steps (spec.md §3 supplement).
#[instrument(name = "inspect", err, skip_all)]
fn inspect(job_path: &Path) -> Result<()> {
    let job = load_job(job_path)?;
    let plan = crate::planner::plan(&job)?;

    println!("job: {} ({})", job.name, job.id);
    for step in &plan.steps {
        println!("level {}: {}", step.level, step.node_ids.join(", "));
    }
    if !plan.unreachable.is_empty() {
        println!("unreachable (excluded, not fatal): {}", plan.unreachable.join(", "));
    }
    Ok(())
}

/// Plans, builds, and materializes a job into a workspace directory,
/// returning its path (spec.md §4.5, §4.7).
#[instrument(name = "compile", err, skip_all)]
fn compile(job_path: &Path, connections_path: &Path, out: Option<&Path>) -> Result<PathBuf> {
    let job = load_job(job_path)?;
    let conns = StaticConnections(load_connections(connections_path)?);
    let build = builder::build(&job, &conns)?;

    let mut settings = Settings::from_env();
    if out.is_some() {
        settings.run_mode = crate::config::RunMode::Dev;
    }
    let workspace = packager::materialize(&build, &job.id, &settings)?;

    if let Some(out_dir) = out {
        copy_workspace(&workspace.root, out_dir)?;
        info!(job_id = %job.id, out = %out_dir.display(), "compiled workspace");
        Ok(out_dir.to_path_buf())
    } else {
        info!(job_id = %job.id, workspace = %workspace.root.display(), "compiled workspace");
        Ok(workspace.root)
    }
}

fn copy_workspace(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.map_err(FlowsmithError::from)?;
        let rel = entry.path().strip_prefix(src).expect("walked under src");
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Compiles, packages, and runs a job graph to completion (spec.md §4.7).
#[instrument(name = "run_job", err, skip_all)]
async fn run_job(job_path: &Path, connections_path: &Path) -> Result<()> {
    let job = load_job(job_path)?;
    let conns = StaticConnections(load_connections(connections_path)?);
    let build = builder::build(&job, &conns)?;

    let settings = Settings::from_env();
    let workspace = packager::materialize(&build, &job.id, &settings)?;
    let executor = Executor::new(settings);
    executor.run(&workspace, &job.id)?;

    info!(job_id = %job.id, "job run complete");
    Ok(())
}

/// Seeds an in-memory store from `triggers_path` and runs the
/// dispatcher loop forever (spec.md §4.8). Job runs are dispatched over
/// the configured message bus; this command never runs a job itself.
#[instrument(name = "poll", err, skip_all)]
async fn poll(triggers_path: &Path, connections_path: Option<&Path>) -> Result<()> {
    let settings = Settings::from_env();
    let triggers = load_triggers(triggers_path)?;
    let store = Arc::new(InMemoryStore::new());
    for trigger in triggers {
        store.seed(trigger);
    }

    let connections: Arc<dyn ConnectionResolver> = match connections_path {
        Some(path) => Arc::new(InMemoryConnections(load_connections(path)?)),
        None => Arc::new(InMemoryConnections(HashMap::new())),
    };

    let bus = crate::bus::NatsBus::connect(&settings.bus_url, settings.tenant_id.clone()).await?;
    let dispatcher: Arc<dyn JobDispatcher> = Arc::new(bus);

    info!(bus_url = %settings.bus_url, "trigger dispatcher starting");
    let dispatcher = Arc::new(Dispatcher::new(
        store as Arc<dyn StateStore>,
        dispatcher,
        connections,
        DEFAULT_TRIGGER_POOL_CAPACITY,
    ));
    dispatcher.run().await
}
