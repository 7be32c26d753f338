//! agentlink CLI
//!
//! ## Commands
//!
//! - `check`: load and link a project, report workers, tools and shadowing
//! - `run`: execute a worker with a scripted model, prompting on stdin for
//!   approvals

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{info, Level};
use uuid::Uuid;

use agentlink_core::approval::ApprovalRequestedEvent;
use agentlink_core::{
    base_dir_of, ApprovalBroker, ApprovalDecision, ApprovalMode, CancelHandle, EventSink,
    ProjectConfig, Runtime, RuntimeContext, RuntimeEvent, ScriptedModel, SymbolTable,
    ToolsetCatalog, TracingSink,
};

#[derive(Parser)]
#[command(name = "agentlink")]
#[command(version = agentlink_core::VERSION)]
#[command(about = "Link and run trees of LLM-driven workers", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines on stderr
    #[arg(long, global = true, env = "AGENTLINK_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and link a project without running anything
    Check {
        /// Project file (.toml or .json)
        project: PathBuf,

        /// Print the link report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a worker
    Run {
        /// Project file (.toml or .json)
        project: PathBuf,

        /// Entry worker
        worker: String,

        /// Input passed to the entry worker; parsed as JSON when possible
        #[arg(short, long, default_value = "")]
        input: String,

        /// Model script: {"worker": [turn, ...]}
        #[arg(short, long)]
        script: PathBuf,

        /// Approve every call that would prompt
        #[arg(long, conflicts_with = "reject_all")]
        approve_all: bool,

        /// Deny every call that would prompt
        #[arg(long)]
        reject_all: bool,

        /// Override runtime.max_depth
        #[arg(long)]
        max_depth: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    agentlink_core::telemetry::init_tracing(cli.json_logs, level);

    match cli.command {
        Commands::Check { project, json } => cmd_check(&project, json),
        Commands::Run {
            project,
            worker,
            input,
            script,
            approve_all,
            reject_all,
            max_depth,
        } => {
            let mode = approval_mode(approve_all, reject_all);
            cmd_run(&project, &worker, &input, &script, mode, max_depth).await
        }
    }
}

fn approval_mode(approve_all: bool, reject_all: bool) -> Option<ApprovalMode> {
    match (approve_all, reject_all) {
        (true, _) => Some(ApprovalMode::ApproveAll),
        (_, true) => Some(ApprovalMode::RejectAll),
        _ => None,
    }
}

fn load_project(path: &Path) -> Result<(ProjectConfig, SymbolTable)> {
    let config = ProjectConfig::load(path)
        .with_context(|| format!("failed to load project {}", path.display()))?;
    let table = config
        .link(&base_dir_of(path), &ToolsetCatalog::standard())
        .with_context(|| format!("failed to link project {}", path.display()))?;
    Ok((config, table))
}

fn cmd_check(path: &Path, json: bool) -> Result<()> {
    let (_, table) = load_project(path)?;
    let report = table.describe();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Linked {}", path.display());
    for name in table.worker_names() {
        let Some(worker) = table.worker(&name) else {
            continue;
        };
        println!("  worker {name}");
        println!("    tools: {}", worker.tool_names().join(", "));
        for s in worker.shadowed_tools() {
            println!("    shadowed: {} from {} (using {})", s.tool, s.shadowed, s.winner);
        }
    }
    Ok(())
}

/// Logs every event and forwards approval requests to the prompt loop.
struct CliSink {
    tracing: TracingSink,
    prompts: mpsc::UnboundedSender<ApprovalRequestedEvent>,
}

impl EventSink for CliSink {
    fn emit(&self, event: &RuntimeEvent) {
        self.tracing.emit(event);
        if let RuntimeEvent::ApprovalRequested(request) = event {
            let _ = self.prompts.send(request.clone());
        }
    }
}

/// `y` approves once, `s` approves for the session, anything else denies.
fn parse_answer(answer: &str, approval_id: Uuid) -> ApprovalDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ApprovalDecision::approve(approval_id),
        "s" | "session" => ApprovalDecision::approve_for_session(approval_id),
        _ => ApprovalDecision::deny(approval_id, Some("denied at the prompt".into())),
    }
}

fn parse_input(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn prompt_loop(
    mut requests: mpsc::UnboundedReceiver<ApprovalRequestedEvent>,
    broker: Arc<ApprovalBroker>,
) {
    while let Some(request) = requests.recv().await {
        eprintln!();
        eprintln!("Approval needed: {}", request.description);
        eprintln!(
            "  args: {}",
            serde_json::to_string(&request.redacted_args).unwrap_or_default()
        );
        eprint!("  approve? [y]es / [s]ession / [N]o: ");
        let _ = std::io::stderr().flush();

        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;
        let answer = match answer {
            Ok(Ok(line)) => line,
            _ => String::new(),
        };
        broker.respond(parse_answer(&answer, request.approval_id));
    }
}

async fn cmd_run(
    path: &Path,
    worker: &str,
    input: &str,
    script: &Path,
    mode: Option<ApprovalMode>,
    max_depth: Option<usize>,
) -> Result<()> {
    let (config, table) = load_project(path)?;

    let mut settings = config.runtime.clone();
    if let Some(mode) = mode {
        settings = settings.with_approval_mode(mode);
    }
    if let Some(depth) = max_depth {
        settings = settings.with_max_depth(depth);
    }

    let script_text = std::fs::read_to_string(script)
        .with_context(|| format!("failed to read model script {}", script.display()))?;
    let script_json: Value = serde_json::from_str(&script_text)
        .with_context(|| format!("model script {} is not JSON", script.display()))?;
    let model = ScriptedModel::from_json(&script_json)?;

    let (prompt_tx, prompt_rx) = mpsc::unbounded_channel();
    let sink: Arc<dyn EventSink> = Arc::new(CliSink {
        tracing: TracingSink,
        prompts: prompt_tx,
    });
    let (cancel, signal) = CancelHandle::new();
    let ctx = RuntimeContext::new(settings, Arc::new(model))
        .with_sink(sink)
        .with_cancel(signal);

    tokio::spawn(prompt_loop(prompt_rx, ctx.broker().clone()));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    info!(worker = %worker, project = %path.display(), "starting run");
    let runtime = Runtime::new(Arc::new(table), ctx);
    let outcome = runtime
        .run(worker, parse_input(input))
        .await
        .with_context(|| format!("run of worker '{worker}' failed"))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "worker": outcome.worker,
            "call_id": outcome.call_id,
            "output": outcome.output,
            "iterations": outcome.iterations,
            "tool_calls": outcome.tool_calls,
        }))?
    );
    Ok(())
}
