//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Dispatch one request and follow its progress
//! - chat: Line-oriented session sharing branch memory
//! - classify: Show task tag and branch
//! - route: Run model selection only
//! - models: List backend models with parsed sizes
//! - config: Show the configuration or its path

use anyhow::{Context, Result};
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::dispatcher::{DispatchOutcome, DispatchRequest, Dispatcher};
use crate::progress::RequestProgress;
use crate::router::{ModelPool, SizeBounds};
use sdk::errors::{EngineError, ErrorExt};
use sdk::types::{Branch, BranchStatus, ProgressStep};

/// Interval between progress polls
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn print_step(step: &ProgressStep) {
    match &step.details {
        Some(details) => println!("  {} {} ({})", step.icon, step.text, details),
        None => println!("  {} {}", step.icon, step.text),
    }
}

fn engine_error(e: EngineError) -> anyhow::Error {
    let hint = e.user_hint().to_string();
    anyhow::Error::new(e).context(hint)
}

/// Dispatch one request
pub async fn handle_run(
    dispatcher: Arc<Dispatcher>,
    text: String,
    model: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut request = DispatchRequest::new(text);
    if let Some(model) = model {
        request = request.with_model(model);
    }
    follow(&dispatcher, request, format).await
}

/// Spawn a request, print its progress until it finishes, cancel on Ctrl-C
async fn follow(dispatcher: &Arc<Dispatcher>, request: DispatchRequest, format: OutputFormat) -> Result<()> {
    let request_id = request.request_id.clone();
    let mut handle = Arc::clone(dispatcher).spawn(request);

    let mut since = 0;
    let mut steps: Vec<ProgressStep> = Vec::new();
    let mut poll = |steps: &mut Vec<ProgressStep>| {
        let snapshot = dispatcher.poll_progress(&request_id, since);
        since = snapshot.next_index;
        if format == OutputFormat::Text {
            snapshot.steps.iter().for_each(print_step);
        }
        steps.extend(snapshot.steps);
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    let outcome = loop {
        tokio::select! {
            joined = &mut handle => {
                poll(&mut steps);
                break joined.context("Dispatch task failed")?;
            }
            _ = &mut ctrl_c, if !cancel_requested => {
                cancel_requested = true;
                dispatcher.cancel(&request_id);
                if format == OutputFormat::Text {
                    eprintln!("Cancelling after the current step...");
                }
            }
            _ = ticker.tick() => poll(&mut steps),
        }
    };

    match outcome {
        Ok(DispatchOutcome::Completed(result)) => match format {
            OutputFormat::Text => {
                println!();
                println!("{}", result.answer);
                println!();
                println!("✓ Completed");
                println!("  Model:    {} ({})", result.model_used, result.route_reason);
                println!("  Branch:   {} [{}]", result.branch, result.task);
                println!("  Duration: {}ms", result.duration_ms);
                if result.fell_back {
                    println!("  Note:     answered by the fallback model");
                }
            }
            OutputFormat::Json => {
                let output = json!({
                    "status": "completed",
                    "result": result,
                    "steps": steps,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        },
        Ok(DispatchOutcome::Cancelled { request_id }) => match format {
            OutputFormat::Text => println!("Request {} cancelled", request_id),
            OutputFormat::Json => {
                let output = json!({
                    "status": "cancelled",
                    "request_id": request_id,
                    "steps": steps,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        },
        Err(e) => {
            if format == OutputFormat::Json {
                let output = json!({
                    "status": "failed",
                    "request_id": request_id,
                    "error": e.to_string(),
                    "retryable": e.is_recoverable(),
                    "steps": steps,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            return Err(engine_error(e));
        }
    }

    Ok(())
}

/// Local chat command
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatCommand {
    Quit,
    Reset(Option<Branch>),
    Status,
    Unknown(String),
}

fn parse_chat_command(line: &str) -> Option<ChatCommand> {
    let rest = line.trim().strip_prefix(':')?;
    let mut parts = rest.split_whitespace();
    let command = match parts.next().unwrap_or_default() {
        "quit" | "q" | "exit" => ChatCommand::Quit,
        "status" => ChatCommand::Status,
        "reset" => match parts.next() {
            None => ChatCommand::Reset(None),
            Some(branch) => match branch.parse::<Branch>() {
                Ok(branch) => ChatCommand::Reset(Some(branch)),
                Err(_) => ChatCommand::Unknown(rest.to_string()),
            },
        },
        _ => ChatCommand::Unknown(rest.to_string()),
    };
    Some(command)
}

fn print_branch_status(status: &BranchStatus) {
    println!(
        "  {:<10} {}/{} pairs, last model: {}",
        status.branch.to_string(),
        status.pairs,
        status.capacity_pairs,
        status.last_model.as_deref().unwrap_or("-")
    );
}

/// Interactive session over stdin
pub async fn handle_chat(
    dispatcher: Arc<Dispatcher>,
    model: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    if format == OutputFormat::Text {
        println!("Switchyard chat. Commands: :reset [analytical|creative], :status, :quit");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if format == OutputFormat::Text {
            print!("> ");
            std::io::stdout().flush().ok();
        }

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_chat_command(line) {
            Some(ChatCommand::Quit) => break,
            Some(ChatCommand::Reset(branch)) => {
                dispatcher.reset(branch);
                println!("History cleared");
            }
            Some(ChatCommand::Status) => {
                let statuses: Vec<BranchStatus> =
                    Branch::ALL.iter().map(|b| dispatcher.branch_status(*b)).collect();
                match format {
                    OutputFormat::Text => statuses.iter().for_each(print_branch_status),
                    OutputFormat::Json => println!("{}", serde_json::to_string(&statuses)?),
                }
            }
            Some(ChatCommand::Unknown(command)) => {
                eprintln!("Unknown command ':{}'", command);
            }
            None => {
                let mut request = DispatchRequest::new(line);
                if let Some(model) = &model {
                    request = request.with_model(model.clone());
                }
                // A failed request is reported and the session goes on
                if let Err(e) = follow(&dispatcher, request, format).await {
                    eprintln!("Error: {:#}", e);
                }
            }
        }
    }

    Ok(())
}

/// Show the task tag and branch for a text
pub fn handle_classify(dispatcher: &Dispatcher, text: &str, format: OutputFormat) -> Result<()> {
    let tag = dispatcher.classifier().classify(text);
    match format {
        OutputFormat::Text => println!("{} -> {} branch", tag, tag.branch()),
        OutputFormat::Json => {
            let output = json!({ "task": tag, "branch": tag.branch() });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Run model selection only and print the stage trace
pub async fn handle_route(
    dispatcher: &Dispatcher,
    text: &str,
    model: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let route_id = format!("route-{}", Uuid::new_v4());
    let tracker = dispatcher.progress();
    tracker.init(&route_id);
    let sink = RequestProgress::new(Arc::clone(tracker), route_id.clone());

    let available = dispatcher.available_models().await;
    let decision = dispatcher
        .router()
        .select(text, &available, model, &sink)
        .await;
    let trace = tracker.get(&route_id, 0).steps;
    tracker.remove(&route_id);
    let decision = decision.map_err(engine_error)?;

    match format {
        OutputFormat::Text => {
            trace.iter().for_each(print_step);
            println!();
            println!("{} ({})", decision.model, decision.reason);
        }
        OutputFormat::Json => {
            let output = json!({
                "model": decision.model,
                "reason": decision.reason,
                "hint": decision.hint,
                "steps": trace,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// List backend models with parsed sizes
pub async fn handle_models(dispatcher: &Dispatcher, format: OutputFormat) -> Result<()> {
    let available = dispatcher.available_models().await;
    let pool = ModelPool::new(&available);
    let cap = dispatcher.router().config().max_model_size_b;
    let fastest = pool.fastest().map(|e| e.name.clone());
    let strongest = pool.strongest(SizeBounds::capped(cap)).map(|e| e.name.clone());

    match format {
        OutputFormat::Text => {
            if pool.is_empty() {
                println!(
                    "No models available from {}. Is the backend running?",
                    dispatcher.backend().name()
                );
                return Ok(());
            }
            for entry in pool.entries() {
                let size = entry
                    .size_b
                    .map(|s| format!("{}B", s))
                    .unwrap_or_else(|| "?".to_string());
                let mut marks = Vec::new();
                if fastest.as_deref() == Some(entry.name.as_str()) {
                    marks.push("fastest");
                }
                if strongest.as_deref() == Some(entry.name.as_str()) {
                    marks.push("strongest");
                }
                println!("  {:<40} {:>7}  {}", entry.name, size, marks.join(", "));
            }
        }
        OutputFormat::Json => {
            let models: Vec<_> = pool
                .entries()
                .iter()
                .map(|e| json!({ "name": e.name, "size_b": e.size_b }))
                .collect();
            let output = json!({
                "models": models,
                "fastest": fastest,
                "strongest": strongest,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Show the configuration or its path
pub fn handle_config(
    action: ConfigAction,
    config: &Config,
    path: &Path,
    format: OutputFormat,
) -> Result<()> {
    match (action, format) {
        (ConfigAction::Path, OutputFormat::Text) => println!("{}", path.display()),
        (ConfigAction::Path, OutputFormat::Json) => {
            println!("{}", json!({ "path": path.display().to_string() }));
        }
        (ConfigAction::Show, OutputFormat::Text) => {
            let rendered =
                toml::to_string_pretty(config).context("Failed to render configuration")?;
            println!("# {}", path.display());
            println!("{}", rendered);
        }
        (ConfigAction::Show, OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}
