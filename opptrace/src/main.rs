//! opptrace - automation trace inspector
//!
//! Reads trace files exported from the backend and explains them: the
//! timeline of a run, the script graph with executed nodes marked, and the
//! config fragment behind any trace path. The `logbook` subcommand fetches
//! logbook entries over the REST API configured in `config.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opptrace_core::logbook::{get_logbook_data, get_logbook_data_for_context, LogbookCache};
use opptrace_core::transport::{api_request, ApiMethod};
use opptrace_core::{
    build_timeline, AutomationTraceExtended, Config, EntityState, LogbookEntry, RestClient,
    ScriptGraph, States,
};

#[derive(Parser)]
#[command(name = "opptrace")]
#[command(about = "Inspect automation and script traces")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the timeline of a trace file
    Show {
        /// Trace JSON as returned by `trace/get`
        trace: PathBuf,

        /// Logbook JSON (array of entries) to merge into the timeline
        #[arg(short, long)]
        logbook: Option<PathBuf>,

        /// Also print the script graph
        #[arg(short, long)]
        graph: bool,

        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the config fragment a trace path points at
    Resolve {
        /// Trace JSON as returned by `trace/get`
        trace: PathBuf,

        /// Trace path, e.g. `action/0/choose/1/sequence/0`
        path: String,
    },

    /// Fetch logbook entries from the configured server
    Logbook {
        /// Start of the range (ISO 8601)
        #[arg(short, long)]
        start: String,

        /// End of the range (ISO 8601); required unless --context is given
        #[arg(short, long)]
        end: Option<String>,

        /// Only entries caused by this context id
        #[arg(short, long, conflicts_with_all = ["end", "entity"])]
        context: Option<String>,

        /// Limit to these entities (repeatable)
        #[arg(long)]
        entity: Vec<String>,

        /// Only entries about the entity itself, not ones it caused
        #[arg(long)]
        entity_matches_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        opptrace_core::logging::init(&config.logging).context("failed to initialize logging")?;

    match args.command {
        Command::Show {
            trace,
            logbook,
            graph,
            format,
        } => show(&trace, logbook.as_deref(), graph, &format),
        Command::Resolve { trace, path } => resolve_path(&trace, &path),
        Command::Logbook {
            start,
            end,
            context,
            entity,
            entity_matches_only,
        } => {
            fetch_logbook(
                &config,
                &start,
                end.as_deref(),
                context.as_deref(),
                &entity,
                entity_matches_only,
            )
            .await
        }
    }
}

fn read_trace(path: &Path) -> Result<AutomationTraceExtended> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read trace file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a trace", path.display()))
}

fn read_logbook(path: &Path) -> Result<Vec<LogbookEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read logbook file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a logbook", path.display()))
}

/// Turn config mismatches into the message meant for people.
fn explain(err: opptrace_core::Error) -> anyhow::Error {
    if err.is_config_mismatch() {
        tracing::warn!(error = %err, "Trace does not match its config");
        anyhow::anyhow!(err.user_message())
    } else {
        err.into()
    }
}

fn show(trace_path: &Path, logbook_path: Option<&Path>, graph: bool, format: &str) -> Result<()> {
    let trace = read_trace(trace_path)?;
    trace.validate().map_err(explain)?;

    let logbook = match logbook_path {
        Some(path) => read_logbook(path)?,
        None => Vec::new(),
    };
    let timeline = build_timeline(&trace, &logbook).map_err(explain)?;

    if format == "json" {
        let events: Vec<serde_json::Value> = timeline
            .iter()
            .map(|event| {
                serde_json::json!({
                    "at": event.at.to_rfc3339(),
                    "text": event.render(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    let summary = &trace.summary;
    println!(
        "{}.{} run {}",
        summary.domain, summary.item_id, summary.run_id
    );
    println!(
        "  state:   {}{}",
        summary.state.as_str(),
        summary
            .script_execution
            .map(|outcome| format!(" ({})", outcome.as_str()))
            .unwrap_or_default()
    );
    println!(
        "  started: {}",
        summary.timestamp.start.format("%Y-%m-%d %H:%M:%S%.3f")
    );
    if let Some(duration) = summary.timestamp.duration() {
        println!(
            "  took:    {:.3}s",
            duration.num_milliseconds() as f64 / 1000.0
        );
    }
    if let Some(trigger) = trace.trigger_path() {
        println!("  trigger: {}", trigger);
    }
    println!();

    for event in &timeline {
        println!("{}  {}", event.at.format("%H:%M:%S%.3f"), event.render());
    }

    if graph {
        let graph = ScriptGraph::build(&trace).map_err(explain)?;
        println!();
        print!("{}", graph.render_tree());
    }

    Ok(())
}

fn resolve_path(trace_path: &Path, path: &str) -> Result<()> {
    let trace = read_trace(trace_path)?;
    let fragment = trace.config_for(path).map_err(explain)?;
    println!("{}", serde_json::to_string_pretty(fragment)?);
    Ok(())
}

async fn fetch_logbook(
    config: &Config,
    start: &str,
    end: Option<&str>,
    context: Option<&str>,
    entities: &[String],
    entity_matches_only: bool,
) -> Result<()> {
    if !config.server.is_ready() {
        anyhow::bail!(
            "No server configured. Set [server] url and token in {}",
            Config::config_path().display()
        );
    }
    let client = RestClient::new(&config.server).context("failed to create REST client")?;

    let states: Vec<EntityState> = api_request(&client, ApiMethod::Get, "states", None)
        .await
        .context("failed to fetch states")?;
    let states: States = states
        .into_iter()
        .map(|state| (state.entity_id.clone(), state))
        .collect();

    let entries = if let Some(context_id) = context {
        get_logbook_data_for_context(&client, &states, start, context_id).await?
    } else {
        let end = end.context("--end is required unless --context is given")?;
        let shared = LogbookCache::new();
        if entities.is_empty() {
            get_logbook_data(&client, &shared, &states, start, end, None, false).await?
        } else {
            if config.logbook.cache_enabled && entities.len() > 1 && !entity_matches_only {
                // One range fetch answers every entity
                get_logbook_data(&client, &shared, &states, start, end, None, false).await?;
            }
            let mut entries = Vec::new();
            for entity in entities {
                let cache = if config.logbook.cache_enabled {
                    shared.clone()
                } else {
                    LogbookCache::new()
                };
                entries.extend(
                    get_logbook_data(
                        &client,
                        &cache,
                        &states,
                        start,
                        end,
                        Some(entity),
                        entity_matches_only,
                    )
                    .await?,
                );
            }
            entries.sort_by_key(|entry| entry.when);
            entries
        }
    };

    if entries.is_empty() {
        println!("No logbook entries found.");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{}  {} {}",
            entry.when.format("%Y-%m-%d %H:%M:%S"),
            entry.name,
            entry.display_message()
        );
    }
    Ok(())
}
