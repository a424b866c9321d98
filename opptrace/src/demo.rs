//! opptrace-demo - walk the trace viewer flow against the mock backend
//!
//! Loads the demo automation's runs, shows the selected one with its logbook
//! entries, then purges that run from the backend and refreshes to show how
//! a vanished selection is reported.

use anyhow::{Context, Result};
use clap::Parser;
use opptrace_core::logbook::get_logbook_data_for_context;
use opptrace_core::mock::demo::{self, DEMO_ITEM_ID};
use opptrace_core::{build_timeline, Config, RunPicker, ScriptGraph, TraceDomain};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "opptrace-demo")]
#[command(about = "Run the trace viewer flow against built-in demo data")]
#[command(version)]
struct Args {
    /// Run to open instead of the newest one
    #[arg(short, long)]
    run: Option<String>,

    /// Also print the script graph
    #[arg(short, long)]
    graph: bool,

    /// Skip the purge-and-refresh step
    #[arg(long)]
    no_purge: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        opptrace_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let backend = demo::demo_backend().context("failed to set up demo backend")?;

    let mut picker = RunPicker::new(TraceDomain::Automation, DEMO_ITEM_ID);
    if let Some(run_id) = &args.run {
        picker = picker.with_selection(run_id.clone());
    }
    if let Some(notice) = picker.refresh(&backend).await? {
        println!("! {}", notice.message());
    }

    println!("Runs of automation.{} (newest first):", DEMO_ITEM_ID);
    for run in picker.runs() {
        let marker = if picker.selected() == Some(run.run_id.as_str()) {
            '>'
        } else {
            ' '
        };
        println!(
            "{} {}  {}  {}",
            marker,
            run.run_id,
            run.timestamp.start.format("%Y-%m-%d %H:%M:%S"),
            run.script_execution
                .map(|outcome| outcome.as_str())
                .unwrap_or("running")
        );
    }
    println!();

    let Some(trace) = picker.load_selected(&backend).await? else {
        println!("No run selected.");
        return Ok(());
    };

    let start = trace.summary.timestamp.start.to_rfc3339();
    let logbook =
        get_logbook_data_for_context(&backend, &backend.states(), &start, &trace.context.id)
            .await?;
    let timeline = build_timeline(&trace, &logbook).map_err(|e| anyhow::anyhow!(e.user_message()))?;
    for event in &timeline {
        println!("{}  {}", event.at.format("%H:%M:%S%.3f"), event.render());
    }

    if args.graph {
        let graph = ScriptGraph::build(&trace).map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!();
        print!("{}", graph.render_tree());
    }

    if args.no_purge {
        return Ok(());
    }

    // Retention drops the selected run from the backend
    let purged = trace.run_id().to_string();
    let remaining: Vec<Value> = picker
        .runs()
        .iter()
        .rev()
        .filter(|run| run.run_id != purged)
        .map(serde_json::to_value)
        .collect::<std::result::Result<_, _>>()?;
    backend.mock_ws("trace/list", move |_, _| Ok(Value::Array(remaining.clone())));

    println!();
    match picker.refresh(&backend).await? {
        Some(notice) => println!("! {}", notice.message()),
        None => println!("Selection still available."),
    }
    println!(
        "Selected after refresh: {}",
        picker.selected().unwrap_or("nothing")
    );

    Ok(())
}
