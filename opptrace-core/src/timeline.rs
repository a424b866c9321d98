//! Trace timeline
//!
//! Flattens a run into one chronological list: the trigger, every executed
//! step (decoded against the config node that produced it), logbook entries
//! sharing the run's context, and the final outcome.
//!
//! Logbook entries are matched by context id only. On equal timestamps
//! trace steps come before logbook entries, since the entries are effects
//! of the steps.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::logbook::LogbookEntry;
use crate::path::TracePath;
use crate::resolve::resolve_path;
use crate::types::{
    AutomationTraceExtended, ChildRunRef, ChooseChoice, NodeKind, ScriptExecution, StepResult,
};

/// What happened at one point of a run
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEventKind {
    TriggerFired {
        path: String,
        description: Option<String>,
    },
    Step {
        path: String,
        kind: NodeKind,
        result: Option<StepResult>,
        child: Option<ChildRunRef>,
    },
    StepError {
        path: String,
        error: String,
    },
    Logbook(LogbookEntry),
    Finished {
        outcome: Option<ScriptExecution>,
        error: Option<String>,
    },
    StillRunning {
        last_step: Option<String>,
    },
}

/// One timeline row
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEvent {
    pub at: DateTime<Utc>,
    pub kind: TimelineEventKind,
}

impl TimelineEvent {
    /// One-line description for text output.
    pub fn render(&self) -> String {
        match &self.kind {
            TimelineEventKind::TriggerFired { path, description } => match description {
                Some(description) => format!("Triggered by {} ({})", description, path),
                None => format!("Triggered ({})", path),
            },
            TimelineEventKind::Step {
                path,
                kind,
                result,
                child,
            } => {
                let mut line = match result {
                    Some(StepResult::Condition { result }) => format!(
                        "Condition {} ({})",
                        if *result { "passed" } else { "failed" },
                        path
                    ),
                    Some(StepResult::ChooseBranch { result }) => format!(
                        "Option {} ({})",
                        if *result { "matched" } else { "did not match" },
                        path
                    ),
                    Some(StepResult::Choose {
                        choice: ChooseChoice::Index(index),
                    }) => format!("Chose option {} ({})", index.saturating_add(1), path),
                    Some(StepResult::Choose {
                        choice: ChooseChoice::Default,
                    }) => format!("Chose default ({})", path),
                    Some(StepResult::CallService { params, .. }) => {
                        match service_name(params) {
                            Some(service) => format!("Called service {} ({})", service, path),
                            None => format!("Called a service ({})", path),
                        }
                    }
                    _ => format!("Executed {} ({})", kind.as_str(), path),
                };
                if let Some(child) = child {
                    line.push_str(&format!(
                        " → started {} {} run {}",
                        child.domain, child.item_id, child.run_id
                    ));
                }
                line
            }
            TimelineEventKind::StepError { path, error } => {
                format!("Error at {}: {}", path, error)
            }
            TimelineEventKind::Logbook(entry) => {
                format!("{} {}", entry.name, entry.display_message())
            }
            TimelineEventKind::Finished { outcome, error } => {
                let mut line = describe_finish(*outcome);
                if let Some(error) = error {
                    line.push_str(&format!(": {}", error));
                }
                line
            }
            TimelineEventKind::StillRunning { last_step } => match last_step {
                Some(path) => format!("Still running (at {})", path),
                None => "Still running".to_string(),
            },
        }
    }
}

/// Outcome of a stopped run, in words.
pub fn describe_finish(outcome: Option<ScriptExecution>) -> String {
    match outcome {
        Some(ScriptExecution::Finished) => "Finished",
        Some(ScriptExecution::FailedConditions) => "Stopped because a condition failed",
        Some(ScriptExecution::FailedSingle) => {
            "Stopped because only a single execution is allowed"
        }
        Some(ScriptExecution::FailedMaxRuns) => {
            "Stopped because the maximum number of parallel runs was reached"
        }
        Some(ScriptExecution::Error) => "Stopped because an error was encountered",
        Some(ScriptExecution::Aborted) => "Stopped because the run was aborted",
        Some(ScriptExecution::Cancelled) => "Stopped because the run was cancelled",
        Some(ScriptExecution::Unknown) | None => "Stopped",
    }
    .to_string()
}

/// Merge a run and its logbook entries into one chronological list.
///
/// Fails if a trace path does not resolve against the run's config.
pub fn build_timeline(
    trace: &AutomationTraceExtended,
    logbook: &[LogbookEntry],
) -> Result<Vec<TimelineEvent>> {
    // (time, is_logbook, sequence) keeps the merge stable
    let mut keyed: Vec<((DateTime<Utc>, bool, usize), TimelineEvent)> = Vec::new();
    let mut seq = 0usize;
    let mut push = |at: DateTime<Utc>, from_logbook: bool, kind: TimelineEventKind| {
        keyed.push(((at, from_logbook, seq), TimelineEvent { at, kind }));
        seq += 1;
    };

    for (raw_path, steps) in &trace.trace {
        let path = TracePath::parse(raw_path)?;
        let fragment = resolve_path(&trace.config, &path)?;
        let kind = NodeKind::classify(&path, fragment);

        for step in steps {
            if kind == NodeKind::Trigger {
                push(
                    step.timestamp,
                    false,
                    TimelineEventKind::TriggerFired {
                        path: raw_path.clone(),
                        description: trigger_description(step.changed_variables.as_ref()),
                    },
                );
            } else {
                push(
                    step.timestamp,
                    false,
                    TimelineEventKind::Step {
                        path: raw_path.clone(),
                        kind,
                        result: step.typed_result(kind),
                        child: step.child_id.clone(),
                    },
                );
            }
            if let Some(error) = &step.error {
                push(
                    step.timestamp,
                    false,
                    TimelineEventKind::StepError {
                        path: raw_path.clone(),
                        error: error.clone(),
                    },
                );
            }
        }
    }

    for entry in logbook
        .iter()
        .filter(|entry| entry.context_id.as_deref() == Some(trace.context.id.as_str()))
    {
        push(entry.when, true, TimelineEventKind::Logbook(entry.clone()));
    }

    let summary = &trace.summary;
    match summary.timestamp.finish {
        Some(finish) => push(
            finish,
            true,
            TimelineEventKind::Finished {
                outcome: summary.script_execution,
                error: summary.error.clone(),
            },
        ),
        None => {
            let last_seen = trace
                .all_steps()
                .last()
                .map(|step| step.timestamp)
                .unwrap_or(summary.timestamp.start);
            push(
                last_seen,
                true,
                TimelineEventKind::StillRunning {
                    last_step: summary.last_step.clone(),
                },
            );
        }
    }

    keyed.sort_by_key(|(key, _)| *key);
    Ok(keyed.into_iter().map(|(_, event)| event).collect())
}

fn trigger_description(variables: Option<&serde_json::Map<String, Value>>) -> Option<String> {
    variables?
        .get("trigger")?
        .get("description")?
        .as_str()
        .map(str::to_string)
}

fn service_name(params: &Value) -> Option<String> {
    let domain = params.get("domain")?.as_str()?;
    let service = params.get("service")?.as_str()?;
    Some(format!("{}.{}", domain, service))
}
