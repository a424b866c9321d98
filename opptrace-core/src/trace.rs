//! Trace loading and access
//!
//! Runs are fetched over the socket: `trace/list` for the run picker and
//! `trace/get` for one full [`AutomationTraceExtended`]. Both are single
//! round trips with no caching.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::path::is_trigger_path;
use crate::resolve::resolve;
use crate::transport::{ws_command, SocketTransport};
use crate::types::{
    AutomationTrace, AutomationTraceExtended, TraceContextEntry, TraceDomain, TraceStep,
};

/// First trigger path in execution order.
///
/// Map order is insertion order, so this is the trigger that fired, not the
/// lexicographically smallest one.
pub fn get_trigger_path_from_trace(trace: &IndexMap<String, Vec<TraceStep>>) -> Option<&str> {
    trace
        .keys()
        .find(|path| is_trigger_path(path))
        .map(String::as_str)
}

/// Fetch one run (`trace/get`).
pub async fn load_trace(
    transport: &dyn SocketTransport,
    domain: TraceDomain,
    item_id: &str,
    run_id: &str,
) -> Result<AutomationTraceExtended> {
    tracing::debug!(%domain, item_id, run_id, "Loading trace");
    ws_command(
        transport,
        json!({
            "type": "trace/get",
            "domain": domain.as_str(),
            "item_id": item_id,
            "run_id": run_id,
        }),
    )
    .await
}

/// Fetch the run summaries of one item (`trace/list`), oldest first.
pub async fn load_traces(
    transport: &dyn SocketTransport,
    domain: TraceDomain,
    item_id: &str,
) -> Result<Vec<AutomationTrace>> {
    tracing::debug!(%domain, item_id, "Loading trace list");
    ws_command(
        transport,
        json!({
            "type": "trace/list",
            "domain": domain.as_str(),
            "item_id": item_id,
        }),
    )
    .await
}

/// Fetch context id → run mapping (`trace/contexts`).
pub async fn load_trace_contexts(
    transport: &dyn SocketTransport,
    domain: Option<TraceDomain>,
    item_id: Option<&str>,
) -> Result<HashMap<String, TraceContextEntry>> {
    let mut msg = json!({ "type": "trace/contexts" });
    if let Some(domain) = domain {
        msg["domain"] = Value::from(domain.as_str());
    }
    if let Some(item_id) = item_id {
        msg["item_id"] = Value::from(item_id);
    }
    ws_command(transport, msg).await
}

impl AutomationTraceExtended {
    pub fn run_id(&self) -> &str {
        &self.summary.run_id
    }

    pub fn is_running(&self) -> bool {
        self.summary.state.is_running()
    }

    pub fn trigger_path(&self) -> Option<&str> {
        get_trigger_path_from_trace(&self.trace)
    }

    /// Steps recorded for `path`, empty if the node never ran.
    pub fn steps_for(&self, path: &str) -> &[TraceStep] {
        self.trace.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every step in chronological order.
    ///
    /// Ties keep path insertion order, then per-path order.
    pub fn all_steps(&self) -> Vec<&TraceStep> {
        let mut steps: Vec<&TraceStep> = self.trace.values().flatten().collect();
        steps.sort_by_key(|step| step.timestamp);
        steps
    }

    /// Path of the most recent step; falls back to the summary's `last_step`.
    pub fn last_step_path(&self) -> Option<&str> {
        self.all_steps()
            .last()
            .map(|step| step.path.as_str())
            .or(self.summary.last_step.as_deref())
    }

    /// First step that ended with an error, in chronological order.
    pub fn first_error(&self) -> Option<&TraceStep> {
        self.all_steps().into_iter().find(|step| step.is_error())
    }

    /// Config fragment that produced the steps at `path`.
    pub fn config_for(&self, path: &str) -> Result<&Value> {
        resolve(&self.config, path)
    }

    /// Resolve every trace key against the run's config.
    ///
    /// Fails on the first key that does not resolve.
    pub fn resolve_all(&self) -> Result<()> {
        for path in self.trace.keys() {
            resolve(&self.config, path)?;
        }
        Ok(())
    }

    /// Check the invariants a well-formed trace satisfies.
    pub fn validate(&self) -> Result<()> {
        let run_id = self.run_id();
        let integrity = |message: String| Error::Integrity {
            run_id: run_id.to_string(),
            message,
        };

        match (self.is_running(), self.summary.timestamp.finish) {
            (true, Some(_)) => return Err(integrity("running trace has a finish time".into())),
            (false, None) => return Err(integrity("stopped trace has no finish time".into())),
            _ => {}
        }

        for (path, steps) in &self.trace {
            for step in steps {
                if &step.path != path {
                    return Err(integrity(format!(
                        "step for {:?} is filed under {:?}",
                        step.path, path
                    )));
                }
            }
            if steps.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
                return Err(integrity(format!(
                    "steps for {:?} are out of order",
                    path
                )));
            }
        }

        self.resolve_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_trace() -> AutomationTraceExtended {
        serde_json::from_value(json!({
            "domain": "automation",
            "item_id": "1615419646544",
            "run_id": "r1",
            "state": "stopped",
            "script_execution": "finished",
            "timestamp": {
                "start": "2021-03-25T04:36:51.223693+00:00",
                "finish": "2021-03-25T04:36:53.223693+00:00"
            },
            "last_step": "action/0",
            "context": {"id": "ctx1"},
            "config": {
                "trigger": [{"platform": "state", "entity_id": "input_boolean.toggle_1"}],
                "action": [{"service": "input_boolean.toggle"}]
            },
            "trace": {
                "trigger": [{"path": "trigger", "timestamp": "2021-03-25T04:36:51.223693+00:00"}],
                "action/0": [{"path": "action/0", "timestamp": "2021-03-25T04:36:52.223693+00:00"}]
            }
        }))
        .unwrap()
    }

    fn step(path: &str, ts: &str) -> TraceStep {
        serde_json::from_value(json!({"path": path, "timestamp": ts})).unwrap()
    }

    #[test]
    fn test_trigger_path_from_bare_trigger_key() {
        let trace = sample_trace();
        assert_eq!(get_trigger_path_from_trace(&trace.trace), Some("trigger"));
        assert_eq!(trace.trigger_path(), Some("trigger"));
        assert!(trace.validate().is_ok());
    }

    #[test]
    fn test_trigger_path_uses_insertion_order() {
        let mut map = IndexMap::new();
        map.insert(
            "action/0".to_string(),
            vec![step("action/0", "2021-01-01T00:00:00Z")],
        );
        assert_eq!(get_trigger_path_from_trace(&map), None);

        map.insert(
            "trigger/1".to_string(),
            vec![step("trigger/1", "2021-01-01T00:00:00Z")],
        );
        map.insert(
            "trigger/0".to_string(),
            vec![step("trigger/0", "2021-01-01T00:00:00Z")],
        );
        assert_eq!(get_trigger_path_from_trace(&map), Some("trigger/1"));
    }

    #[test]
    fn test_triggers_lookalike_is_not_trigger() {
        let mut map = IndexMap::new();
        map.insert(
            "triggers".to_string(),
            vec![step("triggers", "2021-01-01T00:00:00Z")],
        );
        assert_eq!(get_trigger_path_from_trace(&map), None);
    }

    #[test]
    fn test_validate_rejects_unresolvable_path() {
        let mut trace = sample_trace();
        trace.trace.insert(
            "action/4".to_string(),
            vec![step("action/4", "2021-03-25T04:36:52.5Z")],
        );
        let err = trace.validate().unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
        assert!(err.is_config_mismatch());
    }

    #[test]
    fn test_validate_finish_invariant() {
        let mut trace = sample_trace();
        trace.summary.timestamp.finish = None;
        assert!(matches!(trace.validate(), Err(Error::Integrity { .. })));

        let mut trace = sample_trace();
        trace.summary.state = crate::types::RunState::Running;
        assert!(matches!(trace.validate(), Err(Error::Integrity { .. })));
    }

    #[test]
    fn test_validate_step_order() {
        let mut trace = sample_trace();
        trace.trace.insert(
            "action/0".to_string(),
            vec![
                step("action/0", "2021-03-25T04:36:52Z"),
                step("action/0", "2021-03-25T04:36:51Z"),
            ],
        );
        assert!(matches!(trace.validate(), Err(Error::Integrity { .. })));
    }

    #[test]
    fn test_all_steps_chronological() {
        let trace = sample_trace();
        let paths: Vec<&str> = trace.all_steps().iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["trigger", "action/0"]);
        assert_eq!(trace.steps_for("condition/0").len(), 0);
        assert!(trace.first_error().is_none());
    }

    #[test]
    fn test_config_for() {
        let trace = sample_trace();
        assert_eq!(
            trace.config_for("action/0/service").unwrap(),
            &json!("input_boolean.toggle")
        );
        // `trigger` resolves to the whole trigger list
        assert!(trace.config_for("trigger").unwrap().is_array());
    }
}
