//! Core domain types for opptrace
//!
//! These types mirror the JSON the backend sends for automation and script
//! traces, plus the entity states the logbook phrases are derived from.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Item** | An automation or script, identified by `domain` + `item_id` |
//! | **Run** | One execution of an item, identified by `run_id` |
//! | **Trace** | The recorded execution of a run: path → steps |
//! | **Path** | `/`-delimited address of a config node (see [`crate::path`]) |
//! | **Step** | One execution of one config node; loops produce several per path |
//! | **Context** | Correlation id shared by a run and the logbook entries it caused |

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::path::{Segment, TracePath};

// ============================================
// Items and runs
// ============================================

/// Which kind of item a trace belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceDomain {
    Automation,
    Script,
}

impl TraceDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceDomain::Automation => "automation",
            TraceDomain::Script => "script",
        }
    }

    /// Top-level key holding the action list for this domain
    pub fn action_key(&self) -> &'static str {
        match self {
            TraceDomain::Automation => crate::path::ACTION,
            TraceDomain::Script => crate::path::SEQUENCE,
        }
    }
}

impl std::fmt::Display for TraceDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TraceDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automation" => Ok(TraceDomain::Automation),
            "script" => Ok(TraceDomain::Script),
            _ => Err(format!("unknown trace domain: {}", s)),
        }
    }
}

/// Lifecycle state of a run (not of its steps)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Stopped,
    Debugged,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Stopped => "stopped",
            RunState::Debugged => "debugged",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }
}

/// How a finished run ended
///
/// Only meaningful once the run is no longer [`RunState::Running`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptExecution {
    FailedConditions,
    FailedSingle,
    FailedMaxRuns,
    Finished,
    Aborted,
    Error,
    Cancelled,
    /// Outcome string this version does not know about
    #[serde(other)]
    Unknown,
}

impl ScriptExecution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptExecution::FailedConditions => "failed_conditions",
            ScriptExecution::FailedSingle => "failed_single",
            ScriptExecution::FailedMaxRuns => "failed_max_runs",
            ScriptExecution::Finished => "finished",
            ScriptExecution::Aborted => "aborted",
            ScriptExecution::Error => "error",
            ScriptExecution::Cancelled => "cancelled",
            ScriptExecution::Unknown => "unknown",
        }
    }

    /// True for outcomes where every reached step ran to completion.
    pub fn is_success(&self) -> bool {
        matches!(self, ScriptExecution::Finished)
    }
}

/// Start and (once stopped) finish time of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceTimestamp {
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<DateTime<Utc>>,
}

impl TraceTimestamp {
    /// Run duration, `None` while running
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finish.map(|finish| finish - self.start)
    }
}

/// Correlation identifier of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Entry of the `trace/contexts` response, keyed by context id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContextEntry {
    pub run_id: String,
    pub domain: TraceDomain,
    pub item_id: String,
}

/// Run summary as returned by `trace/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationTrace {
    pub domain: TraceDomain,
    pub item_id: String,
    pub run_id: String,
    pub state: RunState,
    #[serde(default)]
    pub script_execution: Option<ScriptExecution>,
    pub timestamp: TraceTimestamp,
    /// Path active when the run stopped or was last observed
    #[serde(default)]
    pub last_step: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Human-readable trigger description (automations only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

/// Full run record as returned by `trace/get`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationTraceExtended {
    #[serde(flatten)]
    pub summary: AutomationTrace,
    /// Path → steps, in execution order
    pub trace: IndexMap<String, Vec<TraceStep>>,
    pub context: TraceContext,
    /// Config in effect for this run
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint_inputs: Option<Value>,
}

// ============================================
// Steps
// ============================================

/// Reference to a run started by a step (e.g. a script called as a service)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRunRef {
    pub domain: TraceDomain,
    pub item_id: String,
    pub run_id: String,
}

/// One execution of one config node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub path: String,
    pub timestamp: DateTime<Utc>,
    /// Set exactly when the step terminated abnormally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_variables: Option<Map<String, Value>>,
    /// Raw result; its shape depends on the config node kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_id: Option<ChildRunRef>,
}

impl TraceStep {
    /// Decode `result` for a node of the given kind.
    ///
    /// Steps don't say what they are; the caller classifies the owning
    /// config node with [`NodeKind::classify`] first.
    pub fn typed_result(&self, kind: NodeKind) -> Option<StepResult> {
        let raw = self.result.as_ref()?;
        Some(match kind {
            NodeKind::Condition => match raw.get("result").and_then(Value::as_bool) {
                Some(result) => StepResult::Condition { result },
                None => StepResult::Other(raw.clone()),
            },
            NodeKind::ChooseOption => match raw.get("result").and_then(Value::as_bool) {
                Some(result) => StepResult::ChooseBranch { result },
                None => StepResult::Other(raw.clone()),
            },
            NodeKind::Choose => match raw.get("choice") {
                Some(Value::Number(n)) => {
                    match n.as_u64().and_then(|index| usize::try_from(index).ok()) {
                        Some(index) => StepResult::Choose {
                            choice: ChooseChoice::Index(index),
                        },
                        None => StepResult::Other(raw.clone()),
                    }
                }
                Some(Value::String(s)) if s == "default" => StepResult::Choose {
                    choice: ChooseChoice::Default,
                },
                _ => StepResult::Other(raw.clone()),
            },
            NodeKind::CallService => StepResult::CallService {
                params: raw.get("params").cloned().unwrap_or(Value::Null),
                running_script: raw
                    .get("running_script")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                limit: raw.get("limit").and_then(Value::as_f64),
            },
            _ => StepResult::Other(raw.clone()),
        })
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Which branch a `choose` step took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChooseChoice {
    Index(usize),
    Default,
}

/// A step result decoded for its node kind
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Condition {
        result: bool,
    },
    CallService {
        params: Value,
        /// The service started a script, which has its own trace
        running_script: bool,
        limit: Option<f64>,
    },
    Choose {
        choice: ChooseChoice,
    },
    ChooseBranch {
        result: bool,
    },
    Other(Value),
}

/// Kind of a config node, inferred from its position and keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Trigger,
    Condition,
    CallService,
    Choose,
    /// One `choose/N` option (conditions + sequence)
    ChooseOption,
    If,
    Repeat,
    Parallel,
    Sequence,
    Delay,
    Wait,
    Event,
    Scene,
    Device,
    Variables,
    Stop,
    Other,
}

impl NodeKind {
    /// Classify the config fragment found at `path`.
    pub fn classify(path: &TracePath, fragment: &Value) -> Self {
        if path.is_trigger() {
            return NodeKind::Trigger;
        }

        let segments = path.segments();
        if let [.., Segment::Key(key), Segment::Index(_)] = segments {
            if key == "choose" {
                return NodeKind::ChooseOption;
            }
        }
        if path.root() == Some(crate::path::CONDITION) {
            return NodeKind::Condition;
        }
        if let [.., Segment::Key(key), Segment::Index(_)] = segments {
            if key == "conditions" {
                return NodeKind::Condition;
            }
        }

        let Some(map) = fragment.as_object() else {
            return NodeKind::Other;
        };
        let has = |key: &str| map.contains_key(key);

        if has("condition") {
            NodeKind::Condition
        } else if has("service") || has("action") {
            NodeKind::CallService
        } else if has("choose") {
            NodeKind::Choose
        } else if has("if") {
            NodeKind::If
        } else if has("repeat") {
            NodeKind::Repeat
        } else if has("parallel") {
            NodeKind::Parallel
        } else if has("sequence") {
            NodeKind::Sequence
        } else if has("delay") {
            NodeKind::Delay
        } else if has("wait_template") || has("wait_for_trigger") {
            NodeKind::Wait
        } else if has("event") {
            NodeKind::Event
        } else if has("scene") {
            NodeKind::Scene
        } else if has("device_id") {
            NodeKind::Device
        } else if has("variables") {
            NodeKind::Variables
        } else if has("stop") {
            NodeKind::Stop
        } else {
            NodeKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Trigger => "trigger",
            NodeKind::Condition => "condition",
            NodeKind::CallService => "call_service",
            NodeKind::Choose => "choose",
            NodeKind::ChooseOption => "choose_option",
            NodeKind::If => "if",
            NodeKind::Repeat => "repeat",
            NodeKind::Parallel => "parallel",
            NodeKind::Sequence => "sequence",
            NodeKind::Delay => "delay",
            NodeKind::Wait => "wait",
            NodeKind::Event => "event",
            NodeKind::Scene => "scene",
            NodeKind::Device => "device",
            NodeKind::Variables => "variables",
            NodeKind::Stop => "stop",
            NodeKind::Other => "other",
        }
    }
}

// ============================================
// Entity state
// ============================================

/// Live state of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<TraceContext>,
}

impl EntityState {
    pub fn new(entity_id: &str, state: &str) -> Self {
        let now = Utc::now();
        Self {
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            attributes: Map::new(),
            last_changed: now,
            last_updated: now,
            context: None,
        }
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    /// Domain part of the entity id (`light` for `light.kitchen`)
    pub fn domain(&self) -> &str {
        compute_domain(&self.entity_id)
    }

    pub fn device_class(&self) -> Option<&str> {
        self.attributes.get("device_class").and_then(Value::as_str)
    }

    pub fn friendly_name(&self) -> &str {
        self.attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .unwrap_or(&self.entity_id)
    }
}

/// Entity id → live state
pub type States = HashMap<String, EntityState>;

/// Domain part of an entity id; the whole id if it has no dot.
pub fn compute_domain(entity_id: &str) -> &str {
    entity_id
        .split_once('.')
        .map(|(domain, _)| domain)
        .unwrap_or(entity_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(result: Value) -> TraceStep {
        TraceStep {
            path: "action/0".to_string(),
            timestamp: Utc::now(),
            error: None,
            changed_variables: None,
            result: Some(result),
            child_id: None,
        }
    }

    #[test]
    fn test_script_execution_unknown_value() {
        let parsed: ScriptExecution = serde_json::from_value(json!("exploded")).unwrap();
        assert_eq!(parsed, ScriptExecution::Unknown);
        let parsed: ScriptExecution = serde_json::from_value(json!("failed_max_runs")).unwrap();
        assert_eq!(parsed, ScriptExecution::FailedMaxRuns);
    }

    #[test]
    fn test_classify_nodes() {
        let path = |p: &str| TracePath::parse(p).unwrap();
        assert_eq!(
            NodeKind::classify(&path("trigger/0"), &json!({"platform": "state"})),
            NodeKind::Trigger
        );
        assert_eq!(
            NodeKind::classify(&path("condition/0"), &json!({"condition": "state"})),
            NodeKind::Condition
        );
        assert_eq!(
            NodeKind::classify(&path("action/0"), &json!({"service": "light.turn_on"})),
            NodeKind::CallService
        );
        assert_eq!(
            NodeKind::classify(&path("action/1"), &json!({"choose": []})),
            NodeKind::Choose
        );
        assert_eq!(
            NodeKind::classify(
                &path("action/1/choose/0"),
                &json!({"conditions": [], "sequence": []})
            ),
            NodeKind::ChooseOption
        );
        assert_eq!(
            NodeKind::classify(
                &path("action/1/choose/0/conditions/0"),
                &json!({"platform": "state"})
            ),
            NodeKind::Condition
        );
        assert_eq!(
            NodeKind::classify(&path("action/2"), &json!({"delay": 5})),
            NodeKind::Delay
        );
        assert_eq!(
            NodeKind::classify(&path("action/3"), &json!("???")),
            NodeKind::Other
        );
    }

    #[test]
    fn test_typed_results() {
        assert_eq!(
            step(json!({"result": true})).typed_result(NodeKind::Condition),
            Some(StepResult::Condition { result: true })
        );
        assert_eq!(
            step(json!({"choice": 1})).typed_result(NodeKind::Choose),
            Some(StepResult::Choose {
                choice: ChooseChoice::Index(1)
            })
        );
        assert_eq!(
            step(json!({"choice": "default"})).typed_result(NodeKind::Choose),
            Some(StepResult::Choose {
                choice: ChooseChoice::Default
            })
        );
        assert_eq!(
            step(json!({"result": false})).typed_result(NodeKind::ChooseOption),
            Some(StepResult::ChooseBranch { result: false })
        );

        let call = step(json!({
            "params": {"domain": "script", "service": "turn_on"},
            "running_script": true,
            "limit": 10
        }))
        .typed_result(NodeKind::CallService);
        match call {
            Some(StepResult::CallService {
                running_script,
                limit,
                ..
            }) => {
                assert!(running_script);
                assert_eq!(limit, Some(10.0));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // Same raw result decoded for the wrong kind falls back to Other
        assert!(matches!(
            step(json!({"choice": 1})).typed_result(NodeKind::Condition),
            Some(StepResult::Other(_))
        ));
    }

    #[test]
    fn test_choose_index_out_of_range() {
        let huge = step(json!({"choice": u64::MAX})).typed_result(NodeKind::Choose);
        match usize::try_from(u64::MAX) {
            Ok(max) => assert_eq!(
                huge,
                Some(StepResult::Choose {
                    choice: ChooseChoice::Index(max)
                })
            ),
            Err(_) => assert!(matches!(huge, Some(StepResult::Other(_)))),
        }

        assert!(matches!(
            step(json!({"choice": -1})).typed_result(NodeKind::Choose),
            Some(StepResult::Other(_))
        ));
        assert!(matches!(
            step(json!({"choice": 1.5})).typed_result(NodeKind::Choose),
            Some(StepResult::Other(_))
        ));
    }

    #[test]
    fn test_entity_state_helpers() {
        let state = EntityState::new("binary_sensor.front_door", "on")
            .with_attribute("device_class", json!("door"))
            .with_attribute("friendly_name", json!("Front Door"));
        assert_eq!(state.domain(), "binary_sensor");
        assert_eq!(state.device_class(), Some("door"));
        assert_eq!(state.friendly_name(), "Front Door");
        assert_eq!(compute_domain("nodot"), "nodot");
    }

    #[test]
    fn test_trace_timestamp_duration() {
        let ts: TraceTimestamp = serde_json::from_value(json!({
            "start": "2021-03-25T04:36:51.223693+00:00",
            "finish": "2021-03-25T04:36:53.223693+00:00"
        }))
        .unwrap();
        assert_eq!(ts.duration().unwrap().num_seconds(), 2);
    }
}
