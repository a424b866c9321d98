//! Canned demo data for [`MockBackend`]
//!
//! Registers one automation (`motion_light`) with two runs, their contexts,
//! the logbook entries they caused and the entities involved. Also answers
//! `get_states` and `call_service`.

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::logbook::LogbookEntry;
use crate::types::{AutomationTraceExtended, EntityState};

use super::{query_param, MockBackend, PathMatcher};

pub const DEMO_ITEM_ID: &str = "motion_light";
pub const DEMO_OLDER_RUN: &str = "a1b2c3";
pub const DEMO_NEWER_RUN: &str = "d4e5f6";

/// A backend with every demo handler and entity registered.
pub fn demo_backend() -> Result<MockBackend> {
    let backend = MockBackend::new();
    register(&backend)?;
    Ok(backend)
}

/// Register demo handlers and entities on `backend`.
pub fn register(backend: &MockBackend) -> Result<()> {
    let traces = demo_traces()?;
    let logbook = demo_logbook()?;

    backend.add_entities(demo_entities());

    let summaries: Vec<Value> = traces
        .iter()
        .map(|trace| serde_json::to_value(&trace.summary))
        .collect::<std::result::Result<_, _>>()?;
    backend.mock_ws("trace/list", move |_, msg| {
        let wanted = |key: &str| msg.get(key).and_then(Value::as_str);
        let runs: Vec<Value> = summaries
            .iter()
            .filter(|run| {
                wanted("domain").map_or(true, |d| run["domain"] == d)
                    && wanted("item_id").map_or(true, |i| run["item_id"] == i)
            })
            .cloned()
            .collect();
        Ok(Value::Array(runs))
    });

    let contexts: serde_json::Map<String, Value> = traces
        .iter()
        .map(|trace| {
            (
                trace.context.id.clone(),
                json!({
                    "run_id": trace.summary.run_id,
                    "domain": trace.summary.domain.as_str(),
                    "item_id": trace.summary.item_id,
                }),
            )
        })
        .collect();
    backend.mock_ws("trace/contexts", move |_, _| Ok(Value::Object(contexts.clone())));

    let full: Vec<Value> = traces
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<_, _>>()?;
    backend.mock_ws("trace/get", move |_, msg| {
        let run_id = msg.get("run_id").and_then(Value::as_str).unwrap_or_default();
        full.iter()
            .find(|trace| trace["run_id"] == run_id)
            .cloned()
            .ok_or_else(|| Error::Backend {
                code: "not_found".to_string(),
                message: format!("The trace could not be found: {}", run_id),
            })
    });

    backend.mock_ws("get_states", |backend, _| {
        let states: Vec<EntityState> = backend.states().into_values().collect();
        Ok(serde_json::to_value(states)?)
    });

    backend.mock_ws("call_service", |backend, msg| {
        let domain = msg.get("domain").and_then(Value::as_str).unwrap_or_default();
        let service = msg.get("service").and_then(Value::as_str).unwrap_or_default();
        let data = msg.get("service_data").cloned().unwrap_or(Value::Null);
        let context = backend.call_service(domain, service, &data);
        Ok(json!({"context": serde_json::to_value(context)?}))
    });

    backend.mock_api(PathMatcher::pattern(r"^logbook/")?, move |_, _, path, _| {
        let context_id = query_param(path, "context_id");
        let entity = query_param(path, "entity");
        let entries: Vec<&LogbookEntry> = logbook
            .iter()
            .filter(|entry| {
                context_id
                    .as_deref()
                    .map_or(true, |id| entry.context_id.as_deref() == Some(id))
                    && entity
                        .as_deref()
                        .map_or(true, |id| entry.entity_id.as_deref() == Some(id))
            })
            .collect();
        Ok(serde_json::to_value(entries)?)
    });

    tracing::debug!(item_id = DEMO_ITEM_ID, "Registered demo handlers");
    Ok(())
}

fn demo_entities() -> Vec<EntityState> {
    vec![
        EntityState::new("binary_sensor.hallway_motion", "off")
            .with_attribute("device_class", json!("motion"))
            .with_attribute("friendly_name", json!("Hallway motion")),
        EntityState::new("light.hallway", "off")
            .with_attribute("friendly_name", json!("Hallway light")),
        EntityState::new("sun.sun", "below_horizon").with_attribute("friendly_name", json!("Sun")),
    ]
}

fn demo_config() -> Value {
    json!({
        "id": DEMO_ITEM_ID,
        "alias": "Hallway motion light",
        "trigger": [
            {"platform": "state", "entity_id": "binary_sensor.hallway_motion", "to": "on"}
        ],
        "condition": [
            {"condition": "state", "entity_id": "sun.sun", "state": "below_horizon"}
        ],
        "action": [
            {
                "choose": [
                    {
                        "conditions": [{"condition": "time", "after": "22:00:00"}],
                        "sequence": [{"service": "light.turn_on", "target": {"entity_id": "light.hallway"}, "data": {"brightness_pct": 20}}]
                    }
                ],
                "default": [
                    {"service": "light.turn_on", "target": {"entity_id": "light.hallway"}}
                ]
            },
            {"delay": {"minutes": 2}},
            {"service": "light.turn_off", "target": {"entity_id": "light.hallway"}}
        ]
    })
}

fn demo_traces() -> Result<Vec<AutomationTraceExtended>> {
    let older = json!({
        "domain": "automation",
        "item_id": DEMO_ITEM_ID,
        "run_id": DEMO_OLDER_RUN,
        "state": "stopped",
        "script_execution": "finished",
        "last_step": "action/2",
        "timestamp": {"start": "2021-03-25T21:10:00Z", "finish": "2021-03-25T21:12:01Z"},
        "trigger": "state of binary_sensor.hallway_motion",
        "context": {"id": "ctx-older"},
        "config": demo_config(),
        "trace": {
            "trigger/0": [{
                "path": "trigger/0",
                "timestamp": "2021-03-25T21:10:00Z",
                "changed_variables": {"trigger": {"description": "state of binary_sensor.hallway_motion"}}
            }],
            "condition/0": [{"path": "condition/0", "timestamp": "2021-03-25T21:10:00.100Z", "result": {"result": true}}],
            "action/0": [{"path": "action/0", "timestamp": "2021-03-25T21:10:00.200Z", "result": {"choice": "default"}}],
            "action/0/choose/0": [{"path": "action/0/choose/0", "timestamp": "2021-03-25T21:10:00.210Z", "result": {"result": false}}],
            "action/0/choose/0/conditions/0": [{"path": "action/0/choose/0/conditions/0", "timestamp": "2021-03-25T21:10:00.220Z", "result": {"result": false}}],
            "action/0/default/0": [{
                "path": "action/0/default/0",
                "timestamp": "2021-03-25T21:10:00.300Z",
                "result": {"params": {"domain": "light", "service": "turn_on", "service_data": {}, "target": {"entity_id": ["light.hallway"]}}, "running_script": false, "limit": 10}
            }],
            "action/1": [{"path": "action/1", "timestamp": "2021-03-25T21:10:00.400Z"}],
            "action/2": [{
                "path": "action/2",
                "timestamp": "2021-03-25T21:12:00.400Z",
                "result": {"params": {"domain": "light", "service": "turn_off", "service_data": {}, "target": {"entity_id": ["light.hallway"]}}, "running_script": false, "limit": 10}
            }]
        }
    });

    let newer = json!({
        "domain": "automation",
        "item_id": DEMO_ITEM_ID,
        "run_id": DEMO_NEWER_RUN,
        "state": "stopped",
        "script_execution": "error",
        "last_step": "action/0/choose/0/sequence/0",
        "error": "Unable to find service light.turn_on",
        "timestamp": {"start": "2021-03-25T22:30:00Z", "finish": "2021-03-25T22:30:00.500Z"},
        "trigger": "state of binary_sensor.hallway_motion",
        "context": {"id": "ctx-newer"},
        "config": demo_config(),
        "trace": {
            "trigger/0": [{"path": "trigger/0", "timestamp": "2021-03-25T22:30:00Z"}],
            "condition/0": [{"path": "condition/0", "timestamp": "2021-03-25T22:30:00.100Z", "result": {"result": true}}],
            "action/0": [{"path": "action/0", "timestamp": "2021-03-25T22:30:00.200Z", "result": {"choice": 0}}],
            "action/0/choose/0": [{"path": "action/0/choose/0", "timestamp": "2021-03-25T22:30:00.210Z", "result": {"result": true}}],
            "action/0/choose/0/conditions/0": [{"path": "action/0/choose/0/conditions/0", "timestamp": "2021-03-25T22:30:00.220Z", "result": {"result": true}}],
            "action/0/choose/0/sequence/0": [{
                "path": "action/0/choose/0/sequence/0",
                "timestamp": "2021-03-25T22:30:00.300Z",
                "error": "Unable to find service light.turn_on"
            }]
        }
    });

    Ok(vec![
        serde_json::from_value(older)?,
        serde_json::from_value(newer)?,
    ])
}

fn demo_logbook() -> Result<Vec<LogbookEntry>> {
    let entries = json!([
        {
            "when": "2021-03-25T21:10:00Z",
            "name": "Hallway motion",
            "entity_id": "binary_sensor.hallway_motion",
            "state": "on",
            "context_id": "ctx-motion"
        },
        {
            "when": "2021-03-25T21:10:00.350Z",
            "name": "Hallway light",
            "entity_id": "light.hallway",
            "state": "on",
            "context_id": "ctx-older",
            "context_event_type": "automation_triggered",
            "context_domain": "automation",
            "context_entity_id": "automation.motion_light",
            "context_name": "Hallway motion light"
        },
        {
            "when": "2021-03-25T21:12:00.450Z",
            "name": "Hallway light",
            "entity_id": "light.hallway",
            "state": "off",
            "context_id": "ctx-older",
            "context_event_type": "automation_triggered",
            "context_domain": "automation",
            "context_entity_id": "automation.motion_light",
            "context_name": "Hallway motion light"
        },
        {
            "when": "2021-03-25T22:30:00Z",
            "name": "Hallway motion",
            "entity_id": "binary_sensor.hallway_motion",
            "state": "on",
            "context_id": "ctx-motion-2"
        }
    ]);
    Ok(serde_json::from_value(entries)?)
}
