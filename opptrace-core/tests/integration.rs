//! Integration tests for trace loading, resolution and logbook lookups
//!
//! Traces come from fixture files in `tests/fixtures/traces/`. Backend
//! interaction goes through the mock backend or a `wiremock` server.

use std::path::PathBuf;

use opptrace_core::graph::ScriptGraph;
use opptrace_core::logbook::get_logbook_data_for_context;
use opptrace_core::mock::{demo, MockBackend};
use opptrace_core::timeline::{build_timeline, TimelineEventKind};
use opptrace_core::transport::RestClient;
use opptrace_core::viewer::{Notice, RunPicker};
use opptrace_core::{
    config::ServerConfig, get_trigger_path_from_trace, resolve, AutomationTraceExtended,
    EntityState, Error, NodeKind, States, TraceDomain,
};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Get the path to a fixture file
fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/traces")
        .join(name)
}

fn load_fixture(name: &str) -> AutomationTraceExtended {
    let raw = std::fs::read_to_string(fixture_path(name)).expect("failed to read fixture");
    serde_json::from_str(&raw).expect("fixture should parse")
}

fn run_summary(run_id: &str, start: &str) -> Value {
    json!({
        "domain": "automation",
        "item_id": "porch_light",
        "run_id": run_id,
        "state": "stopped",
        "script_execution": "finished",
        "timestamp": {"start": start, "finish": start}
    })
}

// ============================================
// Fixture traces
// ============================================

#[test]
fn test_every_trace_path_resolves() {
    for name in ["script-repeat.json", "automation-single-condition.json"] {
        let trace = load_fixture(name);
        for path in trace.trace.keys() {
            assert!(
                resolve(&trace.config, path).is_ok(),
                "{name}: {path} should resolve"
            );
        }
        trace.validate().expect("fixture should validate");
    }
}

#[test]
fn test_single_object_lists_resolve_at_index_zero() {
    let trace = load_fixture("automation-single-condition.json");

    assert_eq!(get_trigger_path_from_trace(&trace.trace), Some("trigger"));
    assert_eq!(
        resolve(&trace.config, "condition/0/condition").unwrap(),
        &json!("sun")
    );
    assert!(resolve(&trace.config, "condition/1/condition").is_err());
}

#[test]
fn test_stale_config_is_reported_not_defaulted() {
    let trace = load_fixture("automation-stale-config.json");

    let err = trace.validate().unwrap_err();
    assert!(err.is_config_mismatch());
    assert!(err
        .user_message()
        .starts_with("Trace does not match current configuration"));

    assert!(matches!(
        build_timeline(&trace, &[]),
        Err(Error::Resolution { .. })
    ));
    assert!(ScriptGraph::build(&trace).is_err());
}

#[test]
fn test_script_graph_and_timeline() {
    let trace = load_fixture("script-repeat.json");
    assert_eq!(trace.summary.domain, TraceDomain::Script);
    assert_eq!(get_trigger_path_from_trace(&trace.trace), None);

    let graph = ScriptGraph::build(&trace).unwrap();
    assert!(graph.triggers.is_empty());
    assert_eq!(graph.actions.len(), 3);
    assert_eq!(graph.actions[0].kind, NodeKind::Repeat);
    assert_eq!(graph.actions[1].kind, NodeKind::If);

    let toggle = graph.node("sequence/0/repeat/sequence/0").unwrap();
    assert_eq!(toggle.step_count, 2);
    assert!(graph.node("sequence/1/if/0").unwrap().executed);

    let timeline = build_timeline(&trace, &[]).unwrap();
    let child = timeline.iter().find_map(|event| match &event.kind {
        TimelineEventKind::Step { child, .. } => child.clone(),
        _ => None,
    });
    assert_eq!(child.unwrap().item_id, "fan_off");

    let rendered: Vec<String> = timeline.iter().map(|e| e.render()).collect();
    // Repeat iterations interleave by time, not by path
    assert_eq!(
        rendered[1],
        "Called service light.toggle (sequence/0/repeat/sequence/0)"
    );
    assert_eq!(rendered[2], "Executed delay (sequence/0/repeat/sequence/1)");
    assert_eq!(
        rendered[3],
        "Called service light.toggle (sequence/0/repeat/sequence/0)"
    );
    assert_eq!(rendered.last().unwrap(), "Finished");
}

// ============================================
// Run selection against the mock backend
// ============================================

#[tokio::test]
async fn test_picker_clears_purged_selection() {
    let backend = MockBackend::new();
    backend.mock_ws("trace/list", |_, _| {
        Ok(json!([
            run_summary("r1", "2021-03-25T10:00:00Z"),
            run_summary("r2", "2021-03-25T11:00:00Z")
        ]))
    });

    let mut picker = RunPicker::new(TraceDomain::Automation, "porch_light").with_selection("r1");
    assert_eq!(picker.refresh(&backend).await.unwrap(), None);
    assert_eq!(picker.selected(), Some("r1"));
    assert_eq!(picker.runs()[0].run_id, "r2");

    // r1 purged by retention
    backend.mock_ws("trace/list", |_, _| {
        Ok(json!([
            run_summary("r2", "2021-03-25T11:00:00Z"),
            run_summary("r3", "2021-03-25T12:00:00Z")
        ]))
    });

    let notice = picker.refresh(&backend).await.unwrap();
    assert_eq!(
        notice,
        Some(Notice::StaleSelection {
            run_id: "r1".to_string()
        })
    );
    assert_eq!(picker.selected(), None);
    assert!(picker.load_selected(&backend).await.unwrap().is_none());
}

#[tokio::test]
async fn test_late_load_is_discarded() {
    let backend = demo::demo_backend().unwrap();
    let mut picker = RunPicker::new(TraceDomain::Automation, demo::DEMO_ITEM_ID);
    picker.refresh(&backend).await.unwrap();
    assert_eq!(picker.selected(), Some(demo::DEMO_NEWER_RUN));

    let request = picker.load_request().unwrap();
    picker.select(demo::DEMO_OLDER_RUN).unwrap();
    let loaded = request.execute(&backend).await.unwrap();
    assert!(picker.accept(loaded).is_none());

    let trace = picker.load_selected(&backend).await.unwrap().unwrap();
    assert_eq!(trace.run_id(), demo::DEMO_OLDER_RUN);
}

#[tokio::test]
async fn test_demo_run_joins_logbook_by_context() {
    let backend = demo::demo_backend().unwrap();
    let mut picker = RunPicker::new(TraceDomain::Automation, demo::DEMO_ITEM_ID);
    picker.refresh(&backend).await.unwrap();
    picker.select(demo::DEMO_OLDER_RUN).unwrap();
    let trace = picker.load_selected(&backend).await.unwrap().unwrap();

    let start = trace.summary.timestamp.start.to_rfc3339();
    let states = backend.states();
    let logbook = get_logbook_data_for_context(&backend, &states, &start, &trace.context.id)
        .await
        .unwrap();
    let timeline = build_timeline(&trace, &logbook).unwrap();

    let logbook_lines: Vec<String> = timeline
        .iter()
        .filter(|e| matches!(e.kind, TimelineEventKind::Logbook(_)))
        .map(|e| e.render())
        .collect();
    assert_eq!(
        logbook_lines,
        vec!["Hallway light turned on", "Hallway light turned off"]
    );
}

// ============================================
// REST client
// ============================================

#[tokio::test]
async fn test_rest_client_fetches_logbook_for_context() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/logbook/2021-03-25T21:10:00Z"))
        .and(query_param("context_id", "ctx-older"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "when": "2021-03-25T21:10:00.350000+00:00",
                "name": "Hallway light",
                "message": "turned on",
                "entity_id": "light.hallway",
                "context_id": "ctx-older"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::new(&ServerConfig {
        url: Some(server.uri()),
        token: Some("secret".to_string()),
        ..Default::default()
    })
    .unwrap();

    let entries = get_logbook_data_for_context(
        &client,
        &States::new(),
        "2021-03-25T21:10:00Z",
        "ctx-older",
    )
    .await
    .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].display_message(), "turned on");
}

#[tokio::test]
async fn test_rest_context_lookup_phrases_door_from_live_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/logbook/2021-03-25T07:00:00Z"))
        .and(query_param("context_id", "ctx-door"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "when": "2021-03-25T07:00:01+00:00",
                "name": "Front door",
                "entity_id": "binary_sensor.front_door",
                "state": "on",
                "context_id": "ctx-door"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::new(&ServerConfig {
        url: Some(server.uri()),
        token: Some("secret".to_string()),
        ..Default::default()
    })
    .unwrap();
    let door = EntityState::new("binary_sensor.front_door", "off")
        .with_attribute("device_class", json!("door"));
    let states: States = [(door.entity_id.clone(), door)].into_iter().collect();

    let entries =
        get_logbook_data_for_context(&client, &states, "2021-03-25T07:00:00Z", "ctx-door")
            .await
            .unwrap();
    assert_eq!(entries[0].message.as_deref(), Some("was opened"));
    assert_eq!(entries[0].display_message(), "was opened");
}

#[tokio::test]
async fn test_rest_client_surfaces_backend_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid access token"})),
        )
        .mount(&server)
        .await;

    let client = RestClient::new(&ServerConfig {
        url: Some(server.uri()),
        token: Some("wrong".to_string()),
        ..Default::default()
    })
    .unwrap();

    let err = get_logbook_data_for_context(&client, &States::new(), "t0", "ctx")
        .await
        .unwrap_err();
    match err {
        Error::Backend { code, message } => {
            assert_eq!(code, "401");
            assert_eq!(message, "Invalid access token");
        }
        other => panic!("expected backend error, got {other:?}"),
    }
}
