//! In-memory mock backend
//!
//! [`MockBackend`] stands in for the real backend in demos and tests. It
//! implements both [`SocketTransport`] and [`ApiTransport`] by routing every
//! call through a registry of handlers:
//!
//! - socket commands are matched on `msg["type"]`
//! - REST calls are matched against `(PathMatcher, handler)` pairs in
//!   registration order; the first match wins
//!
//! Anything unmatched is rejected with [`Error::not_mocked`].
//!
//! The mock also owns a states map. [`MockBackend::add_entities`],
//! [`MockBackend::update_states`] and [`MockBackend::call_service`] merge into
//! it and publish a fresh [`StatesSnapshot`]. Subscribers always see the
//! latest snapshot; one that reads slowly skips intermediate ones instead of
//! falling behind.
//!
//! All registry and state access goes through one mutex. Handlers are cloned
//! out of the lock before they run, so a handler may call back into the
//! backend.

pub mod demo;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{ApiMethod, ApiTransport, SocketTransport};
use crate::types::{EntityState, States, TraceContext};

/// Full states map as published to subscribers
pub type StatesSnapshot = Arc<States>;

/// Handler for one socket command type
pub type WsHandler = Arc<dyn Fn(&MockBackend, &Value) -> Result<Value> + Send + Sync>;

/// Handler for REST calls whose path matches
pub type ApiHandler =
    Arc<dyn Fn(&MockBackend, ApiMethod, &str, Option<&Value>) -> Result<Value> + Send + Sync>;

/// How a REST handler selects paths
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// Whole path, query string included, must be equal
    Exact(String),
    /// Regex tested against the whole path
    Pattern(Regex),
}

impl PathMatcher {
    pub fn exact(path: impl Into<String>) -> Self {
        PathMatcher::Exact(path.into())
    }

    /// Compile `pattern` into a matcher.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(PathMatcher::Pattern)
            .map_err(|e| Error::Config(format!("invalid path pattern {:?}: {}", pattern, e)))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Exact(expected) => expected == path,
            PathMatcher::Pattern(regex) => regex.is_match(path),
        }
    }
}

impl From<Regex> for PathMatcher {
    fn from(regex: Regex) -> Self {
        PathMatcher::Pattern(regex)
    }
}

#[derive(Default)]
struct Registry {
    ws: HashMap<String, WsHandler>,
    rest: Vec<(PathMatcher, ApiHandler)>,
    states: States,
}

/// Test and demo double for the backend
pub struct MockBackend {
    registry: Mutex<Registry>,
    snapshots: watch::Sender<StatesSnapshot>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();
        f.debug_struct("MockBackend")
            .field("ws", &registry.ws.keys().collect::<Vec<_>>())
            .field("rest", &registry.rest.len())
            .field("states", &registry.states.len())
            .finish()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(StatesSnapshot::default());
        Self {
            registry: Mutex::new(Registry::default()),
            snapshots,
        }
    }

    /// Register the handler for socket commands of type `command`.
    ///
    /// Replaces any earlier handler for the same type.
    pub fn mock_ws<F>(&self, command: &str, handler: F)
    where
        F: Fn(&MockBackend, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.lock()
            .ws
            .insert(command.to_string(), Arc::new(handler));
    }

    /// Register a REST handler. Earlier registrations take precedence.
    pub fn mock_api<F>(&self, matcher: PathMatcher, handler: F)
    where
        F: Fn(&MockBackend, ApiMethod, &str, Option<&Value>) -> Result<Value>
            + Send
            + Sync
            + 'static,
    {
        self.lock().rest.push((matcher, Arc::new(handler)));
    }

    /// Watch the states map; the receiver is marked changed on every merge.
    pub fn subscribe(&self) -> watch::Receiver<StatesSnapshot> {
        self.snapshots.subscribe()
    }

    /// Copy of the current states map.
    pub fn states(&self) -> States {
        self.lock().states.clone()
    }

    pub fn state(&self, entity_id: &str) -> Option<EntityState> {
        self.lock().states.get(entity_id).cloned()
    }

    /// Add (or replace) entities and push the new states.
    pub fn add_entities(&self, entities: impl IntoIterator<Item = EntityState>) {
        self.merge_states(entities);
    }

    /// Merge changed states and push the new states.
    ///
    /// `last_changed` is kept when the state string did not change.
    pub fn update_states(&self, updates: impl IntoIterator<Item = EntityState>) {
        let updates: Vec<EntityState> = {
            let registry = self.lock();
            updates
                .into_iter()
                .map(|mut update| {
                    if let Some(old) = registry.states.get(&update.entity_id) {
                        if old.state == update.state {
                            update.last_changed = old.last_changed;
                        }
                    }
                    update
                })
                .collect()
        };
        self.merge_states(updates);
    }

    fn merge_states(&self, entities: impl IntoIterator<Item = EntityState>) {
        let snapshot = {
            let mut registry = self.lock();
            for entity in entities {
                registry.states.insert(entity.entity_id.clone(), entity);
            }
            Arc::new(registry.states.clone())
        };

        self.snapshots.send_replace(snapshot);
        tracing::trace!(
            receivers = self.snapshots.receiver_count(),
            "Published states snapshot"
        );
    }

    /// Apply a service call to the targeted entities.
    ///
    /// Returns the context stamped on every entity it changed. Unknown
    /// services are logged and change nothing.
    pub fn call_service(&self, domain: &str, service: &str, data: &Value) -> TraceContext {
        let context = TraceContext {
            id: Uuid::new_v4().simple().to_string(),
            parent_id: None,
            user_id: None,
        };

        let targets = target_entities(data);
        let now = Utc::now();
        let updates: Vec<EntityState> = {
            let registry = self.lock();
            targets
                .iter()
                .filter_map(|entity_id| {
                    let Some(current) = registry.states.get(entity_id) else {
                        tracing::warn!(entity_id = %entity_id, "Service target does not exist");
                        return None;
                    };
                    let new_state = service_result(domain, service, &current.state)?;
                    let mut updated = current.clone();
                    if updated.state != new_state {
                        updated.last_changed = now;
                    }
                    updated.state = new_state.to_string();
                    updated.last_updated = now;
                    updated.context = Some(context.clone());
                    Some(updated)
                })
                .collect()
        };

        if updates.is_empty() {
            tracing::info!(domain, service, targets = ?targets, "Service call changed nothing");
        } else {
            tracing::debug!(domain, service, changed = updates.len(), "Service call applied");
            self.merge_states(updates);
        }
        context
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ws_handler(&self, msg: &Value) -> Result<WsHandler> {
        let command = msg.get("type").and_then(Value::as_str).unwrap_or_default();
        self.lock().ws.get(command).cloned().ok_or_else(|| {
            tracing::warn!(command, "Socket command not mocked");
            Error::not_mocked(format!("socket command {} is not mocked", command))
        })
    }

    fn api_handler(&self, method: ApiMethod, path: &str) -> Result<ApiHandler> {
        self.lock()
            .rest
            .iter()
            .find(|(matcher, _)| matcher.matches(path))
            .map(|(_, handler)| handler.clone())
            .ok_or_else(|| {
                tracing::warn!(%method, path, "API call not mocked");
                Error::not_mocked(format!("API call {} {} is not mocked", method, path))
            })
    }
}

#[async_trait]
impl SocketTransport for MockBackend {
    async fn call_ws(&self, msg: Value) -> Result<Value> {
        let handler = self.ws_handler(&msg)?;
        handler(self, &msg)
    }

    async fn send_ws(&self, msg: Value) -> Result<()> {
        let handler = self.ws_handler(&msg)?;
        handler(self, &msg).map(|_| ())
    }
}

#[async_trait]
impl ApiTransport for MockBackend {
    async fn call_api(
        &self,
        method: ApiMethod,
        path: &str,
        params: Option<&Value>,
    ) -> Result<Value> {
        let handler = self.api_handler(method, path)?;
        handler(self, method, path, params)
    }
}

/// Decoded value of `key` in the query string of `path`.
pub fn query_param(path: &str, key: &str) -> Option<String> {
    let (_, query) = path.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        if name != key {
            return None;
        }
        urlencoding::decode(value).ok().map(|value| value.into_owned())
    })
}

/// Entity ids from `entity_id` or `target.entity_id`, string or list.
fn target_entities(data: &Value) -> Vec<String> {
    let raw = data
        .get("entity_id")
        .or_else(|| data.get("target").and_then(|target| target.get("entity_id")));
    match raw {
        Some(Value::String(id)) => vec![id.clone()],
        Some(Value::Array(ids)) => ids
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// New state after `domain.service`, `None` if the service is not simulated.
fn service_result(domain: &str, service: &str, current: &str) -> Option<&'static str> {
    match (domain, service) {
        (_, "turn_on") => Some("on"),
        (_, "turn_off") => Some("off"),
        (_, "toggle") => Some(if current == "on" { "off" } else { "on" }),
        ("lock", "lock") => Some("locked"),
        ("lock", "unlock") => Some("unlocked"),
        ("lock", "open") => Some("open"),
        ("cover", "open_cover") => Some("open"),
        ("cover", "close_cover") => Some("closed"),
        ("cover", "toggle_cover") => Some(if current == "open" { "closed" } else { "open" }),
        _ => None,
    }
}
