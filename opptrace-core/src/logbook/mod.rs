//! Logbook entries and lookups
//!
//! Logbook entries are stored by the backend independently of traces. A
//! trace is joined to them only through its context id and start time,
//! never through paths.
//!
//! Two lookups exist:
//! - [`get_logbook_data_for_context`]: one-shot, per-trace-view, never cached
//! - [`get_logbook_data`]: date range (+ entity), served through a
//!   [`LogbookCache`]
//!
//! Both fill in `message` for entries whose entity is still live, using its
//! current device class.

mod cache;
mod message;

pub use cache::LogbookCache;
pub use message::{logbook_message, BinarySensorClass, LogbookDomain};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::transport::{api_request, ApiMethod, ApiTransport};
use crate::types::{compute_domain, States};

/// One logbook record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogbookEntry {
    pub when: DateTime<Utc>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_entity_id_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_message: Option<String>,
}

impl LogbookEntry {
    pub fn new(when: DateTime<Utc>, name: &str) -> Self {
        Self {
            when,
            name: name.to_string(),
            message: None,
            entity_id: None,
            state: None,
            domain: None,
            icon: None,
            source: None,
            context_id: None,
            context_user_id: None,
            context_event_type: None,
            context_domain: None,
            context_service: None,
            context_entity_id: None,
            context_entity_id_name: None,
            context_name: None,
            context_message: None,
        }
    }

    /// Text shown after the name, e.g. `Front Door was opened`
    pub fn display_message(&self) -> String {
        match (&self.message, &self.state) {
            (Some(message), _) => message.clone(),
            (None, Some(state)) => logbook_message(self.entry_domain(), None, state),
            (None, None) => String::new(),
        }
    }

    fn entry_domain(&self) -> &str {
        self.domain
            .as_deref()
            .or_else(|| self.entity_id.as_deref().map(compute_domain))
            .unwrap_or("")
    }
}

/// Query string parameters for `logbook/{start}`
#[derive(Debug, Clone, Default)]
struct LogbookQuery<'a> {
    end_time: Option<&'a str>,
    entity_id: Option<&'a str>,
    entity_matches_only: bool,
    context_id: Option<&'a str>,
}

impl LogbookQuery<'_> {
    fn to_path(&self, start: &str) -> String {
        let mut params = Vec::new();
        if let Some(end_time) = self.end_time {
            params.push(format!("end_time={}", urlencoding::encode(end_time)));
        }
        if let Some(entity_id) = self.entity_id {
            params.push(format!("entity={}", urlencoding::encode(entity_id)));
        }
        if self.entity_matches_only {
            params.push("entity_matches_only=".to_string());
        }
        if let Some(context_id) = self.context_id {
            params.push(format!("context_id={}", urlencoding::encode(context_id)));
        }

        if params.is_empty() {
            format!("logbook/{}", start)
        } else {
            format!("logbook/{}?{}", start, params.join("&"))
        }
    }
}

/// Fetch the logbook for a date range straight from the server.
pub(crate) async fn fetch_logbook_range(
    transport: &dyn ApiTransport,
    start: &str,
    end: &str,
    entity_id: Option<&str>,
    entity_matches_only: bool,
) -> Result<Vec<LogbookEntry>> {
    let path = LogbookQuery {
        end_time: Some(end),
        entity_id,
        entity_matches_only,
        context_id: None,
    }
    .to_path(start);
    api_request(transport, ApiMethod::Get, &path, None).await
}

/// Entries caused by one run: everything since `start` sharing `context_id`,
/// with messages filled in from live states.
///
/// Not cached.
pub async fn get_logbook_data_for_context(
    transport: &dyn ApiTransport,
    states: &States,
    start: &str,
    context_id: &str,
) -> Result<Vec<LogbookEntry>> {
    let path = LogbookQuery {
        context_id: Some(context_id),
        ..Default::default()
    }
    .to_path(start);
    tracing::debug!(start, context_id, "Fetching logbook for context");
    let mut entries: Vec<LogbookEntry> = api_request(transport, ApiMethod::Get, &path, None).await?;
    enrich_messages(&mut entries, states);
    Ok(entries)
}

/// Entries for a date range, optionally limited to one entity, with
/// messages filled in from live states.
pub async fn get_logbook_data(
    transport: &dyn ApiTransport,
    cache: &LogbookCache,
    states: &States,
    start: &str,
    end: &str,
    entity_id: Option<&str>,
    entity_matches_only: bool,
) -> Result<Vec<LogbookEntry>> {
    let mut entries = cache
        .get(transport, start, end, entity_id, entity_matches_only)
        .await?;
    enrich_messages(&mut entries, states);
    Ok(entries)
}

/// Fill `message` for entries that have a state and a live entity.
pub fn enrich_messages(entries: &mut [LogbookEntry], states: &States) {
    for entry in entries.iter_mut() {
        let (Some(state), Some(entity_id)) = (entry.state.as_deref(), entry.entity_id.as_deref())
        else {
            continue;
        };
        let Some(live) = states.get(entity_id) else {
            continue;
        };
        entry.message = Some(logbook_message(live.domain(), live.device_class(), state));
    }
}
