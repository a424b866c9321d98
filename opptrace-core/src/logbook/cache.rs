//! Logbook date-range cache
//!
//! ## Layout
//!
//! ```text
//! "{start}{end}" ─┬─ "*"             → all entities
//!                 ├─ "light.kitchen" → one entity
//!                 └─ ...
//! ```
//!
//! Keys must match exactly; overlapping ranges are separate buckets.
//!
//! Each slot is a [`OnceCell`], inserted before the fetch starts. Callers
//! asking for the same slot while the fetch is in flight wait on that cell
//! instead of issuing their own request. A failed fetch leaves the cell empty
//! so the next caller fetches again.
//!
//! An entity request for a range whose `"*"` slot exists is answered by
//! filtering the all-entities result; no request is made for the entity.
//! This also holds when the entity has its own slot that an earlier failed
//! fetch left empty, once the `"*"` slot has resolved.
//!
//! The slot map sits behind a mutex that is only held while looking up or
//! inserting slots, never across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;

use crate::error::Result;
use crate::transport::ApiTransport;

use super::{fetch_logbook_range, LogbookEntry};

const ALL_ENTITIES: &str = "*";

type Slot = Arc<OnceCell<Arc<Vec<LogbookEntry>>>>;

/// Where a request will be answered from
enum Lookup {
    /// The slot for exactly what was asked
    Direct(Slot),
    /// The all-entities slot, filtered down to one entity
    Wildcard(Slot),
}

/// Cache of date-range logbook lookups
///
/// Cloning shares the underlying cache.
#[derive(Debug, Clone, Default)]
pub struct LogbookCache {
    buckets: Arc<Mutex<HashMap<String, HashMap<String, Slot>>>>,
}

impl LogbookCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries between `start` and `end`, for one entity or all of them.
    pub async fn get(
        &self,
        transport: &dyn ApiTransport,
        start: &str,
        end: &str,
        entity_id: Option<&str>,
        entity_matches_only: bool,
    ) -> Result<Vec<LogbookEntry>> {
        let entity = entity_id.unwrap_or(ALL_ENTITIES);

        match self.lookup(start, end, entity) {
            Lookup::Direct(slot) => {
                let entries = slot
                    .get_or_try_init(|| async {
                        tracing::debug!(start, end, entity, "Logbook cache miss");
                        fetch_logbook_range(transport, start, end, entity_id, entity_matches_only)
                            .await
                            .map(Arc::new)
                    })
                    .await?;
                Ok(entries.as_ref().clone())
            }
            Lookup::Wildcard(slot) => {
                let all = slot
                    .get_or_try_init(|| async {
                        fetch_logbook_range(transport, start, end, None, false)
                            .await
                            .map(Arc::new)
                    })
                    .await?;
                tracing::debug!(start, end, entity, "Logbook served from all-entities bucket");
                Ok(all
                    .iter()
                    .filter(|entry| entry.entity_id.as_deref() == Some(entity))
                    .cloned()
                    .collect())
            }
        }
    }

    fn lookup(&self, start: &str, end: &str, entity: &str) -> Lookup {
        let mut buckets = self.lock();
        let bucket = buckets.entry(cache_key(start, end)).or_default();

        let all = if entity == ALL_ENTITIES {
            None
        } else {
            bucket.get(ALL_ENTITIES)
        };
        match (bucket.get(entity), all) {
            // An entity slot left empty by a failed fetch must not shadow a
            // resolved all-entities result.
            (Some(slot), Some(all)) if !slot.initialized() && all.initialized() => {
                return Lookup::Wildcard(all.clone());
            }
            (Some(slot), _) => return Lookup::Direct(slot.clone()),
            (None, Some(all)) => return Lookup::Wildcard(all.clone()),
            (None, None) => {}
        }

        let slot: Slot = Arc::new(OnceCell::new());
        bucket.insert(entity.to_string(), slot.clone());
        Lookup::Direct(slot)
    }

    /// Forget everything cached for exactly this range.
    pub fn clear(&self, start: &str, end: &str) {
        self.lock().remove(&cache_key(start, end));
    }

    /// Forget every range.
    pub fn clear_all(&self) {
        self.lock().clear();
    }

    /// True if a resolved result for this range and entity is held.
    pub fn is_cached(&self, start: &str, end: &str, entity_id: Option<&str>) -> bool {
        let entity = entity_id.unwrap_or(ALL_ENTITIES);
        self.lock()
            .get(&cache_key(start, end))
            .and_then(|bucket| bucket.get(entity))
            .map(|slot| slot.initialized())
            .unwrap_or(false)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, Slot>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn cache_key(start: &str, end: &str) -> String {
    format!("{}{}", start, end)
}
