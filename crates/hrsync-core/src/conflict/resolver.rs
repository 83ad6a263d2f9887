//! Resolution strategies for divergent records

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value as Json};

use crate::db::ConflictRepository;
use crate::error::{Error, Result};
use crate::models::{
    ConflictRecord, ConflictStrategy, EntityType, ResolutionState,
};
use crate::util::now_millis;

/// Field names probed, in order, for a record's modification timestamp.
/// The local system writes `updated_at`; the remote system writes
/// `write_date` and `__last_update`.
const TIMESTAMP_FIELDS: [&str; 4] = ["updated_at", "updatedAt", "write_date", "__last_update"];

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAction {
    /// The local version survives untouched
    KeepLocal,
    /// The remote version overwrites the local one
    KeepOdoo,
    /// A field-by-field merge was produced
    Merged,
    /// Deferred to manual review; the record is left alone
    Skipped,
}

/// The decision taken for a conflicted record.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// What the caller should do with the record
    pub action: ResolutionAction,
    /// Merged record, present only for [`ResolutionAction::Merged`]
    pub merged: Option<Map<String, Json>>,
}

impl Resolution {
    const fn action(action: ResolutionAction) -> Self {
        Self {
            action,
            merged: None,
        }
    }
}

/// Preference for one side of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSide {
    Local,
    Remote,
}

/// Fields where both sides hold a non-null value and the values differ.
///
/// Symmetric: `detect_conflicts(a, b, fields) == detect_conflicts(b, a,
/// fields)`.
#[must_use]
pub fn detect_conflicts(
    local: &Map<String, Json>,
    remote: &Map<String, Json>,
    fields: &[String],
) -> Vec<String> {
    fields
        .iter()
        .filter(|field| {
            let left = local.get(field.as_str()).filter(|v| !v.is_null());
            let right = remote.get(field.as_str()).filter(|v| !v.is_null());
            matches!((left, right), (Some(l), Some(r)) if l != r)
        })
        .cloned()
        .collect()
}

/// Shallow merge of two records.
///
/// Keys with an explicit preference take that side. Without a preference,
/// a remote value only fills a null or absent local value; it never
/// silently overwrites a present local one.
#[must_use]
pub fn merge(
    local: &Map<String, Json>,
    remote: &Map<String, Json>,
    preference: &HashMap<String, MergeSide>,
) -> Map<String, Json> {
    let mut merged = local.clone();

    for (key, remote_value) in remote {
        match preference.get(key) {
            Some(MergeSide::Remote) => {
                merged.insert(key.clone(), remote_value.clone());
            }
            Some(MergeSide::Local) => {}
            None => {
                let local_is_empty = merged.get(key).is_none_or(Json::is_null);
                if local_is_empty && !remote_value.is_null() {
                    merged.insert(key.clone(), remote_value.clone());
                }
            }
        }
    }

    merged
}

/// Applies a resolution strategy to a detected conflict, persisting the
/// record for manual review when the strategy defers.
#[derive(Debug)]
pub struct ConflictResolver<R> {
    conflicts: R,
}

impl<R: ConflictRepository> ConflictResolver<R> {
    /// Create a resolver over the given conflict store.
    pub const fn new(conflicts: R) -> Self {
        Self { conflicts }
    }

    /// Decide which side of a divergent record survives.
    ///
    /// Never fails the sync: `Manual` records the conflict and reports
    /// `Skipped` so the caller moves on to the next record.
    pub async fn resolve(
        &self,
        tenant_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        local: &Map<String, Json>,
        remote: &Map<String, Json>,
        strategy: ConflictStrategy,
    ) -> Result<Resolution> {
        match strategy {
            ConflictStrategy::OdooWins => Ok(Resolution::action(ResolutionAction::KeepOdoo)),
            ConflictStrategy::LocalWins => Ok(Resolution::action(ResolutionAction::KeepLocal)),
            ConflictStrategy::LatestWins => {
                let local_ts = modification_timestamp(local);
                let remote_ts = modification_timestamp(remote);
                // Tie (and both-missing) favors local
                if remote_ts > local_ts {
                    Ok(Resolution::action(ResolutionAction::KeepOdoo))
                } else {
                    Ok(Resolution::action(ResolutionAction::KeepLocal))
                }
            }
            ConflictStrategy::Manual => {
                let record = ConflictRecord::unresolved(
                    tenant_id,
                    entity_type,
                    entity_id,
                    Json::Object(local.clone()),
                    Json::Object(remote.clone()),
                );
                self.conflicts.save(&record).await?;
                tracing::info!(
                    tenant = tenant_id,
                    entity = %entity_type,
                    entity_id,
                    conflict = %record.id,
                    "conflict deferred to manual review"
                );
                Ok(Resolution::action(ResolutionAction::Skipped))
            }
        }
    }

    /// The manual-review action: move a stored conflict out of
    /// `Unresolved`.
    pub async fn resolve_manual(
        &self,
        conflict_id: &str,
        state: ResolutionState,
        resolved_by: &str,
    ) -> Result<ConflictRecord> {
        if state == ResolutionState::Unresolved {
            return Err(Error::InvalidInput(
                "cannot resolve a conflict back to UNRESOLVED".to_string(),
            ));
        }

        let record = self
            .conflicts
            .get(conflict_id)
            .await?
            .ok_or_else(|| Error::NotFound(conflict_id.to_string()))?;

        self.conflicts
            .mark_resolved(conflict_id, state, resolved_by, now_millis())
            .await?;

        self.conflicts
            .get(&record.id)
            .await?
            .ok_or_else(|| Error::NotFound(conflict_id.to_string()))
    }
}

/// Best-effort modification timestamp from the fixed candidate fields.
fn modification_timestamp(record: &Map<String, Json>) -> i64 {
    TIMESTAMP_FIELDS
        .iter()
        .find_map(|field| record.get(*field).and_then(parse_timestamp))
        .unwrap_or(i64::MIN)
}

fn parse_timestamp(value: &Json) -> Option<i64> {
    match value {
        Json::Number(n) => n.as_i64(),
        Json::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.timestamp_millis())
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                    .map(|naive| {
                        DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).timestamp_millis()
                    })
                    .ok()
            }),
        _ => None,
    }
}
