//! Conflict records and resolution strategies

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::EntityType;
use crate::error::Error;
use crate::util::{new_id, now_millis};

/// How divergent records are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictStrategy {
    /// Remote value wins on every divergent field
    OdooWins,
    /// Local value wins on every divergent field
    LocalWins,
    /// The side with the newer modification timestamp wins; tie favors local
    LatestWins,
    /// Defer to a human: record the conflict, skip the record
    Manual,
}

impl ConflictStrategy {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OdooWins => "ODOO_WINS",
            Self::LocalWins => "LOCAL_WINS",
            Self::LatestWins => "LATEST_WINS",
            Self::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ODOO_WINS" => Ok(Self::OdooWins),
            "LOCAL_WINS" => Ok(Self::LocalWins),
            "LATEST_WINS" => Ok(Self::LatestWins),
            "MANUAL" => Ok(Self::Manual),
            other => Err(Error::InvalidInput(format!(
                "unknown conflict strategy: {other}"
            ))),
        }
    }
}

/// What kind of disagreement was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    /// Both sides edited overlapping fields
    FieldDivergence,
    /// The record exists locally but not remotely
    MissingRemote,
    /// The record exists remotely but not locally
    MissingLocal,
}

impl ConflictKind {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FieldDivergence => "FIELD_DIVERGENCE",
            Self::MissingRemote => "MISSING_REMOTE",
            Self::MissingLocal => "MISSING_LOCAL",
        }
    }
}

impl FromStr for ConflictKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FIELD_DIVERGENCE" => Ok(Self::FieldDivergence),
            "MISSING_REMOTE" => Ok(Self::MissingRemote),
            "MISSING_LOCAL" => Ok(Self::MissingLocal),
            other => Err(Error::InvalidInput(format!("unknown conflict kind: {other}"))),
        }
    }
}

/// Outcome a conflict ends in, persisted for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionState {
    Unresolved,
    KeepLocal,
    KeepOdoo,
    Merged,
    Skipped,
}

impl ResolutionState {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unresolved => "UNRESOLVED",
            Self::KeepLocal => "KEEP_LOCAL",
            Self::KeepOdoo => "KEEP_ODOO",
            Self::Merged => "MERGED",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl FromStr for ResolutionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNRESOLVED" => Ok(Self::Unresolved),
            "KEEP_LOCAL" => Ok(Self::KeepLocal),
            "KEEP_ODOO" => Ok(Self::KeepOdoo),
            "MERGED" => Ok(Self::Merged),
            "SKIPPED" => Ok(Self::Skipped),
            other => Err(Error::InvalidInput(format!(
                "unknown resolution state: {other}"
            ))),
        }
    }
}

/// A recorded disagreement between the local and remote version of one
/// entity, held for manual review. Rows are never deleted automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Row identifier
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Entity type the conflict belongs to
    pub entity_type: EntityType,
    /// Local id of the conflicted record
    pub entity_id: String,
    /// Local version at detection time
    pub local_snapshot: serde_json::Value,
    /// Remote version at detection time
    pub remote_snapshot: serde_json::Value,
    /// Kind of disagreement
    pub conflict_kind: ConflictKind,
    /// Current resolution outcome
    pub resolution_state: ResolutionState,
    /// Who resolved it, once resolved
    pub resolved_by: Option<String>,
    /// When it was resolved (unix ms)
    pub resolved_at: Option<i64>,
    /// When it was detected (unix ms)
    pub created_at: i64,
}

impl ConflictRecord {
    /// Create an unresolved conflict record from the two snapshots.
    #[must_use]
    pub fn unresolved(
        tenant_id: impl Into<String>,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        local_snapshot: serde_json::Value,
        remote_snapshot: serde_json::Value,
    ) -> Self {
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            entity_type,
            entity_id: entity_id.into(),
            local_snapshot,
            remote_snapshot,
            conflict_kind: ConflictKind::FieldDivergence,
            resolution_state: ResolutionState::Unresolved,
            resolved_by: None,
            resolved_at: None,
            created_at: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_round_trips_through_str() {
        for strategy in [
            ConflictStrategy::OdooWins,
            ConflictStrategy::LocalWins,
            ConflictStrategy::LatestWins,
            ConflictStrategy::Manual,
        ] {
            assert_eq!(
                strategy.as_str().parse::<ConflictStrategy>().unwrap(),
                strategy
            );
        }
    }

    #[test]
    fn unresolved_record_starts_open() {
        let record = ConflictRecord::unresolved(
            "t1",
            EntityType::Employee,
            "emp-1",
            serde_json::json!({"name": "A"}),
            serde_json::json!({"name": "B"}),
        );
        assert_eq!(record.resolution_state, ResolutionState::Unresolved);
        assert!(record.resolved_at.is_none());
    }
}
