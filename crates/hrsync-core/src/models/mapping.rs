//! Entity and field mapping models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::util::{new_id, now_millis};

/// Kind of synchronized entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Employee,
    Attendance,
    Leave,
    Payroll,
}

impl EntityType {
    /// Stable string form used in storage and payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Attendance => "attendance",
            Self::Leave => "leave",
            Self::Payroll => "payroll",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employee" => Ok(Self::Employee),
            "attendance" => Ok(Self::Attendance),
            "leave" => Ok(Self::Leave),
            "payroll" => Ok(Self::Payroll),
            other => Err(Error::InvalidInput(format!("unknown entity type: {other}"))),
        }
    }
}

/// Local-id ⇄ remote-id correspondence for one synchronized record.
///
/// Unique per `(tenant_id, local_id)` and per `(tenant_id, remote_id)`;
/// the store enforces both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMapping {
    /// Row identifier
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Kind of entity this mapping links
    pub entity_type: EntityType,
    /// Local record id
    pub local_id: String,
    /// Remote record id
    pub remote_id: i64,
    /// Creation timestamp (unix ms)
    pub created_at: i64,
    /// Last successful sync touching this record (unix ms)
    pub last_synced_at: Option<i64>,
}

impl EntityMapping {
    /// Create a new link between a local and a remote record.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        entity_type: EntityType,
        local_id: impl Into<String>,
        remote_id: i64,
    ) -> Self {
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            entity_type,
            local_id: local_id.into(),
            remote_id,
            created_at: now_millis(),
            last_synced_at: None,
        }
    }
}

/// Declarative rule translating one local field to one remote field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Row identifier
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Entity type the rule applies to
    pub entity_type: EntityType,
    /// Field name in the local record
    pub local_field: String,
    /// Dotted path into the remote field tree
    pub remote_field_path: String,
    /// Named value transformer, if any
    pub transformer: Option<String>,
    /// Transformer configuration (e.g. enum lookup table)
    pub transformer_config: Option<serde_json::Value>,
    /// A missing value is an error instead of a skip
    pub is_required: bool,
    /// Inactive rules are ignored by the mapper
    pub is_active: bool,
}

impl FieldMapping {
    /// Create an active, optional mapping rule.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        entity_type: EntityType,
        local_field: impl Into<String>,
        remote_field_path: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            entity_type,
            local_field: local_field.into(),
            remote_field_path: remote_field_path.into(),
            transformer: None,
            transformer_config: None,
            is_required: false,
            is_active: true,
        }
    }

    /// Attach a named transformer.
    #[must_use]
    pub fn with_transformer(mut self, name: impl Into<String>) -> Self {
        self.transformer = Some(name.into());
        self
    }

    /// Attach a transformer configuration.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.transformer_config = Some(config);
        self
    }

    /// Mark the rule as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.is_required = true;
        self
    }
}
