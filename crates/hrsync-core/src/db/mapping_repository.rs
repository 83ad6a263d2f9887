//! Entity and field mapping repository implementations

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{EntityMapping, EntityType, FieldMapping};

use super::{opt_int, opt_text};

/// Trait for entity mapping storage operations
#[allow(async_fn_in_trait)]
pub trait EntityMappingRepository {
    /// Upsert a mapping keyed by `(tenant, entity_type, local_id)`.
    ///
    /// The store's uniqueness constraint on the remote id rejects a save
    /// that would link one remote record to two local ones.
    async fn save(&self, mapping: &EntityMapping) -> Result<()>;

    /// Look up the mapping for a local record
    async fn find_by_local(
        &self,
        tenant_id: &str,
        entity_type: EntityType,
        local_id: &str,
    ) -> Result<Option<EntityMapping>>;

    /// Look up the mapping for a remote record
    async fn find_by_remote(
        &self,
        tenant_id: &str,
        entity_type: EntityType,
        remote_id: i64,
    ) -> Result<Option<EntityMapping>>;

    /// All mappings of one entity type for a tenant
    async fn list(&self, tenant_id: &str, entity_type: EntityType) -> Result<Vec<EntityMapping>>;

    /// Unlink a local record
    async fn delete_by_local(
        &self,
        tenant_id: &str,
        entity_type: EntityType,
        local_id: &str,
    ) -> Result<()>;

    /// Drop every mapping for a tenant (disconnect)
    async fn delete_all(&self, tenant_id: &str) -> Result<()>;

    /// Stamp a mapping's last successful sync
    async fn touch(&self, id: &str, at: i64) -> Result<()>;
}

/// libSQL implementation of `EntityMappingRepository`
pub struct LibSqlEntityMappingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntityMappingRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_mapping(row: &libsql::Row) -> Result<EntityMapping> {
        Ok(EntityMapping {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            entity_type: row.get::<String>(2)?.parse()?,
            local_id: row.get(3)?,
            remote_id: row.get(4)?,
            created_at: row.get(5)?,
            last_synced_at: row.get::<Option<i64>>(6)?,
        })
    }
}

const MAPPING_COLUMNS: &str =
    "id, tenant_id, entity_type, local_id, remote_id, created_at, last_synced_at";

impl EntityMappingRepository for LibSqlEntityMappingRepository<'_> {
    async fn save(&self, mapping: &EntityMapping) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO entity_mappings (id, tenant_id, entity_type, local_id, remote_id, \
                 created_at, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(tenant_id, entity_type, local_id) DO UPDATE SET
                    remote_id = excluded.remote_id,
                    last_synced_at = excluded.last_synced_at",
                params![
                    mapping.id.as_str(),
                    mapping.tenant_id.as_str(),
                    mapping.entity_type.as_str(),
                    mapping.local_id.as_str(),
                    mapping.remote_id,
                    mapping.created_at,
                    opt_int(mapping.last_synced_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn find_by_local(
        &self,
        tenant_id: &str,
        entity_type: EntityType,
        local_id: &str,
    ) -> Result<Option<EntityMapping>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MAPPING_COLUMNS} FROM entity_mappings
                     WHERE tenant_id = ? AND entity_type = ? AND local_id = ?"
                ),
                params![tenant_id, entity_type.as_str(), local_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_mapping(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_by_remote(
        &self,
        tenant_id: &str,
        entity_type: EntityType,
        remote_id: i64,
    ) -> Result<Option<EntityMapping>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MAPPING_COLUMNS} FROM entity_mappings
                     WHERE tenant_id = ? AND entity_type = ? AND remote_id = ?"
                ),
                params![tenant_id, entity_type.as_str(), remote_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_mapping(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, tenant_id: &str, entity_type: EntityType) -> Result<Vec<EntityMapping>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MAPPING_COLUMNS} FROM entity_mappings
                     WHERE tenant_id = ? AND entity_type = ?
                     ORDER BY created_at ASC"
                ),
                params![tenant_id, entity_type.as_str()],
            )
            .await?;

        let mut mappings = Vec::new();
        while let Some(row) = rows.next().await? {
            mappings.push(Self::parse_mapping(&row)?);
        }
        Ok(mappings)
    }

    async fn delete_by_local(
        &self,
        tenant_id: &str,
        entity_type: EntityType,
        local_id: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM entity_mappings
                 WHERE tenant_id = ? AND entity_type = ? AND local_id = ?",
                params![tenant_id, entity_type.as_str(), local_id],
            )
            .await?;
        Ok(())
    }

    async fn delete_all(&self, tenant_id: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM entity_mappings WHERE tenant_id = ?",
                params![tenant_id],
            )
            .await?;
        Ok(())
    }

    async fn touch(&self, id: &str, at: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE entity_mappings SET last_synced_at = ? WHERE id = ?",
                params![at, id],
            )
            .await?;
        Ok(())
    }
}

/// Trait for field mapping storage operations
#[allow(async_fn_in_trait)]
pub trait FieldMappingRepository {
    /// Upsert a rule keyed by `(tenant, entity_type, local_field)`
    async fn save(&self, rule: &FieldMapping) -> Result<()>;

    /// Active and inactive rules for one entity type
    async fn list(&self, tenant_id: &str, entity_type: EntityType) -> Result<Vec<FieldMapping>>;

    /// Whether a rule already exists for the local field
    async fn exists(
        &self,
        tenant_id: &str,
        entity_type: EntityType,
        local_field: &str,
    ) -> Result<bool>;

    /// Toggle a rule without deleting it
    async fn set_active(&self, id: &str, active: bool) -> Result<()>;
}

/// libSQL implementation of `FieldMappingRepository`
pub struct LibSqlFieldMappingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlFieldMappingRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_rule(row: &libsql::Row) -> Result<FieldMapping> {
        let transformer_config = row
            .get::<Option<String>>(6)?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?;

        Ok(FieldMapping {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            entity_type: row.get::<String>(2)?.parse()?,
            local_field: row.get(3)?,
            remote_field_path: row.get(4)?,
            transformer: row.get::<Option<String>>(5)?,
            transformer_config,
            is_required: row.get::<i64>(7)? != 0,
            is_active: row.get::<i64>(8)? != 0,
        })
    }
}

impl FieldMappingRepository for LibSqlFieldMappingRepository<'_> {
    async fn save(&self, rule: &FieldMapping) -> Result<()> {
        let config = rule
            .transformer_config
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO field_mappings (id, tenant_id, entity_type, local_field, \
                 remote_field_path, transformer, transformer_config, is_required, is_active)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(tenant_id, entity_type, local_field) DO UPDATE SET
                    remote_field_path = excluded.remote_field_path,
                    transformer = excluded.transformer,
                    transformer_config = excluded.transformer_config,
                    is_required = excluded.is_required,
                    is_active = excluded.is_active",
                params![
                    rule.id.as_str(),
                    rule.tenant_id.as_str(),
                    rule.entity_type.as_str(),
                    rule.local_field.as_str(),
                    rule.remote_field_path.as_str(),
                    opt_text(rule.transformer.as_deref()),
                    opt_text(config.as_deref()),
                    i64::from(rule.is_required),
                    i64::from(rule.is_active),
                ],
            )
            .await?;
        Ok(())
    }

    async fn list(&self, tenant_id: &str, entity_type: EntityType) -> Result<Vec<FieldMapping>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tenant_id, entity_type, local_field, remote_field_path, transformer, \
                 transformer_config, is_required, is_active
                 FROM field_mappings
                 WHERE tenant_id = ? AND entity_type = ?
                 ORDER BY local_field ASC",
                params![tenant_id, entity_type.as_str()],
            )
            .await?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            rules.push(Self::parse_rule(&row)?);
        }
        Ok(rules)
    }

    async fn exists(
        &self,
        tenant_id: &str,
        entity_type: EntityType,
        local_field: &str,
    ) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM field_mappings
                 WHERE tenant_id = ? AND entity_type = ? AND local_field = ?",
                params![tenant_id, entity_type.as_str(), local_field],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<()> {
        self.conn
            .execute(
                "UPDATE field_mappings SET is_active = ? WHERE id = ?",
                params![i64::from(active), id],
            )
            .await?;
        Ok(())
    }
}
