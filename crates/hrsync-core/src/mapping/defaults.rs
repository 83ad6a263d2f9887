//! Baseline field mappings seeded for every tenant

use crate::db::FieldMappingRepository;
use crate::error::Result;
use crate::models::{EntityType, FieldMapping};

/// Install the default mapping set for a tenant.
///
/// Idempotent: any `(entity_type, local_field)` pair that already exists
/// is left untouched, so admin edits survive re-initialization. Returns
/// how many rules were created.
pub async fn seed_defaults<R: FieldMappingRepository>(repo: &R, tenant_id: &str) -> Result<u32> {
    let mut seeded = 0;

    for rule in default_rules(tenant_id) {
        if repo
            .exists(&rule.tenant_id, rule.entity_type, &rule.local_field)
            .await?
        {
            continue;
        }
        repo.save(&rule).await?;
        seeded += 1;
    }

    if seeded > 0 {
        tracing::info!(tenant = tenant_id, seeded, "seeded default field mappings");
    }
    Ok(seeded)
}

fn default_rules(tenant_id: &str) -> Vec<FieldMapping> {
    vec![
        // Employee: local first/last name ⇄ the remote display name
        FieldMapping::new(tenant_id, EntityType::Employee, "name", "name")
            .with_transformer("name_split")
            .required(),
        FieldMapping::new(tenant_id, EntityType::Employee, "email", "work_email"),
        FieldMapping::new(tenant_id, EntityType::Employee, "phone", "mobile_phone"),
        FieldMapping::new(tenant_id, EntityType::Employee, "job_title", "job_title"),
        FieldMapping::new(tenant_id, EntityType::Employee, "active", "active"),
        // Attendance timestamps travel as remote naive-UTC datetimes
        FieldMapping::new(tenant_id, EntityType::Attendance, "check_in", "check_in")
            .with_transformer("datetime")
            .required(),
        FieldMapping::new(tenant_id, EntityType::Attendance, "check_out", "check_out")
            .with_transformer("datetime"),
        // Leave requests
        FieldMapping::new(tenant_id, EntityType::Leave, "date_from", "date_from")
            .with_transformer("datetime")
            .required(),
        FieldMapping::new(tenant_id, EntityType::Leave, "date_to", "date_to")
            .with_transformer("datetime")
            .required(),
        FieldMapping::new(tenant_id, EntityType::Leave, "leave_type_id", "holiday_status_id")
            .required(),
        FieldMapping::new(tenant_id, EntityType::Leave, "notes", "name"),
    ]
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, LibSqlFieldMappingRepository};
    use crate::models::EntityType;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn seeding_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlFieldMappingRepository::new(db.connection());

        let first = seed_defaults(&repo, "t1").await.unwrap();
        assert_eq!(first as usize, default_rules("t1").len());

        let second = seed_defaults(&repo, "t1").await.unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn seeding_preserves_admin_edits() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlFieldMappingRepository::new(db.connection());

        // Admin remapped email before defaults were (re)applied
        let custom = FieldMapping::new("t1", EntityType::Employee, "email", "private_email");
        repo.save(&custom).await.unwrap();

        seed_defaults(&repo, "t1").await.unwrap();

        let rules = repo.list("t1", EntityType::Employee).await.unwrap();
        let email_rule = rules.iter().find(|rule| rule.local_field == "email").unwrap();
        assert_eq!(email_rule.remote_field_path, "private_email");
    }
}
