//! Per-tenant bidirectional field mapper

use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};
use crate::models::{EntityType, FieldMapping};

use super::transform::{apply_transform, Direction};

/// Translates one entity type's records between the local field names and
/// the remote dotted field paths, using the tenant's active mapping rules.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    entity_type: EntityType,
    mappings: Vec<FieldMapping>,
}

impl FieldMapper {
    /// Build a mapper from a tenant's rules, keeping only active rules
    /// for the given entity type.
    #[must_use]
    pub fn new(entity_type: EntityType, mappings: Vec<FieldMapping>) -> Self {
        let mappings = mappings
            .into_iter()
            .filter(|rule| rule.is_active && rule.entity_type == entity_type)
            .collect();
        Self {
            entity_type,
            mappings,
        }
    }

    /// Entity type this mapper serves.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Convert a local record into a remote field tree.
    ///
    /// Absent or null local fields are skipped unless the rule is marked
    /// required, in which case the record cannot be mapped at all.
    pub fn to_remote(&self, local: &Map<String, Json>) -> Result<Json> {
        let mut tree = Json::Object(Map::new());

        for rule in &self.mappings {
            let value = local.get(&rule.local_field).filter(|v| !v.is_null());
            let Some(value) = value else {
                if rule.is_required {
                    return Err(self.gap(&rule.local_field));
                }
                continue;
            };

            let value = Self::transformed(rule, Direction::ToRemote, value.clone());
            write_path(&mut tree, &rule.remote_field_path, value);
        }

        Ok(tree)
    }

    /// Convert a remote field tree into a local record.
    pub fn to_local(&self, remote: &Json) -> Result<Map<String, Json>> {
        let mut local = Map::new();

        for rule in &self.mappings {
            let value = read_path(remote, &rule.remote_field_path).filter(|v| !v.is_null());
            let Some(value) = value else {
                if rule.is_required {
                    return Err(self.gap(&rule.local_field));
                }
                continue;
            };

            let value = Self::transformed(rule, Direction::ToLocal, value.clone());
            local.insert(rule.local_field.clone(), value);
        }

        Ok(local)
    }

    fn transformed(rule: &FieldMapping, direction: Direction, value: Json) -> Json {
        match rule.transformer.as_deref() {
            Some(name) => {
                apply_transform(name, rule.transformer_config.as_ref(), direction, value)
            }
            None => value,
        }
    }

    fn gap(&self, field: &str) -> Error {
        Error::MappingGap {
            entity_type: self.entity_type.as_str().to_string(),
            field: field.to_string(),
        }
    }
}

/// Write `value` into `tree` at a dotted path, creating intermediate
/// objects as needed. Non-object intermediates are replaced.
pub fn write_path(tree: &mut Json, path: &str, value: Json) {
    let mut current = tree;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Json::Object(Map::new());
        }
        let map = current.as_object_mut().expect("just ensured object");

        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }

        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Json::Object(Map::new()));
    }
}

/// Read the value at a dotted path, if every segment exists.
#[must_use]
pub fn read_path<'a>(tree: &'a Json, path: &str) -> Option<&'a Json> {
    let mut current = tree;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn local_map(json: Json) -> Map<String, Json> {
        json.as_object().cloned().unwrap()
    }

    fn employee_rules() -> Vec<FieldMapping> {
        vec![
            FieldMapping::new("t1", EntityType::Employee, "email", "work_email").required(),
            FieldMapping::new("t1", EntityType::Employee, "phone", "mobile_phone"),
            FieldMapping::new("t1", EntityType::Employee, "name", "name")
                .with_transformer("name_split"),
            FieldMapping::new("t1", EntityType::Employee, "cost_center", "company.cost_center"),
        ]
    }

    #[test]
    fn to_remote_maps_and_nests() {
        let mapper = FieldMapper::new(EntityType::Employee, employee_rules());
        let local = local_map(json!({
            "email": "ali@example.com",
            "phone": "123",
            "name": {"first_name": "Ali", "last_name": "Baba"},
            "cost_center": "CC-7"
        }));

        let remote = mapper.to_remote(&local).unwrap();
        assert_eq!(
            remote,
            json!({
                "work_email": "ali@example.com",
                "mobile_phone": "123",
                "name": "Ali Baba",
                "company": {"cost_center": "CC-7"}
            })
        );
    }

    #[test]
    fn to_remote_skips_null_and_absent_optionals() {
        let mapper = FieldMapper::new(EntityType::Employee, employee_rules());
        let local = local_map(json!({"email": "ali@example.com", "phone": null}));

        let remote = mapper.to_remote(&local).unwrap();
        assert_eq!(remote, json!({"work_email": "ali@example.com"}));
    }

    #[test]
    fn to_remote_rejects_missing_required_field() {
        let mapper = FieldMapper::new(EntityType::Employee, employee_rules());
        let local = local_map(json!({"phone": "123"}));

        let error = mapper.to_remote(&local).unwrap_err();
        assert!(matches!(error, Error::MappingGap { .. }));
    }

    #[test]
    fn to_local_reads_dotted_paths() {
        let mapper = FieldMapper::new(EntityType::Employee, employee_rules());
        let remote = json!({
            "work_email": "ali@example.com",
            "name": "Ali Baba",
            "company": {"cost_center": "CC-7"}
        });

        let local = mapper.to_local(&remote).unwrap();
        assert_eq!(
            Json::Object(local),
            json!({
                "email": "ali@example.com",
                "name": {"first_name": "Ali", "last_name": "Baba"},
                "cost_center": "CC-7"
            })
        );
    }

    #[test]
    fn inactive_rules_are_ignored() {
        let mut rules = employee_rules();
        for rule in &mut rules {
            rule.is_active = false;
        }
        let mapper = FieldMapper::new(EntityType::Employee, rules);
        let local = local_map(json!({"email": "ali@example.com"}));

        // The required rule is inactive, so nothing maps and nothing fails.
        assert_eq!(mapper.to_remote(&local).unwrap(), json!({}));
    }

    #[test]
    fn rules_for_other_entities_are_filtered_out() {
        let mut rules = employee_rules();
        rules.push(FieldMapping::new(
            "t1",
            EntityType::Attendance,
            "check_in",
            "check_in",
        ));
        let mapper = FieldMapper::new(EntityType::Employee, rules);
        let local = local_map(json!({"email": "a@b.c", "check_in": "x"}));

        let remote = mapper.to_remote(&local).unwrap();
        assert_eq!(read_path(&remote, "check_in"), None);
    }

    #[test]
    fn write_path_replaces_non_object_intermediates() {
        let mut tree = json!({"company": 3});
        write_path(&mut tree, "company.cost_center", json!("CC-1"));
        assert_eq!(tree, json!({"company": {"cost_center": "CC-1"}}));
    }
}
