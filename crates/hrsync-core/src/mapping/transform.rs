//! Named, direction-aware value transformers
//!
//! Transformers are pure: they never fail, and an unparseable or
//! unexpected input passes through unchanged so a bad value surfaces in
//! the target system instead of silently vanishing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as Json;

/// Which way a transformer is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local value → remote representation
    ToRemote,
    /// Remote value → local representation
    ToLocal,
}

const REMOTE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const REMOTE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Apply the named transformer to a value.
///
/// An unknown transformer name is treated as the identity transform; the
/// rule still moves the value, it just doesn't reshape it.
#[must_use]
pub fn apply_transform(
    name: &str,
    config: Option<&Json>,
    direction: Direction,
    value: Json,
) -> Json {
    match name {
        "datetime" => datetime(direction, value),
        "date" => date(direction, value),
        "name_split" => name_split(direction, value),
        "enum_map" => enum_map(config, direction, value),
        other => {
            tracing::warn!(transformer = other, "unknown transformer, passing value through");
            value
        }
    }
}

/// RFC3339 ⇄ `YYYY-MM-DD HH:MM:SS` (remote datetimes are naive UTC).
fn datetime(direction: Direction, value: Json) -> Json {
    let Json::String(text) = &value else {
        return value;
    };

    match direction {
        Direction::ToRemote => DateTime::parse_from_rfc3339(text).map_or(value, |parsed| {
            Json::String(
                parsed
                    .with_timezone(&Utc)
                    .format(REMOTE_DATETIME_FORMAT)
                    .to_string(),
            )
        }),
        Direction::ToLocal => NaiveDateTime::parse_from_str(text, REMOTE_DATETIME_FORMAT)
            .map_or(value, |naive| {
                Json::String(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).to_rfc3339())
            }),
    }
}

/// RFC3339 or ISO date ⇄ `YYYY-MM-DD`.
fn date(direction: Direction, value: Json) -> Json {
    let Json::String(text) = &value else {
        return value;
    };

    match direction {
        Direction::ToRemote => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Json::String(parsed.date_naive().format(REMOTE_DATE_FORMAT).to_string());
            }
            NaiveDate::parse_from_str(text, REMOTE_DATE_FORMAT)
                .map_or(value, |d| Json::String(d.format(REMOTE_DATE_FORMAT).to_string()))
        }
        // Remote dates are already plain ISO dates
        Direction::ToLocal => value,
    }
}

/// Single display name ⇄ `{first_name, last_name}`, split on the first
/// space. A missing remainder repeats the first part, matching the remote
/// system's own convention for single-word names.
fn name_split(direction: Direction, value: Json) -> Json {
    match direction {
        Direction::ToLocal => {
            let Json::String(full) = &value else {
                return value;
            };
            let trimmed = full.trim();
            let (first, rest) = trimmed
                .split_once(' ')
                .map_or((trimmed, None), |(first, rest)| (first, Some(rest.trim())));
            let last = rest.filter(|r| !r.is_empty()).unwrap_or(first);
            serde_json::json!({ "first_name": first, "last_name": last })
        }
        Direction::ToRemote => {
            let Json::Object(parts) = &value else {
                return value;
            };
            let first = parts.get("first_name").and_then(Json::as_str).unwrap_or("");
            let last = parts.get("last_name").and_then(Json::as_str).unwrap_or("");
            Json::String(format!("{first} {last}").trim().to_string())
        }
    }
}

/// Config-driven bidirectional lookup; unknown values pass through.
fn enum_map(config: Option<&Json>, direction: Direction, value: Json) -> Json {
    let Some(Json::Object(table)) = config else {
        return value;
    };
    let Json::String(key) = &value else {
        return value;
    };

    match direction {
        Direction::ToRemote => table.get(key).cloned().unwrap_or(value),
        Direction::ToLocal => table
            .iter()
            .find(|(_, mapped)| mapped.as_str() == Some(key))
            .map_or(value, |(local, _)| Json::String(local.clone())),
    }
}
