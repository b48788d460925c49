// Persisted record codec for the task list and theme keys

use crate::models::{Task, Theme};
use eyre::{Context, Result, eyre};
use std::collections::HashSet;

/// Backend key holding the serialized task list
pub const TASKS_KEY: &str = "tasks";

/// Backend key holding the theme preference
pub const THEME_KEY: &str = "theme";

/// Serialize the full task list as a JSON array of records
pub fn encode_tasks(tasks: &[Task]) -> Result<String> {
    serde_json::to_string(tasks).context("Failed to serialize tasks")
}

/// Parse a stored task list
///
/// Any malformed record, blank text or duplicate id fails the whole decode;
/// partial lists are never returned.
pub fn decode_tasks(raw: &str) -> Result<Vec<Task>> {
    let tasks: Vec<Task> = serde_json::from_str(raw).context("Failed to deserialize stored tasks")?;

    let mut seen = HashSet::with_capacity(tasks.len());
    for (index, task) in tasks.iter().enumerate() {
        if task.text.trim().is_empty() {
            return Err(eyre!("Stored task at index {} has empty text", index));
        }
        if !seen.insert(task.id.as_str()) {
            return Err(eyre!("Duplicate task id in stored tasks: {}", task.id));
        }
    }

    Ok(tasks)
}

pub fn encode_theme(theme: Theme) -> String {
    theme.as_str().to_string()
}

pub fn decode_theme(raw: &str) -> Result<Theme> {
    raw.parse::<Theme>().map_err(|e| eyre!(e))
}

/// Ids are written as strings; older records may carry a numeric id such as
/// a creation timestamp, which is read back as its decimal string.
pub mod task_id {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => n.to_string(),
            RawId::Text(text) => text,
        })
    }
}

/// Timestamps are written as RFC 3339 strings. Reading also accepts epoch
/// milliseconds, either as a JSON number or a numeric string.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    pub(super) fn parse(raw: RawTimestamp) -> Result<DateTime<Utc>, String> {
        match raw {
            RawTimestamp::Millis(ms) => from_millis(ms),
            RawTimestamp::Text(text) => {
                let text = text.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                    return Ok(dt.with_timezone(&Utc));
                }
                match text.parse::<i64>() {
                    Ok(ms) => from_millis(ms),
                    Err(_) => Err(format!("invalid timestamp: {:?}", text)),
                }
            }
        }
    }

    fn from_millis(ms: i64) -> Result<DateTime<Utc>, String> {
        DateTime::from_timestamp_millis(ms).ok_or_else(|| format!("timestamp out of range: {}", ms))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = RawTimestamp::deserialize(deserializer)?;
        parse(raw).map_err(de::Error::custom)
    }
}

/// Optional variant of [`timestamp`]; `null` and a missing field both mean `None`
pub mod timestamp_opt {
    use super::timestamp::{RawTimestamp, parse};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => super::timestamp::serialize(dt, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<RawTimestamp>::deserialize(deserializer)? {
            Some(raw) => parse(raw).map(Some).map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}
