//! The build event model and its filter schema.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use build_filter::{EnumType, FieldType, Record, Schema, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    #[default]
    StatusUnknown,
    Pending,
    Queued,
    Working,
    Success,
    Failure,
    InternalError,
    Timeout,
    Cancelled,
    Expired,
}

impl BuildStatus {
    pub const ALL: [BuildStatus; 10] = [
        Self::StatusUnknown,
        Self::Pending,
        Self::Queued,
        Self::Working,
        Self::Success,
        Self::Failure,
        Self::InternalError,
        Self::Timeout,
        Self::Cancelled,
        Self::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusUnknown => "STATUS_UNKNOWN",
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Working => "WORKING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One build execution, as published by the CI system.
///
/// Deserializes from the CI system's camelCase JSON. Unknown fields are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Build {
    pub id: String,
    pub project_id: String,
    pub status: BuildStatus,
    pub log_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_trigger_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,
    pub substitutions: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,
}

impl Build {
    pub fn new(id: impl Into<String>, status: BuildStatus) -> Self {
        Self {
            id: id.into(),
            status,
            ..Default::default()
        }
    }

    pub fn with_log_url(mut self, log_url: impl Into<String>) -> Self {
        self.log_url = log_url.into();
        self
    }

    pub fn with_substitution(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.substitutions.insert(key.into(), value.into());
        self
    }

    /// Wall-clock run time, when both ends are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finish_time? - self.start_time?)
    }
}

/// Fields a filter expression may reference, rooted at `build`.
///
/// `status` compares against `Build.Status.*` constants; `build_trigger_id`,
/// `status_detail` and `duration_secs` are optional and read as unknown
/// when absent.
pub fn filter_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new()
            .with_root("build")
            .field("id", FieldType::String)
            .field("project_id", FieldType::String)
            .field(
                "status",
                FieldType::Enum(EnumType::new(
                    "Build.Status",
                    BuildStatus::ALL.iter().map(BuildStatus::as_str),
                )),
            )
            .field("log_url", FieldType::String)
            .field("build_trigger_id", FieldType::String)
            .field("status_detail", FieldType::String)
            .field("substitutions", FieldType::StringMap)
            .field("tags", FieldType::StringList)
            .field("images", FieldType::StringList)
            .field("duration_secs", FieldType::Int)
    })
}

fn string_list(items: &[String]) -> Value {
    Value::List(items.iter().map(|s| Value::from(s.as_str())).collect())
}

impl Record for Build {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::from(self.id.as_str())),
            "project_id" => Some(Value::from(self.project_id.as_str())),
            "status" => Some(Value::from(self.status.as_str())),
            "log_url" => Some(Value::from(self.log_url.as_str())),
            "build_trigger_id" => self.build_trigger_id.as_deref().map(Value::from),
            "status_detail" => self.status_detail.as_deref().map(Value::from),
            "substitutions" => Some(Value::Map(
                self.substitutions
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                    .collect(),
            )),
            "tags" => Some(string_list(&self.tags)),
            "images" => Some(string_list(&self.images)),
            "duration_secs" => self.duration().map(|d| Value::Int(d.num_seconds())),
            _ => None,
        }
    }
}
