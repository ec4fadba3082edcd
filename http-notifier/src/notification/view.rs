//! Data exposed to message templates.
//!
//! Templates address fields in PascalCase: `{{.Build.Id}}`,
//! `{{.Build.LogUrl}}`, `{{.Params.branch}}`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bindings::Bindings;
use crate::build::{Build, BuildStatus};

/// Root object a template renders against. Built per event and dropped
/// after rendering.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateView<'a> {
    pub build: BuildView<'a>,
    pub params: &'a Bindings,
}

impl<'a> TemplateView<'a> {
    pub fn new(build: &'a Build, params: &'a Bindings) -> Self {
        Self {
            build: BuildView::from(build),
            params,
        }
    }
}

/// Borrowed view of a [`Build`]. Absent optional fields render as empty
/// text rather than failing the template.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuildView<'a> {
    pub id: &'a str,
    pub project_id: &'a str,
    pub status: BuildStatus,
    pub log_url: &'a str,
    pub build_trigger_id: Option<&'a str>,
    pub status_detail: Option<&'a str>,
    pub substitutions: &'a BTreeMap<String, String>,
    pub tags: &'a [String],
    pub images: &'a [String],
    pub create_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    /// Whole seconds between start and finish.
    pub duration: Option<i64>,
}

impl<'a> From<&'a Build> for BuildView<'a> {
    fn from(build: &'a Build) -> Self {
        Self {
            id: &build.id,
            project_id: &build.project_id,
            status: build.status,
            log_url: &build.log_url,
            build_trigger_id: build.build_trigger_id.as_deref(),
            status_detail: build.status_detail.as_deref(),
            substitutions: &build.substitutions,
            tags: &build.tags,
            images: &build.images,
            create_time: build.create_time,
            start_time: build.start_time,
            finish_time: build.finish_time,
            duration: build.duration().map(|d| d.num_seconds()),
        }
    }
}
