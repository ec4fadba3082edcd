//! Notifier configuration document.
//!
//! ```yaml
//! apiVersion: build-notifiers/v1
//! kind: HTTPNotifier
//! metadata:
//!   name: example-http-notifier
//! spec:
//!   notification:
//!     filter: build.status == Build.Status.SUCCESS
//!     delivery:
//!       url: https://hooks.example.com/$(secrets.hook-token)
//!     template:
//!       type: golang
//!       uri: ./message.tmpl
//!     params:
//!       - name: branch
//!         value: $(build.substitutions.BRANCH_NAME)
//!   secrets:
//!     - name: hook-token
//!       value: HOOK_TOKEN
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Accepted `apiVersion` values.
pub const API_VERSIONS: [&str; 2] = ["build-notifiers/v1", "cloud-build-notifiers/v1"];

/// The only `kind` this crate serves.
pub const KIND: &str = "HTTPNotifier";

/// The only template language.
pub const TEMPLATE_TYPE: &str = "golang";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierConfig {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub spec: NotifierSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierSpec {
    pub notification: Notification,
    #[serde(default)]
    pub secrets: Vec<SecretConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notification {
    /// Filter expression over `build.*` fields.
    #[serde(default)]
    pub filter: String,
    /// Free-form delivery settings. Must carry a string `url`.
    #[serde(default)]
    pub delivery: Map<String, Value>,
    #[serde(default)]
    pub template: Option<TemplateConfig>,
    #[serde(default)]
    pub params: Vec<ParamConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(rename = "type", default = "default_template_type")]
    pub kind: String,
    /// Path of a local template file, relative to the config file.
    #[serde(default)]
    pub uri: Option<String>,
    /// Inline template source.
    #[serde(default)]
    pub content: Option<String>,
}

fn default_template_type() -> String {
    TEMPLATE_TYPE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamConfig {
    pub name: String,
    pub value: String,
}

/// Maps a secret name used in `$(secrets.NAME)` to the reference the
/// secret getter understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretConfig {
    pub name: String,
    pub value: String,
}

impl NotifierConfig {
    /// Parse and validate a YAML (or JSON) document.
    pub fn from_yaml(source: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if !API_VERSIONS.contains(&self.api_version.as_str()) {
            return Err(Error::config(format!(
                "unsupported apiVersion {:?} (expected one of {:?})",
                self.api_version, API_VERSIONS
            )));
        }
        if self.kind != KIND {
            return Err(Error::config(format!(
                "unsupported kind {:?} (expected {KIND:?})",
                self.kind
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for secret in &self.spec.secrets {
            if !seen.insert(secret.name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate secret name {:?}",
                    secret.name
                )));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn filter(&self) -> &str {
        &self.spec.notification.filter
    }

    pub fn params(&self) -> &[ParamConfig] {
        &self.spec.notification.params
    }

    /// The delivery `url` field, which must be a string.
    pub fn delivery_url(&self) -> Result<&str> {
        let delivery = &self.spec.notification.delivery;
        match delivery.get("url") {
            Some(Value::String(url)) => Ok(url),
            _ => Err(Error::config(format!(
                "expected delivery config {} to have string field `url`",
                Value::Object(delivery.clone())
            ))),
        }
    }

    /// Secret-getter reference for the secret named `name`.
    pub fn secret_reference(&self, name: &str) -> Result<&str> {
        self.spec
            .secrets
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.value.as_str())
            .ok_or_else(|| Error::config(format!("no secret named {name:?} in spec.secrets")))
    }

    /// Load the template source, resolving a relative `uri` against
    /// `base_dir` (usually the config file's directory).
    pub fn template_source(&self, base_dir: Option<&Path>) -> Result<String> {
        let template = self
            .spec
            .notification
            .template
            .as_ref()
            .ok_or_else(|| Error::config("missing spec.notification.template"))?;

        if template.kind != TEMPLATE_TYPE {
            return Err(Error::config(format!(
                "unsupported template type {:?} (expected {TEMPLATE_TYPE:?})",
                template.kind
            )));
        }

        match (&template.content, &template.uri) {
            (Some(content), None) => Ok(content.clone()),
            (None, Some(uri)) => {
                let path = template_path(uri, base_dir)?;
                std::fs::read_to_string(&path).map_err(|e| {
                    Error::config(format!("failed to read template {}: {}", path.display(), e))
                })
            }
            (Some(_), Some(_)) => Err(Error::config(
                "template must set exactly one of `content` or `uri`, not both",
            )),
            (None, None) => Err(Error::config("template must set `content` or `uri`")),
        }
    }
}

fn template_path(uri: &str, base_dir: Option<&Path>) -> Result<PathBuf> {
    let raw = uri.strip_prefix("file://").unwrap_or(uri);
    if let Some((scheme, _)) = raw.split_once("://") {
        return Err(Error::config(format!(
            "unsupported template uri scheme {scheme:?}; only local files are supported"
        )));
    }
    let path = PathBuf::from(raw);
    Ok(match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    })
}
