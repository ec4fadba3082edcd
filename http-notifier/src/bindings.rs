//! Template parameter resolution and secret access.
//!
//! Parameter values and the delivery URL may interpolate references of the
//! form `$(build.FIELD)`, `$(build.substitutions.KEY)` and
//! `$(secrets.NAME)`. References are parsed once at setup; secrets are
//! fetched once at setup, so handling an event never touches the secret
//! store.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::build::Build;
use crate::config::{NotifierConfig, ParamConfig};
use crate::context::RequestContext;
use crate::{Error, Result};

/// Parameter name to resolved value.
pub type Bindings = HashMap<String, String>;

/// Resolves the `Params` a template sees for one event.
#[async_trait]
pub trait BindingResolver: Send + Sync {
    /// `additional` entries take precedence over configured ones.
    async fn resolve(
        &self,
        ctx: &RequestContext,
        additional: Option<&Bindings>,
        build: &Build,
    ) -> Result<Bindings>;
}

/// Reads a secret by reference.
#[async_trait]
pub trait SecretGetter: Send + Sync {
    async fn get_secret(&self, reference: &str) -> Result<String>;
}

/// Treats each reference as the name of an environment variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretGetter;

#[async_trait]
impl SecretGetter for EnvSecretGetter {
    async fn get_secret(&self, reference: &str) -> Result<String> {
        std::env::var(reference).map_err(|e| {
            Error::config(format!("failed to read secret from ${reference}: {e}"))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BuildRef {
    Id,
    ProjectId,
    Status,
    LogUrl,
    BuildTriggerId,
    StatusDetail,
    Substitution(String),
}

impl BuildRef {
    fn parse(path: &str) -> Option<Self> {
        Some(match path {
            "id" => Self::Id,
            "project_id" => Self::ProjectId,
            "status" => Self::Status,
            "log_url" => Self::LogUrl,
            "build_trigger_id" => Self::BuildTriggerId,
            "status_detail" => Self::StatusDetail,
            _ => {
                let key = path.strip_prefix("substitutions.")?;
                if key.is_empty() {
                    return None;
                }
                Self::Substitution(key.to_string())
            }
        })
    }

    fn lookup(&self, build: &Build) -> Option<String> {
        match self {
            Self::Id => Some(build.id.clone()),
            Self::ProjectId => Some(build.project_id.clone()),
            Self::Status => Some(build.status.to_string()),
            Self::LogUrl => Some(build.log_url.clone()),
            Self::BuildTriggerId => build.build_trigger_id.clone(),
            Self::StatusDetail => build.status_detail.clone(),
            Self::Substitution(key) => build.substitutions.get(key).cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Build(BuildRef),
    Secret(String),
}

/// A string with `$(...)` references, parsed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpolated {
    source: String,
    segments: Vec<Segment>,
}

impl Interpolated {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("$(") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find(')').ok_or_else(|| {
                Error::config(format!("unterminated reference in {source:?}"))
            })?;
            let reference = after[..end].trim();
            let segment = if let Some(path) = reference.strip_prefix("build.") {
                BuildRef::parse(path).map(Segment::Build)
            } else if let Some(name) = reference.strip_prefix("secrets.") {
                (!name.is_empty()).then(|| Segment::Secret(name.to_string()))
            } else {
                None
            };
            segments.push(segment.ok_or_else(|| {
                Error::config(format!("unknown reference $({reference}) in {source:?}"))
            })?);
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn secret_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Secret(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn references_build(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Build(_)))
    }

    /// Substitute every reference. `build` may be `None` only when the
    /// string has no build references.
    pub fn render(&self, build: Option<&Build>, secrets: &Secrets) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Secret(name) => out.push_str(secrets.get(name).ok_or_else(|| {
                    Error::binding(format!("secret {name:?} was not loaded"))
                })?),
                Segment::Build(reference) => {
                    let value = build.and_then(|b| reference.lookup(b)).ok_or_else(|| {
                        Error::binding(format!(
                            "build has no value for {reference:?} in {:?}",
                            self.source
                        ))
                    })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

/// Secret values loaded at setup. `Debug` never prints values.
#[derive(Clone, Default)]
pub struct Secrets {
    values: HashMap<String, String>,
}

impl Secrets {
    /// Fetch every secret in `names` through `getter`, using the references
    /// declared in the config's `secrets` list.
    pub async fn load<'a>(
        ctx: &RequestContext,
        config: &NotifierConfig,
        getter: &dyn SecretGetter,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let mut values = HashMap::new();
        for name in names.into_iter().collect::<BTreeSet<_>>() {
            let reference = config.secret_reference(name)?;
            let value = ctx.run(getter.get_secret(reference)).await??;
            debug!(secret = %name, "loaded secret");
            values.insert(name.to_string(), value);
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Resolves the config's `params` list against each build.
#[derive(Debug, Clone, Default)]
pub struct ParamsBindingResolver {
    params: Vec<(String, Interpolated)>,
    secrets: Secrets,
}

impl ParamsBindingResolver {
    /// Parse params without secret support. A `$(secrets.*)` reference is a
    /// configuration error.
    pub fn new(params: &[ParamConfig]) -> Result<Self> {
        let resolver = Self::parse(params)?;
        if let Some(name) = resolver.secret_names().next() {
            return Err(Error::config(format!(
                "param references secret {name:?} but no secrets are available"
            )));
        }
        Ok(resolver)
    }

    /// Parse the config's params and load the secrets they reference.
    pub async fn from_config(
        ctx: &RequestContext,
        config: &NotifierConfig,
        getter: &dyn SecretGetter,
    ) -> Result<Self> {
        let mut resolver = Self::parse(config.params())?;
        let names: Vec<String> = resolver.secret_names().map(str::to_string).collect();
        resolver.secrets = Secrets::load(ctx, config, getter, names.iter().map(String::as_str)).await?;
        Ok(resolver)
    }

    fn parse(params: &[ParamConfig]) -> Result<Self> {
        let mut seen = BTreeSet::new();
        let mut parsed = Vec::with_capacity(params.len());
        for param in params {
            if param.name.is_empty() {
                return Err(Error::config("param with empty name"));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(Error::config(format!("duplicate param {:?}", param.name)));
            }
            parsed.push((param.name.clone(), Interpolated::parse(&param.value)?));
        }
        Ok(Self {
            params: parsed,
            secrets: Secrets::default(),
        })
    }

    fn secret_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().flat_map(|(_, value)| value.secret_names())
    }
}

#[async_trait]
impl BindingResolver for ParamsBindingResolver {
    async fn resolve(
        &self,
        ctx: &RequestContext,
        additional: Option<&Bindings>,
        build: &Build,
    ) -> Result<Bindings> {
        ctx.check()?;
        let mut bindings = Bindings::with_capacity(self.params.len());
        for (name, value) in &self.params {
            let resolved = value
                .render(Some(build), &self.secrets)
                .map_err(|e| Error::binding(format!("param {name:?}: {e}")))?;
            bindings.insert(name.clone(), resolved);
        }
        if let Some(additional) = additional {
            bindings.extend(additional.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(bindings)
    }
}
