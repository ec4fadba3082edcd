//! Notifier error types.

use thiserror::Error;

use crate::context::ContextError;

/// Notifier result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up the notifier or handling one event.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to compile filter: {0}")]
    FilterCompile(#[from] build_filter::FilterError),

    #[error("Failed to parse template: {0}")]
    TemplateParse(#[from] text_template::ParseError),

    #[error("Failed to resolve bindings: {0}")]
    BindingResolution(String),

    #[error("Failed to add UTM params to {url:?}: {reason}")]
    UrlMalformed { url: String, reason: String },

    #[error("Failed to render template: {0}")]
    TemplateExec(#[from] text_template::ExecError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to make HTTP request: {0}")]
    DeliveryTransport(#[source] reqwest::Error),

    #[error("HTTP request aborted: {0}")]
    Cancelled(#[from] ContextError),

    #[error("Invalid event payload: {0}")]
    InvalidEvent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn binding(msg: impl Into<String>) -> Self {
        Self::BindingResolution(msg.into())
    }

    pub fn url_malformed(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::UrlMalformed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Name of the pipeline stage that produced the error, for log fields.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Configuration(_) | Self::Io(_) | Self::Yaml(_) => "config",
            Self::FilterCompile(_) => "filter",
            Self::TemplateParse(_) | Self::TemplateExec(_) => "template",
            Self::BindingResolution(_) => "bindings",
            Self::UrlMalformed { .. } => "annotate",
            Self::Serialization(_) => "encode",
            Self::DeliveryTransport(_) | Self::Cancelled(_) => "delivery",
            Self::InvalidEvent(_) => "decode",
            Self::Other(_) => "other",
        }
    }

    /// Errors that can only come out of setup.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::FilterCompile(_)
                | Self::TemplateParse(_)
                | Self::Io(_)
                | Self::Yaml(_)
        )
    }
}
