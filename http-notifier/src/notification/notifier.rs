//! The HTTP notifier: filter, resolve, annotate, render, deliver.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use build_filter::Predicate;
use reqwest::StatusCode;
use text_template::Template;
use tracing::{debug, info};
use url::Url;

use super::delivery::WebhookClient;
use super::view::TemplateView;
use crate::bindings::{BindingResolver, Interpolated, SecretGetter, Secrets};
use crate::build::{Build, filter_schema};
use crate::config::NotifierConfig;
use crate::context::RequestContext;
use crate::utils::url::{HTTP_MEDIUM, annotate_url, display_host};
use crate::{Error, Result};

/// Name parse and render errors report.
pub const TEMPLATE_NAME: &str = "http_template";

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The filter rejected the event; nothing was sent.
    Filtered,
    /// The endpoint answered, with any status.
    Delivered { status: StatusCode },
}

impl HandleOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// A configured notifier that can be driven by any host.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn notifier_type(&self) -> &'static str;

    async fn send_notification(&self, ctx: &RequestContext, build: &Build) -> Result<HandleOutcome>;
}

/// Sends one templated HTTP POST per event that passes the filter.
///
/// Immutable after setup; share it behind an `Arc` to handle events
/// concurrently.
pub struct HttpNotifier {
    filter: Predicate,
    template: Template,
    resolver: Arc<dyn BindingResolver>,
    destination: Url,
    client: WebhookClient,
}

impl fmt::Debug for HttpNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpNotifier")
            .field("filter", &self.filter.source())
            .field("template", &self.template.name())
            .field("destination", &display_host(&self.destination))
            .finish_non_exhaustive()
    }
}

impl HttpNotifier {
    pub fn new(
        filter: Predicate,
        template: Template,
        resolver: Arc<dyn BindingResolver>,
        destination: Url,
        client: WebhookClient,
    ) -> Self {
        Self {
            filter,
            template,
            resolver,
            destination,
            client,
        }
    }

    /// Compile the filter, parse the template and resolve the destination.
    ///
    /// The delivery URL may reference `$(secrets.NAME)`; those are read
    /// through `secrets` now and never again.
    pub async fn setup(
        ctx: &RequestContext,
        config: &NotifierConfig,
        template_source: &str,
        secrets: &dyn SecretGetter,
        resolver: Arc<dyn BindingResolver>,
    ) -> Result<Self> {
        let filter = Predicate::compile(config.filter(), filter_schema())?;
        let destination = resolve_destination(ctx, config, secrets).await?;
        let template = Template::parse(TEMPLATE_NAME, template_source)?;

        info!(
            notifier = %config.name(),
            filter = %filter.source(),
            host = %display_host(&destination),
            "HTTP notifier ready"
        );

        Ok(Self::new(
            filter,
            template,
            resolver,
            destination,
            WebhookClient::new(),
        ))
    }

    pub fn destination(&self) -> &Url {
        &self.destination
    }

    /// Run one event through the pipeline.
    ///
    /// A filtered event and a delivered event (whatever the response
    /// status) are both `Ok`.
    pub async fn handle(&self, ctx: &RequestContext, build: &Build) -> Result<HandleOutcome> {
        if !self.filter.apply(build) {
            debug!(
                build_id = %build.id,
                status = %build.status,
                "not sending HTTP request for event"
            );
            return Ok(HandleOutcome::Filtered);
        }

        info!(
            build_id = %build.id,
            status = %build.status,
            "sending HTTP request for event"
        );

        let bindings = self
            .resolver
            .resolve(ctx, None, build)
            .await
            .map_err(|e| match e {
                Error::BindingResolution(_) | Error::Cancelled(_) => e,
                other => Error::binding(other.to_string()),
            })?;

        let mut annotated = build.clone();
        annotated.log_url = annotate_url(&build.log_url, HTTP_MEDIUM)?;

        let rendered = {
            let view = TemplateView::new(&annotated, &bindings);
            self.template.render_view(&view)?
        };

        let outcome = self.client.deliver(ctx, &self.destination, &rendered).await?;
        Ok(HandleOutcome::Delivered {
            status: outcome.status,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    fn notifier_type(&self) -> &'static str {
        "http"
    }

    async fn send_notification(&self, ctx: &RequestContext, build: &Build) -> Result<HandleOutcome> {
        self.handle(ctx, build).await
    }
}

async fn resolve_destination(
    ctx: &RequestContext,
    config: &NotifierConfig,
    getter: &dyn SecretGetter,
) -> Result<Url> {
    let raw = Interpolated::parse(config.delivery_url()?)?;
    if raw.references_build() {
        return Err(Error::config(
            "delivery url may only reference secrets, not build fields",
        ));
    }
    let secrets = Secrets::load(ctx, config, getter, raw.secret_names()).await?;
    let url = raw
        .render(None, &secrets)
        .map_err(|e| Error::config(e.to_string()))?;

    let url = Url::parse(&url)
        .map_err(|e| Error::config(format!("invalid delivery url: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::config(format!(
            "delivery url must be http or https, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::bindings::{Bindings, ParamsBindingResolver};
    use crate::build::BuildStatus;

    struct NoSecrets;

    #[async_trait]
    impl SecretGetter for NoSecrets {
        async fn get_secret(&self, reference: &str) -> Result<String> {
            Err(Error::config(format!("no secret {reference}")))
        }
    }

    struct FixedSecrets(HashMap<&'static str, &'static str>);

    #[async_trait]
    impl SecretGetter for FixedSecrets {
        async fn get_secret(&self, reference: &str) -> Result<String> {
            self.0
                .get(reference)
                .map(|s| s.to_string())
                .ok_or_else(|| Error::config(format!("no secret {reference}")))
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl BindingResolver for FailingResolver {
        async fn resolve(
            &self,
            _ctx: &RequestContext,
            _additional: Option<&Bindings>,
            _build: &Build,
        ) -> Result<Bindings> {
            Err(Error::Other("backend unavailable".into()))
        }
    }

    fn config(filter: &str, url: &str) -> NotifierConfig {
        NotifierConfig::from_yaml(&format!(
            r#"
apiVersion: build-notifiers/v1
kind: HTTPNotifier
metadata: {{ name: unit }}
spec:
  notification:
    filter: '{filter}'
    delivery: {{ url: '{url}' }}
  secrets:
    - {{ name: token, value: HOOK_TOKEN }}
"#
        ))
        .unwrap()
    }

    fn no_params() -> Arc<dyn BindingResolver> {
        Arc::new(ParamsBindingResolver::default())
    }

    async fn setup(filter: &str, url: &str, template: &str) -> Result<HttpNotifier> {
        HttpNotifier::setup(
            &RequestContext::new(),
            &config(filter, url),
            template,
            &NoSecrets,
            no_params(),
        )
        .await
    }

    #[tokio::test]
    async fn setup_rejects_bad_filter() {
        let err = setup("build.status ==", "http://127.0.0.1:1/", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FilterCompile(_)), "{err}");
        assert!(err.is_setup_error());
    }

    #[tokio::test]
    async fn setup_rejects_bad_template() {
        let err = setup("true", "http://127.0.0.1:1/", "{{if .Build.Id}}")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TemplateParse(_)), "{err}");
    }

    #[tokio::test]
    async fn setup_rejects_non_http_destination() {
        let err = setup("true", "ftp://example.com/", "x").await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn setup_rejects_build_reference_in_url() {
        let err = setup("true", "http://x/$(build.id)", "x").await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn setup_interpolates_secret_into_url() {
        let notifier = HttpNotifier::setup(
            &RequestContext::new(),
            &config("true", "https://hooks.example.com/t/$(secrets.token)"),
            "x",
            &FixedSecrets(HashMap::from([("HOOK_TOKEN", "abc123")])),
            no_params(),
        )
        .await
        .unwrap();
        assert_eq!(
            notifier.destination().as_str(),
            "https://hooks.example.com/t/abc123"
        );
        assert!(!format!("{notifier:?}").contains("abc123"));
    }

    #[tokio::test]
    async fn unreadable_url_secret_fails_setup() {
        let err = setup("true", "https://hooks/$(secrets.token)", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn filtered_event_is_ok() {
        let notifier = setup("build.status == FAILURE", "http://127.0.0.1:1/", "x")
            .await
            .unwrap();
        let outcome = notifier
            .handle(&RequestContext::new(), &Build::new("b-1", BuildStatus::Success))
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome::Filtered);
    }

    #[tokio::test]
    async fn resolver_failure_is_binding_error() {
        let notifier = HttpNotifier::setup(
            &RequestContext::new(),
            &config("true", "http://127.0.0.1:1/"),
            "x",
            &NoSecrets,
            Arc::new(FailingResolver),
        )
        .await
        .unwrap();
        let err = notifier
            .handle(
                &RequestContext::new(),
                &Build::new("b-1", BuildStatus::Success).with_log_url("https://ci/l"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BindingResolution(_)), "{err}");
    }

    #[tokio::test]
    async fn malformed_log_url_aborts_before_delivery() {
        let notifier = setup("true", "http://127.0.0.1:1/", "x").await.unwrap();
        let err = notifier
            .handle(
                &RequestContext::new(),
                &Build::new("b-1", BuildStatus::Success).with_log_url("http://[::1/log"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UrlMalformed { .. }), "{err}");
    }

    #[tokio::test]
    async fn missing_template_field_aborts_before_delivery() {
        let notifier = setup("true", "http://127.0.0.1:1/", "{{.Build.Nope}}")
            .await
            .unwrap();
        let err = notifier
            .handle(
                &RequestContext::new(),
                &Build::new("b-1", BuildStatus::Success).with_log_url("https://ci/l"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TemplateExec(_)), "{err}");
    }

    #[test]
    fn notifier_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpNotifier>();
    }
}
