//! Webhook delivery.

use reqwest::{
    Client, StatusCode,
    header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT},
};
use tracing::{debug, warn};
use url::Url;

use crate::context::RequestContext;
use crate::utils::http_client::build_client;
use crate::utils::url::display_host;
use crate::{Error, Result};

/// `User-Agent` sent with every delivery.
pub const DELIVERY_USER_AGENT: &str = concat!("build-notifier/", env!("CARGO_PKG_VERSION"), " (http)");

/// Bytes of a non-OK response body kept for the warning log.
const MAX_LOGGED_BODY: usize = 512;

/// Response to a delivery that reached the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub status: StatusCode,
}

/// Encode a rendered message as the request body: one JSON string.
pub fn encode_payload(rendered: &str) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(rendered)?)
}

/// Posts rendered messages to a webhook endpoint.
///
/// Makes at most one attempt per call. Any response counts as delivered;
/// a non-2xx status is only logged.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: Client,
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookClient {
    pub fn new() -> Self {
        Self {
            client: build_client(DELIVERY_USER_AGENT),
        }
    }

    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(DELIVERY_USER_AGENT));
        headers
    }

    /// POST `rendered` to `url`, bounded by `ctx`.
    pub async fn deliver(
        &self,
        ctx: &RequestContext,
        url: &Url,
        rendered: &str,
    ) -> Result<DeliveryOutcome> {
        let payload = encode_payload(rendered)?;
        let request = self
            .client
            .post(url.clone())
            .headers(Self::build_headers())
            .body(payload);

        let response = ctx
            .run(request.send())
            .await?
            .map_err(Error::DeliveryTransport)?;

        let status = response.status();
        if !status.is_success() {
            let body = match ctx.run(response.text()).await {
                Ok(Ok(body)) => truncate(body),
                _ => String::new(),
            };
            warn!(
                status = %status,
                host = %display_host(url),
                body = %body,
                "got a non-OK response status from webhook"
            );
        } else {
            debug!(status = %status, host = %display_host(url), "sent HTTP request successfully");
        }

        Ok(DeliveryOutcome { status })
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_LOGGED_BODY {
        let mut end = MAX_LOGGED_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push('…');
    }
    body
}
