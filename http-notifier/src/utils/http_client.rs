use std::sync::OnceLock;

use reqwest::Client;
use tracing::debug;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Maximum redirect hops followed for one delivery.
pub const MAX_REDIRECTS: usize = 10;

/// Client for webhook delivery.
///
/// No client-level timeout is set; each request is bounded by the caller's
/// context instead. Redirects are followed, so a 3xx answer is never the
/// reported status unless the hop limit is hit.
pub fn build_client(user_agent: &str) -> Client {
    install_rustls_provider();
    Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .unwrap_or_else(|e| {
            debug!(error = %e, "falling back to default HTTP client");
            Client::new()
        })
}
