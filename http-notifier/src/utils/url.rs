//! URL helpers.

use std::borrow::Cow;

use url::{ParseError, Url, form_urlencoded};

use crate::{Error, Result};

/// `utm_medium` value for messages delivered over HTTP.
pub const HTTP_MEDIUM: &str = "http";

const UTM_CAMPAIGN: (&str, &str) = ("utm_campaign", "build-notifiers");
const UTM_SOURCE: (&str, &str) = ("utm_source", "build-notifier");
const UTM_MEDIUM: &str = "utm_medium";

fn is_tracking_key(key: &str) -> bool {
    key == UTM_CAMPAIGN.0 || key == UTM_MEDIUM || key == UTM_SOURCE.0
}

/// Serialize `pairs` without tracking keys, then append the tracking keys.
fn annotated_query<'a>(
    pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>,
    medium: &str,
) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs.filter(|(key, _)| !is_tracking_key(key)) {
        query.append_pair(&key, &value);
    }
    query
        .append_pair(UTM_CAMPAIGN.0, UTM_CAMPAIGN.1)
        .append_pair(UTM_MEDIUM, medium)
        .append_pair(UTM_SOURCE.0, UTM_SOURCE.1)
        .finish()
}

/// Add campaign tracking parameters to `raw`.
///
/// `utm_campaign`, `utm_medium` and `utm_source` are replaced rather than
/// appended, so annotating an already annotated URL returns it unchanged.
/// Other query parameters keep their order and the fragment is preserved.
/// Relative references, including the empty string, are annotated as they
/// are.
pub fn annotate_url(raw: &str, medium: &str) -> Result<String> {
    let mut url = match Url::parse(raw) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) => return Ok(annotate_relative(raw, medium)),
        Err(e) => return Err(Error::url_malformed(raw, e)),
    };

    let query = annotated_query(url.query_pairs(), medium);
    url.set_query(Some(&query));
    Ok(url.into())
}

fn annotate_relative(raw: &str, medium: &str) -> String {
    let (rest, fragment) = match raw.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (raw, None),
    };
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

    let mut annotated = format!(
        "{path}?{}",
        annotated_query(form_urlencoded::parse(query.as_bytes()), medium)
    );
    if let Some(fragment) = fragment {
        annotated.push('#');
        annotated.push_str(fragment);
    }
    annotated
}

/// `host[:port]` of `url`, for log fields. Credentials, path and query are
/// left out because webhook URLs often embed tokens.
pub fn display_host(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => url.scheme().to_string(),
    }
}
