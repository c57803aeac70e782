//! Remote JSON fetch.
//!
//! One GET, no retries. Anything that is not a successful JSON response is a
//! transport error carrying a short excerpt of the body, so an HTML login or
//! proxy page is easy to tell apart from a broken API.

use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::defaults::RESPONSE_EXCERPT_CHARS;
use crate::config::HttpConfig;
use crate::error::{PipelineError, Result};

/// GET `url` and parse the body as JSON.
pub async fn fetch_json(url: &str, http: &HttpConfig) -> Result<Value> {
    let transport = |message: String, excerpt: Option<String>| PipelineError::Transport {
        url: url.to_string(),
        message,
        excerpt,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(http.timeout_secs))
        .build()
        .map_err(|e| transport(format!("cannot build HTTP client: {e}"), None))?;

    let mut request = client.get(url).query(&http.query);
    for (name, value) in &http.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(user) = &http.basic_auth_user {
        request = request.basic_auth(user, http.basic_auth_password.as_ref());
    }

    info!(url = %url, timeout_secs = http.timeout_secs, "Fetching remote source");
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            transport(format!("timed out after {}s", http.timeout_secs), None)
        } else {
            transport(e.to_string(), None)
        }
    })?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    let body = response
        .text()
        .await
        .map_err(|e| transport(format!("failed reading response body: {e}"), None))?;
    debug!(%status, content_type = %content_type, bytes = body.len(), "Response received");

    if !status.is_success() {
        return Err(transport(format!("HTTP {status}"), Some(excerpt(&body))));
    }

    if !declares_json(&content_type, url) {
        let message = if looks_like_html(&content_type, &body) {
            format!("server returned an HTML page (content-type '{content_type}'), not JSON")
        } else {
            format!("unexpected content-type '{content_type}'")
        };
        return Err(transport(message, Some(excerpt(&body))));
    }

    serde_json::from_str(&body)
        .map_err(|e| transport(format!("invalid JSON from API: {e}"), Some(excerpt(&body))))
}

fn declares_json(content_type: &str, url: &str) -> bool {
    if content_type.contains("application/json") || content_type.contains("+json") {
        return true;
    }
    reqwest::Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase().ends_with(".json"))
        .unwrap_or(false)
}

fn looks_like_html(content_type: &str, body: &str) -> bool {
    if content_type.contains("text/html") {
        return true;
    }
    let head = body.trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// First [`RESPONSE_EXCERPT_CHARS`] characters of the body.
fn excerpt(body: &str) -> String {
    body.trim().chars().take(RESPONSE_EXCERPT_CHARS).collect()
}
