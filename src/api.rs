//! Backend REST API client.
//!
//! Authenticated HTTP communication with the property backend: JSON
//! fetches with bearer auth, multipart uploads for ID-card and proof
//! files, URL normalization, and friendly error mapping. Response shape
//! handling lives in `decode`; this module only moves bytes.

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout used specifically for the lightweight connectivity test.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the configured backend origin:
/// - strip trailing slashes
/// - strip a trailing `/api` segment
/// - ensure a scheme is present (https, or http for localhost)
///
/// The result doubles as the asset base URL (`assets` joins storage paths
/// onto it), which is why `/api` must come off.
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Strip trailing /api
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    // Strip trailing slashes again (in case "/api/" was present)
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach backend at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid backend URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session expired or token invalid".to_string(),
        403 => "Account not authorized for this action".to_string(),
        404 => "Backend endpoint not found".to_string(),
        s if s >= 500 => format!("Backend server error (HTTP {s})"),
        s => format!("Unexpected response from backend (HTTP {s})"),
    }
}

/// True when an error message indicates the stored token is no longer
/// usable and the user must sign in again.
pub fn is_auth_failure(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("session expired")
        || lower.contains("token invalid")
        || lower.contains("not authorized")
        || lower.contains("unauthenticated")
}

// ---------------------------------------------------------------------------
// Connectivity test
// ---------------------------------------------------------------------------

/// Result of a connectivity test.
#[derive(serde::Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Test connectivity to the backend with a lightweight unauthenticated
/// listing fetch.
pub async fn test_connectivity(base_url: &str) -> ConnectivityResult {
    let base = normalize_base_url(base_url);
    let probe_url = format!("{base}/api/unit-type");

    let client = match Client::builder().timeout(CONNECTIVITY_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            return ConnectivityResult {
                success: false,
                latency_ms: None,
                error: Some(format!("Failed to create HTTP client: {e}")),
            };
        }
    };

    let start = Instant::now();

    let resp = match client.get(&probe_url).send().await {
        Ok(r) => r,
        Err(e) => {
            return ConnectivityResult {
                success: false,
                latency_ms: None,
                error: Some(friendly_error(&base, &e)),
            };
        }
    };

    let latency = start.elapsed().as_millis() as u64;
    let status = resp.status();

    if status.is_success() {
        info!(latency_ms = latency, "connectivity test passed");
        ConnectivityResult {
            success: true,
            latency_ms: Some(latency),
            error: None,
        }
    } else {
        ConnectivityResult {
            success: false,
            latency_ms: Some(latency),
            error: Some(status_error(status)),
        }
    }
}

// ---------------------------------------------------------------------------
// Generic authenticated fetch
// ---------------------------------------------------------------------------

/// Perform an authenticated JSON request against the backend.
///
/// `path` is relative to the API root and should include the leading
/// slash, e.g. `/inquiry` or `/payment/12`. `token` may be empty for the
/// public endpoints (`/login`, `/register`, `/unit-type`).
pub async fn fetch_from_backend(
    base_url: &str,
    token: &str,
    path: &str,
    method: &str,
    body: Option<Value>,
) -> Result<Value, String> {
    let base = normalize_base_url(base_url);
    let full_url = format!("{base}/api{path}");

    let http_method: Method = method
        .to_uppercase()
        .parse()
        .map_err(|_| format!("Invalid HTTP method: {method}"))?;

    let client = Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

    let mut req = client
        .request(http_method, &full_url)
        .header("Accept", "application/json");
    if !token.trim().is_empty() {
        req = req.bearer_auth(token.trim());
    }
    if let Some(b) = body {
        req = req.json(&b);
    }

    debug!(path, method, "backend request");
    let resp = req.send().await.map_err(|e| friendly_error(&base, &e))?;
    read_json_response(resp).await
}

/// A file part for a multipart upload.
pub struct UploadFile {
    /// Array-style field name the backend expects, e.g. `identity_card[]`.
    pub field: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Perform an authenticated multipart POST (file uploads plus text
/// fields).
pub async fn upload_multipart(
    base_url: &str,
    token: &str,
    path: &str,
    fields: &[(String, String)],
    files: Vec<UploadFile>,
) -> Result<Value, String> {
    let base = normalize_base_url(base_url);
    let full_url = format!("{base}/api{path}");

    let client = Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

    let mut form = reqwest::multipart::Form::new();
    for (name, value) in fields {
        form = form.text(name.clone(), value.clone());
    }
    for file in files {
        let part = reqwest::multipart::Part::bytes(file.bytes)
            .file_name(file.filename)
            .mime_str(&file.mime)
            .map_err(|e| format!("Invalid mime type: {e}"))?;
        form = form.part(file.field, part);
    }

    let mut req = client
        .post(&full_url)
        .header("Accept", "application/json")
        .multipart(form);
    if !token.trim().is_empty() {
        req = req.bearer_auth(token.trim());
    }

    debug!(path, "backend multipart upload");
    let resp = req.send().await.map_err(|e| friendly_error(&base, &e))?;
    read_json_response(resp).await
}

/// Shared response handling: surface backend validation detail on error
/// statuses, return the JSON body (or null for empty 204s) on success.
async fn read_json_response(resp: reqwest::Response) -> Result<Value, String> {
    let status = resp.status();

    if !status.is_success() {
        let body_text = resp.text().await.unwrap_or_default();
        let detail = if let Ok(json) = serde_json::from_str::<Value>(&body_text) {
            let message = json
                .get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(|s| s.to_string())
                .unwrap_or_else(|| status_error(status));
            let details = json.get("details").or_else(|| json.get("errors")).cloned();
            if let Some(details) = details {
                format!("{message} (HTTP {}): {}", status.as_u16(), details)
            } else {
                format!("{message} (HTTP {})", status.as_u16())
            }
        } else if !body_text.trim().is_empty() {
            format!(
                "{} (HTTP {}): {}",
                status_error(status),
                status.as_u16(),
                body_text.trim()
            )
        } else {
            format!("{} (HTTP {})", status_error(status), status.as_u16())
        };
        // Keep the auth classification stable even when the backend adds
        // its own message.
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(format!("{}: {}", status_error(status), detail));
        }
        return Err(detail);
    }

    let body_text = resp.text().await.unwrap_or_default();
    if body_text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body_text).map_err(|e| format!("Invalid JSON from backend: {e}"))
}
