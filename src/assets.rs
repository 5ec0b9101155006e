//! Asset URL resolution.
//!
//! The backend's file-storage path conventions differ between environments:
//! some return absolute URLs, some `storage/...` paths, some `public/...`
//! paths that are actually served under `storage/`. Instead of guessing one
//! spelling, we build a ranked list of candidate URLs and let the consumer
//! walk it until one loads. First success wins; only full exhaustion is an
//! error, and that error carries every attempted URL for diagnostics.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Timeout per candidate probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure modes of asset resolution.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("no asset path provided")]
    Empty,
    #[error("all asset candidates failed for base {base}: {attempted:?}")]
    Exhausted {
        base: String,
        attempted: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Candidate construction
// ---------------------------------------------------------------------------

/// Build the ordered, de-duplicated list of absolute HTTPS URLs to try for
/// a possibly-relative storage path.
///
/// `base_url` is the backend origin with any trailing `/api` already
/// stripped (see [`crate::api::normalize_base_url`]). Empty input yields an
/// empty list; the caller renders a "no asset" state instead of a broken
/// image.
pub fn build_asset_candidates(path: &str, base_url: &str) -> Vec<String> {
    let raw = path.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    // Inline data URIs need no resolution at all.
    if raw.starts_with("data:") {
        return vec![raw.to_string()];
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        return vec![force_https(raw)];
    }

    let base = base_url.trim().trim_end_matches('/');
    let root_relative = raw.starts_with('/');
    let stripped = raw.trim_start_matches('/');

    let mut candidates: Vec<String> = Vec::new();

    // Environments that expose `public/...` paths actually serve the files
    // under `storage/...`, so the swapped spelling is the most likely hit.
    if let Some(rest) = stripped.strip_prefix("public/") {
        candidates.push(format!("{base}/storage/{rest}"));
    }

    candidates.push(format!("{base}/{stripped}"));

    if !stripped.starts_with("storage/") {
        candidates.push(format!("{base}/storage/{stripped}"));
    }

    if root_relative {
        candidates.push(format!("{base}{raw}"));
    }

    dedup_https(candidates)
}

/// Same as [`build_asset_candidates`] but tolerant of non-string JSON
/// values (`null`, numbers, objects all yield an empty list).
pub fn candidates_from_value(path: &Value, base_url: &str) -> Vec<String> {
    match path.as_str() {
        Some(s) => build_asset_candidates(s, base_url),
        None => Vec::new(),
    }
}

fn force_https(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("http://") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}

fn dedup_https(candidates: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(candidates.len());
    for c in candidates {
        let c = force_https(&c);
        if seen.insert(c.clone()) {
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Consumer contract
// ---------------------------------------------------------------------------

/// Try candidates in order and return the first URL that answers with a
/// success status. Transport failures and error statuses both advance to
/// the next candidate.
pub async fn probe_candidates(path: &str, base_url: &str) -> Result<String, AssetError> {
    let candidates = build_asset_candidates(path, base_url);
    if candidates.is_empty() {
        return Err(AssetError::Empty);
    }

    // Data URIs are self-contained; nothing to probe.
    if candidates.len() == 1 && candidates[0].starts_with("data:") {
        return Ok(candidates[0].clone());
    }

    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|_| AssetError::Exhausted {
            base: base_url.to_string(),
            attempted: candidates.clone(),
        })?;

    for url in &candidates {
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                return Ok(url.clone());
            }
            Ok(resp) => {
                debug!(url = %url, status = %resp.status(), "asset candidate rejected");
            }
            Err(e) => {
                debug!(url = %url, error = %e, "asset candidate unreachable");
            }
        }
    }

    Err(AssetError::Exhausted {
        base: base_url.to_string(),
        attempted: candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "https://api.example.com";

    #[test]
    fn test_empty_and_non_string_inputs() {
        assert!(build_asset_candidates("", BASE).is_empty());
        assert!(build_asset_candidates("   ", BASE).is_empty());
        assert!(candidates_from_value(&json!(null), BASE).is_empty());
        assert!(candidates_from_value(&json!(123), BASE).is_empty());
    }

    #[test]
    fn test_data_uri_passthrough() {
        let uri = "data:image/png;base64,iVBORw0KGgo=";
        assert_eq!(build_asset_candidates(uri, BASE), vec![uri.to_string()]);
    }

    #[test]
    fn test_absolute_url_upgraded_to_https() {
        assert_eq!(
            build_asset_candidates("http://x.com/a.png", BASE),
            vec!["https://x.com/a.png".to_string()]
        );
        assert_eq!(
            build_asset_candidates("https://x.com/a.png", BASE),
            vec!["https://x.com/a.png".to_string()]
        );
    }

    #[test]
    fn test_public_prefix_swaps_to_storage_first() {
        let candidates = build_asset_candidates("public/img.png", BASE);
        let swap_pos = candidates
            .iter()
            .position(|c| c == "https://api.example.com/storage/img.png")
            .expect("storage swap candidate present");
        let direct_pos = candidates
            .iter()
            .position(|c| c == "https://api.example.com/public/img.png")
            .expect("direct join candidate present");
        assert!(swap_pos < direct_pos);
    }

    #[test]
    fn test_bare_relative_gets_storage_fallback() {
        let candidates = build_asset_candidates("img.png", BASE);
        assert_eq!(
            candidates,
            vec![
                "https://api.example.com/img.png".to_string(),
                "https://api.example.com/storage/img.png".to_string(),
            ]
        );
    }

    #[test]
    fn test_storage_path_not_double_prefixed() {
        let candidates = build_asset_candidates("storage/proof/p1.jpg", BASE);
        assert_eq!(
            candidates,
            vec!["https://api.example.com/storage/proof/p1.jpg".to_string()]
        );
    }

    #[test]
    fn test_root_relative_deduped() {
        let candidates = build_asset_candidates("/public/img.png", BASE);
        // base + original equals the direct join after stripping, so the
        // de-dup keeps first-seen order without repeats.
        let unique: std::collections::HashSet<_> = candidates.iter().collect();
        assert_eq!(unique.len(), candidates.len());
        assert_eq!(candidates[0], "https://api.example.com/storage/img.png");
    }

    #[test]
    fn test_all_candidates_https() {
        let candidates = build_asset_candidates("public/a.png", "http://api.example.com");
        assert!(candidates.iter().all(|c| c.starts_with("https://")));
    }
}
