//! Residence Core
//!
//! Headless client data layer for the Residence property dashboard:
//! decoding of the backend's inconsistent response shapes, identity and
//! status normalization, asset URL resolution, cross-entity joins, a
//! best-effort local cache, and the polling notification tracker. A
//! front-end (desktop shell or web view) renders what this crate
//! reconciles; nothing here draws pixels.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod assets;
pub mod auth;
pub mod db;
pub mod decode;
pub mod diagnostics;
pub mod identity;
pub mod inquiries;
pub mod join;
pub mod models;
pub mod notify;
pub mod payments;
pub mod poll;
pub mod status;
pub mod storage;
pub mod units;

// ---------------------------------------------------------------------------
// Loose JSON field helpers
// ---------------------------------------------------------------------------
// The backend mixes snake_case and camelCase field names freely, so every
// extraction takes a candidate list and returns the first usable value.

pub fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub fn value_f64(v: &serde_json::Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_f64()) {
            return Some(n);
        }
    }
    None
}

pub fn value_i64(v: &serde_json::Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_i64()) {
            return Some(n);
        }
    }
    None
}

/// Booleans also arrive as 0/1 and "true"/"false" strings.
pub fn value_bool(v: &serde_json::Value, keys: &[&str]) -> Option<bool> {
    for key in keys {
        match v.get(*key) {
            Some(serde_json::Value::Bool(b)) => return Some(*b),
            Some(serde_json::Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return Some(i != 0);
                }
            }
            Some(serde_json::Value::String(s)) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => return Some(true),
                    "false" | "0" | "no" => return Some(false),
                    _ => {}
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Initialize logging, open the local cache, clear session-scoped state,
/// and run the poll loop until interrupted.
pub async fn run() -> anyhow::Result<()> {
    // Structured logging: console + daily rolling file
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,residence_core=debug"));

    diagnostics::prune_old_logs();

    let log_dir = diagnostics::get_log_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, "residence");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Keep the guard alive for the lifetime of the process; dropping it
    // flushes logs.
    std::mem::forget(guard);

    info!("Starting Residence Core v{}", env!("CARGO_PKG_VERSION"));

    let db = Arc::new(
        db::init(&db::default_data_dir()).map_err(|e| anyhow::anyhow!("database init: {e}"))?,
    );

    // Session-scoped counters mirror sessionStorage: gone on restart.
    db::clear_session_state(&db).map_err(|e| anyhow::anyhow!("session reset: {e}"))?;

    // Pick the session back up from the stored token before polling
    // starts; a dead token is dropped inside resume_session.
    if storage::is_configured() {
        if let Err(e) = auth::resume_session(&db).await {
            warn!(error = %e, "session not resumed; login required");
        }
    } else {
        info!("no stored credentials; poll loop idles until login");
    }

    let poll_state = Arc::new(poll::PollState::new());
    let (events, mut event_rx) = tokio::sync::broadcast::channel(64);
    poll::start_poll_loop(db.clone(), poll_state.clone(), events);

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                if let Ok(event) = event {
                    info!(
                        kind = %event.kind,
                        count = event.count,
                        delta = event.delta,
                        badge = event.badge,
                        "notification"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                poll::stop_poll_loop(&poll_state);
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_str_candidate_order_and_trim() {
        let v = json!({ "a": "  ", "b": " hit ", "c": "later" });
        assert_eq!(value_str(&v, &["a", "b", "c"]), Some("hit".to_string()));
        assert_eq!(value_str(&v, &["missing"]), None);
    }

    #[test]
    fn test_value_bool_loose_forms() {
        assert_eq!(value_bool(&json!({ "f": true }), &["f"]), Some(true));
        assert_eq!(value_bool(&json!({ "f": 0 }), &["f"]), Some(false));
        assert_eq!(value_bool(&json!({ "f": "Yes" }), &["f"]), Some(true));
        assert_eq!(value_bool(&json!({ "f": "nope" }), &["f"]), None);
    }

    #[test]
    fn test_value_numbers() {
        let v = json!({ "n": 3.5, "i": 7 });
        assert_eq!(value_f64(&v, &["n"]), Some(3.5));
        assert_eq!(value_i64(&v, &["i"]), Some(7));
        assert_eq!(value_i64(&v, &["n"]), None);
    }
}
