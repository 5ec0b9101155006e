//! Session and token management.
//!
//! Login/register against the backend, bearer token persistence in the OS
//! credential store, and the identity gate every user-owned write goes
//! through. The session user snapshot lives in the session-scoped settings
//! category so it disappears on restart; the token survives restarts so a
//! returning user is not forced back through login while it is still
//! valid.

use serde_json::{json, Value};
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::db::{self, DbState, SESSION_CATEGORY};
use crate::decode::{decode_user, unwrap_single};
use crate::identity::{is_valid_identity, resolve_user_id};
use crate::models::{Role, User};
use crate::{api, storage, value_str};

/// Session keys in `local_settings`.
const SESSION_USER_KEY: &str = "user";
const SESSION_USER_ID_KEY: &str = "user_id";
const SESSION_ROLE_KEY: &str = "role";

/// Message shown when the identity gate fails. Recoverable: the user must
/// re-authenticate, the action is never performed with a made-up id.
pub const INVALID_IDENTITY_MESSAGE: &str =
    "Your account identity could not be verified. Please sign in again.";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Store the backend origin (normalized, `/api` stripped).
pub fn configure_backend(url: &str) -> Result<String, String> {
    let normalized = api::normalize_base_url(url);
    if normalized.trim().is_empty() {
        return Err("Backend URL cannot be empty".into());
    }
    storage::set_credential(storage::KEY_BACKEND_URL, &normalized)?;
    info!(backend = %normalized, "backend configured");
    Ok(normalized)
}

pub fn backend_url() -> Result<String, String> {
    storage::get_credential(storage::KEY_BACKEND_URL)
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| "Not configured: missing backend URL".to_string())
}

pub fn token() -> Result<String, String> {
    storage::get_credential(storage::KEY_API_TOKEN)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| "Not signed in: missing API token".to_string())
}

// ---------------------------------------------------------------------------
// Login / register
// ---------------------------------------------------------------------------

/// Sign in and establish a session.
///
/// Stores the bearer token, fetches the profile from `/user`, resolves and
/// validates the identity, and caches the session user snapshot. A profile
/// without a valid identity aborts the session: the token is removed again
/// so the caller lands back on login rather than acting with no owner id.
pub async fn login(db: &DbState, email: &str, password: &str) -> Result<Value, String> {
    let base = backend_url()?;
    if email.trim().is_empty() || password.is_empty() {
        return Err("Email and password are required".into());
    }

    let resp = api::fetch_from_backend(
        &base,
        "",
        "/login",
        "POST",
        Some(json!({ "email": email.trim(), "password": password })),
    )
    .await?;

    let token = extract_token(&resp).ok_or("Login response did not contain a token")?;
    storage::set_credential(storage::KEY_API_TOKEN, &token)?;

    match establish_session(db, &base, &token).await {
        Ok(user) => {
            info!(user_id = %user.id, role = user.role.as_str(), "login successful");
            serde_json::to_value(&user).map_err(|e| format!("serialize session user: {e}"))
        }
        Err(e) => {
            let _ = storage::delete_credential(storage::KEY_API_TOKEN);
            Err(e)
        }
    }
}

/// Create an account. When the backend hands back a token directly the
/// session is established in the same call; otherwise the caller follows
/// up with `login`.
pub async fn register(db: &DbState, payload: &Value) -> Result<Value, String> {
    let base = backend_url()?;

    for field in ["name", "email", "password"] {
        if value_str(payload, &[field]).is_none() {
            return Err(format!("Missing required field: {field}"));
        }
    }

    let resp = api::fetch_from_backend(&base, "", "/register", "POST", Some(payload.clone())).await?;

    if let Some(token) = extract_token(&resp) {
        storage::set_credential(storage::KEY_API_TOKEN, &token)?;
        let user = establish_session(db, &base, &token).await?;
        return serde_json::to_value(&user).map_err(|e| format!("serialize session user: {e}"));
    }

    Ok(resp)
}

/// Resume a session from the stored token after a restart, so a returning
/// user is not forced back through login while the token is still valid.
/// Re-fetches the profile and re-validates the identity; a fatal error
/// (auth failure or invalid identity) drops the dead token so the next
/// check routes to login instead of retrying forever.
pub async fn resume_session(db: &DbState) -> Result<User, String> {
    let base = backend_url()?;
    let token = token()?;
    match establish_session(db, &base, &token).await {
        Ok(user) => {
            info!(user_id = %user.id, role = user.role.as_str(), "session resumed");
            Ok(user)
        }
        Err(e) => {
            if session_fatal(&e) {
                let _ = storage::delete_credential(storage::KEY_API_TOKEN);
            }
            Err(e)
        }
    }
}

/// True when an establish-session error means the stored token is useless
/// (as opposed to a transient transport failure worth retrying).
fn session_fatal(error: &str) -> bool {
    api::is_auth_failure(error) || error == INVALID_IDENTITY_MESSAGE
}

/// Fetch `/user`, validate identity, persist the session snapshot.
async fn establish_session(db: &DbState, base: &str, token: &str) -> Result<User, String> {
    let resp = api::fetch_from_backend(base, token, "/user", "GET", None).await?;
    let raw = unwrap_single(&resp).ok_or("Profile response was not an object")?;
    let user = decode_user(&raw);

    let identity = resolve_user_id(&raw);
    if !is_valid_identity(&identity) {
        warn!(identity = %identity, "profile identity failed validation");
        return Err(INVALID_IDENTITY_MESSAGE.into());
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let snapshot =
        serde_json::to_string(&user).map_err(|e| format!("serialize session user: {e}"))?;
    db::set_setting(&conn, SESSION_CATEGORY, SESSION_USER_KEY, &snapshot)?;
    db::set_setting(&conn, SESSION_CATEGORY, SESSION_USER_ID_KEY, &identity)?;
    db::set_setting(&conn, SESSION_CATEGORY, SESSION_ROLE_KEY, user.role.as_str())?;
    Ok(user)
}

fn extract_token(resp: &Value) -> Option<String> {
    if let Some(t) = value_str(resp, &["token", "access_token", "accessToken"]) {
        return Some(t);
    }
    unwrap_single(resp).and_then(|d| value_str(&d, &["token", "access_token", "accessToken"]))
}

// ---------------------------------------------------------------------------
// Session access
// ---------------------------------------------------------------------------

/// The cached session user, if a session is established.
pub fn session_user(db: &DbState) -> Option<User> {
    let conn = db.conn.lock().ok()?;
    let raw = db::get_setting(&conn, SESSION_CATEGORY, SESSION_USER_KEY)?;
    serde_json::from_str(&raw).ok()
}

pub fn session_role(db: &DbState) -> Role {
    let conn = match db.conn.lock() {
        Ok(c) => c,
        Err(_) => return Role::User,
    };
    db::get_setting(&conn, SESSION_CATEGORY, SESSION_ROLE_KEY)
        .map(|r| Role::from_raw(&r))
        .unwrap_or(Role::User)
}

/// The validated identity required before any user-owned write. Errors are
/// user-visible and recoverable (re-authenticate); dependent actions must
/// not proceed without it.
pub fn require_identity(db: &DbState) -> Result<String, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let identity = db::get_setting(&conn, SESSION_CATEGORY, SESSION_USER_ID_KEY)
        .unwrap_or_default();
    if is_valid_identity(&identity) {
        Ok(identity)
    } else {
        Err(INVALID_IDENTITY_MESSAGE.into())
    }
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

/// Sign out: wipe the token from memory and the credential store, drop the
/// session snapshot.
pub fn logout(db: &DbState) -> Result<(), String> {
    if let Some(mut token) = storage::get_credential(storage::KEY_API_TOKEN) {
        token.zeroize();
    }
    storage::delete_credential(storage::KEY_API_TOKEN)?;
    db::clear_session_state(db)?;
    info!("signed out");
    Ok(())
}

/// React to a 401/403 from any operation: drop the dead token and session
/// so the front-end's next check routes to login (preserving its intended
/// destination is the front-end's job).
pub fn handle_auth_failure(db: &DbState, context: &str, error: &str) {
    warn!(context, error, "auth failure, clearing session");
    let _ = logout(db);
}

/// Pass-through error mapper for op modules: clears the session when the
/// error is an auth failure, returns the error unchanged either way.
pub fn check_auth_error(db: &DbState, context: &str, error: String) -> String {
    if api::is_auth_failure(&error) {
        handle_auth_failure(db, context, &error);
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_fatal_classification() {
        assert!(session_fatal("Session expired or token invalid"));
        assert!(session_fatal(INVALID_IDENTITY_MESSAGE));
        // A transient transport failure must keep the token for retry.
        assert!(!session_fatal("Cannot reach backend at https://x"));
        assert!(!session_fatal("Connection to https://x timed out"));
    }

    #[test]
    fn test_extract_token_shapes() {
        assert_eq!(
            extract_token(&json!({ "token": "abc" })),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_token(&json!({ "access_token": "abc" })),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_token(&json!({ "data": { "accessToken": "abc" } })),
            Some("abc".to_string())
        );
        assert_eq!(extract_token(&json!({ "user": {} })), None);
    }
}
