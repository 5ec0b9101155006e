//! Secure credential storage using the OS credential store.
//!
//! On Windows this uses DPAPI (via the `keyring` crate), on macOS Keychain,
//! and on Linux the Secret Service API. The bearer token never touches the
//! SQLite cache or a flat file; everything else client-side lives in the
//! `local_settings` store (see `db`).
//!
//! Documented keys:
//! - `backend_api_url`: configured backend origin, normalized (no `/api`)
//! - `api_token`: bearer token from `/login`

use keyring::Entry;
use tracing::{info, warn};

const SERVICE_NAME: &str = "residence-core";

// Credential keys
pub const KEY_BACKEND_URL: &str = "backend_api_url";
pub const KEY_API_TOKEN: &str = "api_token";

/// All credential keys managed by this module.
const ALL_KEYS: &[&str] = &[KEY_BACKEND_URL, KEY_API_TOKEN];

// ---------------------------------------------------------------------------
// Low-level helpers
// ---------------------------------------------------------------------------

fn entry(key: &str) -> Result<Entry, String> {
    Entry::new(SERVICE_NAME, key).map_err(|e| format!("credential store unavailable ({key}): {e}"))
}

/// Retrieve a single credential. Returns `None` both when the entry does
/// not exist and when the platform store is unreachable; callers treat
/// either as "not configured".
pub fn get_credential(key: &str) -> Option<String> {
    let lookup = entry(key).and_then(|e| match e.get_password() {
        Ok(secret) => Ok(Some(secret)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(format!("read credential ({key}): {e}")),
    });
    match lookup {
        Ok(found) => found,
        Err(e) => {
            warn!(key, error = %e, "credential lookup failed");
            None
        }
    }
}

/// Store a credential in the OS store, replacing any previous value.
pub fn set_credential(key: &str, value: &str) -> Result<(), String> {
    entry(key)?
        .set_password(value)
        .map_err(|e| format!("store credential ({key}): {e}"))
}

/// Delete a credential. Deleting an absent entry is not an error.
pub fn delete_credential(key: &str) -> Result<(), String> {
    match entry(key)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(format!("delete credential ({key}): {e}")),
    }
}

pub fn has_credential(key: &str) -> bool {
    get_credential(key).is_some()
}

// ---------------------------------------------------------------------------
// High-level API
// ---------------------------------------------------------------------------

/// The client is configured when a backend URL and a token are present.
pub fn is_configured() -> bool {
    has_credential(KEY_BACKEND_URL) && has_credential(KEY_API_TOKEN)
}

/// Delete every stored credential (sign-out everywhere / reset).
pub fn factory_reset() -> Result<(), String> {
    info!("deleting all stored credentials");
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    Ok(())
}
