//! User identity resolution.
//!
//! Backend user payloads are wildly inconsistent about which field carries
//! the stable identifier (national ID number, numeric PK, UUID, with both
//! snake_case and camelCase spellings). This module picks one identifier
//! out of that mess and validates its shape. Every workflow that writes
//! user-owned records (inquiry submission, proof upload) must go through
//! this gate first.

use serde_json::Value;

/// Candidate identifier fields, in priority order. First non-empty wins.
const IDENTITY_FIELDS: &[&str] = &[
    "nik",
    "NIK",
    "no_ktp",
    "noKtp",
    "id",
    "user_id",
    "userId",
    "customer_id",
    "customerId",
    "uuid",
];

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Extract a stable user identifier from a loosely-typed user payload
/// (stored session snapshot or a `/user` profile fetch).
///
/// Numeric field values are accepted and stringified; everything is trimmed.
/// Returns `""` when no candidate field carries a usable value.
pub fn resolve_user_id(user: &Value) -> String {
    for key in IDENTITY_FIELDS {
        match user.get(*key) {
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
            // Numeric primary keys arrive as JSON numbers from some
            // endpoints.
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return i.to_string();
                }
                if let Some(f) = n.as_f64() {
                    if f.fract() == 0.0 {
                        return format!("{}", f as i64);
                    }
                }
            }
            _ => {}
        }
    }

    String::new()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// An identity is valid when it is all-digits (NIK / numeric PK) or
/// UUID-shaped (`8-4-4-4-12` hex groups, case-insensitive).
///
/// Email-shaped values are never a valid identity, even if some backend
/// endpoint returns one in an id field: writing records keyed by email
/// would silently fork a user's history the moment they change address.
pub fn is_valid_identity(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.contains('@') {
        return false;
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }

    is_uuid_shaped(trimmed)
}

/// Strict `8-4-4-4-12` hyphenated hex check. Deliberately narrower than a
/// general UUID parser: braced or non-hyphenated forms are not accepted
/// because the backend never produces them.
fn is_uuid_shaped(value: &str) -> bool {
    let groups: Vec<&str> = value.split('-').collect();
    if groups.len() != 5 {
        return false;
    }
    const LENS: [usize; 5] = [8, 4, 4, 4, 12];
    groups
        .iter()
        .zip(LENS.iter())
        .all(|(g, len)| g.len() == *len && g.bytes().all(|b| b.is_ascii_hexdigit()))
}
