//! Inquiry workflow operations.
//!
//! Submission (multipart with ID-card photos), listing with the
//! client-side ownership filter, and the admin status transition. Submission is gated
//! on a validated identity; there is no anonymous inquiry.

use serde_json::{json, Value};
use tracing::info;

use crate::api::{self, UploadFile};
use crate::db::DbState;
use crate::decode::{decode_collection, decode_inquiry};
use crate::models::{Inquiry, PurchaseType, Role};
use crate::status::{fold_status, is_canonical_status, EntityKind};
use crate::{auth, value_str};

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Submit a new inquiry.
///
/// `payload` carries `unit_type_id` (or `unit_id`), `purchase_type`, and
/// `address`; `id_cards` is at least one identity-card photo, uploaded
/// under the array-style `identity_card[]` field the backend expects.
/// Blocked with a specific message when the session identity is invalid
/// or a required field is missing.
pub async fn submit_inquiry(
    db: &DbState,
    payload: &Value,
    id_cards: Vec<UploadFile>,
) -> Result<Value, String> {
    let identity = auth::require_identity(db)?;
    let base = auth::backend_url()?;
    let token = auth::token()?;

    let unit_type_id = value_str(payload, &["unit_type_id", "unitTypeId"]);
    let unit_id = value_str(payload, &["unit_id", "unitId"]);
    if unit_type_id.is_none() && unit_id.is_none() {
        return Err("Missing required field: unit_type_id or unit_id".into());
    }
    let address = value_str(payload, &["address", "alamat"])
        .ok_or("Missing required field: address")?;
    let purchase_type = PurchaseType::from_raw(
        &value_str(payload, &["purchase_type", "purchaseType"]).unwrap_or_default(),
    );
    if id_cards.is_empty() {
        return Err("At least one identity card photo is required".into());
    }

    let mut fields: Vec<(String, String)> = vec![
        ("user_id".into(), identity.clone()),
        ("purchase_type".into(), purchase_type.as_str().into()),
        ("address".into(), address),
    ];
    if let Some(tid) = unit_type_id {
        fields.push(("unit_type_id".into(), tid));
    }
    if let Some(uid) = unit_id {
        fields.push(("unit_id".into(), uid));
    }

    let mut files = id_cards;
    for file in &mut files {
        file.field = "identity_card[]".into();
    }

    let resp = api::upload_multipart(&base, &token, "/inquiry", &fields, files)
        .await
        .map_err(|e| auth::check_auth_error(db, "submit_inquiry", e))?;

    info!(user_id = %identity, "inquiry submitted");
    Ok(resp)
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Fetch inquiries. Admins see everything; users only records whose
/// `user_id` string-equals the session identity, even if the backend
/// already scoped the response.
pub async fn list_inquiries(db: &DbState) -> Result<Vec<Inquiry>, String> {
    let base = auth::backend_url()?;
    let token = auth::token()?;
    let resp = api::fetch_from_backend(&base, &token, "/inquiry", "GET", None)
        .await
        .map_err(|e| auth::check_auth_error(db, "list_inquiries", e))?;
    let inquiries = decode_collection(&resp, decode_inquiry);

    if auth::session_role(db) == Role::Admin {
        return Ok(inquiries);
    }
    let identity = auth::require_identity(db)?;
    Ok(filter_owned(inquiries, &identity))
}

/// Keep only inquiries owned by `identity`.
pub fn filter_owned(inquiries: Vec<Inquiry>, identity: &str) -> Vec<Inquiry> {
    if identity.is_empty() {
        return Vec::new();
    }
    inquiries
        .into_iter()
        .filter(|i| i.user_id == identity)
        .collect()
}

// ---------------------------------------------------------------------------
// Admin transitions
// ---------------------------------------------------------------------------

/// Update an inquiry's status (admin workflow). The raw value is folded
/// through the synonym table first so UI aliases never reach the backend;
/// a value outside the canonical vocabulary is a validation error.
pub async fn update_inquiry_status(db: &DbState, id: &str, status: &str) -> Result<Value, String> {
    let canonical = fold_status(status, EntityKind::Inquiry);
    if !is_canonical_status(&canonical, EntityKind::Inquiry) {
        return Err(format!("Unknown inquiry status: {status}"));
    }

    let base = auth::backend_url()?;
    let token = auth::token()?;
    let resp = api::fetch_from_backend(
        &base,
        &token,
        &format!("/inquiry/{id}"),
        "PUT",
        Some(json!({ "status": canonical })),
    )
    .await
    .map_err(|e| auth::check_auth_error(db, "update_inquiry_status", e))?;

    info!(inquiry_id = %id, status = %canonical, "inquiry status updated");
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inquiry(id: &str, user: &str) -> Inquiry {
        Inquiry {
            id: id.into(),
            user_id: user.into(),
            unit_id: None,
            unit_type_id: None,
            purchase_type: PurchaseType::Rent,
            status: "sent".into(),
            address: None,
            created_at: None,
            id_card_photos: vec![],
        }
    }

    #[test]
    fn test_filter_owned_string_equality() {
        let list = vec![inquiry("i1", "100"), inquiry("i2", "200"), inquiry("i3", "100")];
        let mine = filter_owned(list, "100");
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|i| i.user_id == "100"));
    }

    #[test]
    fn test_filter_owned_empty_identity_yields_nothing() {
        let list = vec![inquiry("i1", "")];
        // An empty identity must not accidentally match records with an
        // empty user_id.
        assert!(filter_owned(list, "").is_empty());
    }
}
