//! Payment workflow operations.
//!
//! Listing with cross-entity amount derivation, proof upload, admin
//! verification, and the offline detail cache. Payment records from the
//! backend do not reliably carry an amount, so the displayed figure is
//! reconstructed from the unit-type price table (see
//! `join::derive_payment_amount`) and snapshotted into the local cache so
//! a later price edit does not rewrite cached history.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::{self, UploadFile};
use crate::db::DbState;
use crate::decode::{
    decode_collection, decode_inquiry, decode_payment, decode_unit, decode_unit_type,
};
use crate::join::{derive_payment_amount, payment_owner, DisplayAmount, EntityIndex};
use crate::models::{Payment, Role};
use crate::status::{fold_status, is_canonical_status, EntityKind};
use crate::{assets, auth, value_str};

// ---------------------------------------------------------------------------
// Display views
// ---------------------------------------------------------------------------

/// Build the display JSON for a payment: normalized record plus the
/// derived amount, its provenance, the joined unit-type name, and ranked
/// proof URL candidates.
pub fn build_payment_view(payment: &Payment, index: &EntityIndex, base_url: &str) -> Value {
    let amount = derive_payment_amount(payment, index);
    let unit_type_name = index
        .inquiry_for_payment(payment)
        .and_then(|i| index.unit_type_for_inquiry(i))
        .map(|t| t.name.clone());

    let proof_candidates: Vec<Vec<String>> = payment
        .proof
        .iter()
        .map(|p| assets::build_asset_candidates(p, base_url))
        .filter(|c| !c.is_empty())
        .collect();

    let mut v = serde_json::to_value(payment).unwrap_or(Value::Null);
    if let Some(obj) = v.as_object_mut() {
        obj.insert("display_amount".into(), json!(amount.value()));
        obj.insert("display_amount_label".into(), json!(amount.label()));
        obj.insert(
            "amount_source".into(),
            json!(match amount {
                DisplayAmount::Derived(_) => "derived",
                DisplayAmount::Stored(_) => "stored",
                DisplayAmount::Unavailable => "unavailable",
            }),
        );
        obj.insert("unit_type_name".into(), json!(unit_type_name));
        obj.insert("proof_candidates".into(), json!(proof_candidates));
    }
    v
}

/// Keep only payments owned by `identity` (directly or via the joined
/// inquiry).
pub fn filter_owned(payments: Vec<Payment>, index: &EntityIndex, identity: &str) -> Vec<Payment> {
    payments
        .into_iter()
        .filter(|p| {
            crate::join::is_owned_by(identity, payment_owner(p, index).as_deref())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Fetch payments joined with inquiries, units, and unit types. Admins see
/// everything; users only their own records.
pub async fn list_payments(db: &DbState) -> Result<Vec<Value>, String> {
    let base = auth::backend_url()?;
    let token = auth::token()?;

    let (payments, inquiries, unit_types, units) = tokio::try_join!(
        api::fetch_from_backend(&base, &token, "/payment", "GET", None),
        api::fetch_from_backend(&base, &token, "/inquiry", "GET", None),
        api::fetch_from_backend(&base, &token, "/unit-type", "GET", None),
        api::fetch_from_backend(&base, &token, "/unit", "GET", None),
    )
    .map_err(|e| auth::check_auth_error(db, "list_payments", e))?;

    let payments = decode_collection(&payments, decode_payment);
    let index = EntityIndex::build(
        decode_collection(&unit_types, decode_unit_type),
        decode_collection(&units, decode_unit),
        decode_collection(&inquiries, decode_inquiry),
        payments.clone(),
    );

    let payments = if auth::session_role(db) == Role::Admin {
        payments
    } else {
        let identity = auth::require_identity(db)?;
        filter_owned(payments, &index, &identity)
    };

    Ok(payments
        .iter()
        .map(|p| build_payment_view(p, &index, &base))
        .collect())
}

// ---------------------------------------------------------------------------
// Detail with offline fallback
// ---------------------------------------------------------------------------

/// Fetch one payment's detail view. On success the view (with its derived
/// amount snapshot) is cached per user; on a transport failure the cached
/// copy is served instead, marked `"offline": true`. Auth failures are
/// never masked by the cache.
pub async fn payment_detail(db: &DbState, payment_id: &str) -> Result<Value, String> {
    let identity = auth::require_identity(db)?;
    let base = auth::backend_url()?;
    let token = auth::token()?;

    let fetched = tokio::try_join!(
        api::fetch_from_backend(&base, &token, "/payment", "GET", None),
        api::fetch_from_backend(&base, &token, "/inquiry", "GET", None),
        api::fetch_from_backend(&base, &token, "/unit-type", "GET", None),
        api::fetch_from_backend(&base, &token, "/unit", "GET", None),
    );

    let (payment_resp, inquiries, unit_types, units) = match fetched {
        Ok(parts) => parts,
        Err(e) => {
            if api::is_auth_failure(&e) {
                auth::handle_auth_failure(db, "payment_detail", &e);
                return Err(e);
            }
            warn!(payment_id, error = %e, "payment detail fetch failed, trying cache");
            let conn = db.conn.lock().map_err(|e| e.to_string())?;
            return match cached_payment_detail(&conn, &identity, payment_id) {
                Some(mut cached) => {
                    if let Some(obj) = cached.as_object_mut() {
                        obj.insert("offline".into(), json!(true));
                    }
                    Ok(cached)
                }
                None => Err(e),
            };
        }
    };

    let index = EntityIndex::build(
        decode_collection(&unit_types, decode_unit_type),
        decode_collection(&units, decode_unit),
        decode_collection(&inquiries, decode_inquiry),
        decode_collection(&payment_resp, decode_payment),
    );
    let payment = index
        .payment_by_id(payment_id)
        .cloned()
        .ok_or_else(|| format!("Payment not found: {payment_id}"))?;

    // Ownership check; admins may inspect any record.
    if auth::session_role(db) != Role::Admin
        && !crate::join::is_owned_by(&identity, payment_owner(&payment, &index).as_deref())
    {
        return Err(format!("Payment not found: {payment_id}"));
    }

    let view = build_payment_view(&payment, &index, &base);
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    if let Err(e) = cache_payment_detail(&conn, &identity, payment_id, &view) {
        warn!(payment_id, error = %e, "failed to cache payment detail");
    }
    Ok(view)
}

// ---------------------------------------------------------------------------
// Submission & proof upload
// ---------------------------------------------------------------------------

/// Create a payment record for an approved inquiry, uploading proof files
/// under the array-style `proof[]` field.
pub async fn submit_payment(
    db: &DbState,
    payload: &Value,
    proof_files: Vec<UploadFile>,
) -> Result<Value, String> {
    let identity = auth::require_identity(db)?;
    let base = auth::backend_url()?;
    let token = auth::token()?;

    let inquiry_id = value_str(payload, &["inquiry_id", "inquiryId"])
        .ok_or("Missing required field: inquiry_id")?;
    let method = value_str(payload, &["method", "payment_method"])
        .ok_or("Missing required field: method")?;
    if proof_files.is_empty() {
        return Err("At least one proof file is required".into());
    }

    let fields: Vec<(String, String)> = vec![
        ("user_id".into(), identity.clone()),
        ("inquiry_id".into(), inquiry_id.clone()),
        ("method".into(), method),
    ];

    let mut files = proof_files;
    for file in &mut files {
        file.field = "proof[]".into();
    }

    let resp = api::upload_multipart(&base, &token, "/payment", &fields, files)
        .await
        .map_err(|e| auth::check_auth_error(db, "submit_payment", e))?;

    info!(user_id = %identity, inquiry_id = %inquiry_id, "payment submitted");
    Ok(resp)
}

/// Attach additional proof to an existing payment. The backend routes
/// multipart updates through POST with a method override field.
pub async fn upload_proof(
    db: &DbState,
    payment_id: &str,
    proof_files: Vec<UploadFile>,
) -> Result<Value, String> {
    let identity = auth::require_identity(db)?;
    let base = auth::backend_url()?;
    let token = auth::token()?;

    if proof_files.is_empty() {
        return Err("At least one proof file is required".into());
    }

    let fields: Vec<(String, String)> = vec![
        ("user_id".into(), identity),
        ("_method".into(), "PUT".into()),
    ];
    let mut files = proof_files;
    for file in &mut files {
        file.field = "proof[]".into();
    }

    api::upload_multipart(&base, &token, &format!("/payment/{payment_id}"), &fields, files)
        .await
        .map_err(|e| auth::check_auth_error(db, "upload_proof", e))
}

// ---------------------------------------------------------------------------
// Admin verification
// ---------------------------------------------------------------------------

/// Update a payment's status (admin verification workflow). UI aliases
/// (`approved`, `paid`, `failed`, ...) are folded to the canonical
/// vocabulary before the write; anything unrecognized is rejected.
pub async fn update_payment_status(db: &DbState, id: &str, status: &str) -> Result<Value, String> {
    let canonical = fold_status(status, EntityKind::Payment);
    if !is_canonical_status(&canonical, EntityKind::Payment) {
        return Err(format!("Unknown payment status: {status}"));
    }

    let base = auth::backend_url()?;
    let token = auth::token()?;
    let resp = api::fetch_from_backend(
        &base,
        &token,
        &format!("/payment/{id}"),
        "PUT",
        Some(json!({ "status": canonical })),
    )
    .await
    .map_err(|e| auth::check_auth_error(db, "update_payment_status", e))?;

    info!(payment_id = %id, status = %canonical, "payment status updated");
    Ok(resp)
}

/// Confirm a payment from its uploaded proof.
pub async fn verify_payment(db: &DbState, id: &str) -> Result<Value, String> {
    update_payment_status(db, id, "confirmed").await
}

/// Reject a payment whose proof did not check out.
pub async fn reject_payment(db: &DbState, id: &str) -> Result<Value, String> {
    update_payment_status(db, id, "rejected").await
}

// ---------------------------------------------------------------------------
// Offline cache
// ---------------------------------------------------------------------------

pub fn cache_payment_detail(
    conn: &Connection,
    user_id: &str,
    payment_id: &str,
    view: &Value,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO payment_cache (user_id, payment_id, detail, cached_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(user_id, payment_id) DO UPDATE SET
            detail = excluded.detail,
            cached_at = excluded.cached_at",
        params![user_id, payment_id, view.to_string()],
    )
    .map_err(|e| format!("cache payment detail: {e}"))?;
    Ok(())
}

pub fn cached_payment_detail(
    conn: &Connection,
    user_id: &str,
    payment_id: &str,
) -> Option<Value> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT detail FROM payment_cache WHERE user_id = ?1 AND payment_id = ?2",
            params![user_id, payment_id],
            |row| row.get(0),
        )
        .optional()
        .ok()
        .flatten();
    raw.and_then(|s| serde_json::from_str(&s).ok())
}
