//! Status normalization for backend records.
//!
//! The backend mixes English and Indonesian status strings, camelCase and
//! snake_case alternate fields, boolean approval flags, and bare timestamp
//! markers. Everything funnels through here into one closed vocabulary per
//! entity kind before it is displayed, counted, or written back. These
//! functions are total: any JSON value in, a plain string out, no panics.

use serde_json::Value;

use crate::{value_bool, value_str};

/// Entity kinds with a status workflow of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Inquiry,
    Payment,
}

/// Canonical inquiry statuses.
pub const INQUIRY_STATUSES: &[&str] = &[
    "sent",
    "contacted",
    "scheduled",
    "completed",
    "cancelled",
    "pending",
    "approved",
    "rejected",
];

/// Canonical payment statuses.
pub const PAYMENT_STATUSES: &[&str] = &[
    "pending",
    "waiting_verification",
    "confirmed",
    "rejected",
    "expired",
];

// ---------------------------------------------------------------------------
// Record-level normalization
// ---------------------------------------------------------------------------

/// Normalize the status of a raw backend record.
///
/// Candidate order: explicit `status`, kind-specific alternate fields,
/// boolean approval flags, approval/rejection timestamps, then the kind
/// default (`sent` for inquiries, `pending` for payments). The winning
/// candidate is lowercased, trimmed, and folded through the synonym table.
/// Unrecognized values pass through lowercased so the caller can render a
/// neutral badge instead of crashing.
pub fn normalize_status(record: &Value, kind: EntityKind) -> String {
    let raw = raw_status_candidate(record, kind);
    fold_status(&raw, kind)
}

fn raw_status_candidate(record: &Value, kind: EntityKind) -> String {
    if let Some(s) = value_str(record, &["status"]) {
        return s;
    }

    let alternates: &[&str] = match kind {
        EntityKind::Inquiry => &["inquiry_status", "inquiryStatus", "approval_status"],
        EntityKind::Payment => &["payment_status", "paymentStatus", "approval_status"],
    };
    if let Some(s) = value_str(record, alternates) {
        return s;
    }

    if value_bool(record, &["is_approved", "isApproved"]) == Some(true) {
        return "approved".into();
    }
    if value_bool(record, &["is_rejected", "isRejected"]) == Some(true) {
        return "rejected".into();
    }
    if value_str(record, &["approved_at", "approvedAt"]).is_some() {
        return "approved".into();
    }
    if value_str(record, &["rejected_at", "rejectedAt"]).is_some() {
        return "rejected".into();
    }

    match kind {
        EntityKind::Inquiry => "sent".into(),
        EntityKind::Payment => "pending".into(),
    }
}

// ---------------------------------------------------------------------------
// Synonym folding
// ---------------------------------------------------------------------------

/// Fold a raw status string into the canonical vocabulary for `kind`.
/// Must be applied before any status is written back to the backend, so
/// UI-only aliases never leak into stored records.
pub fn fold_status(raw: &str, kind: EntityKind) -> String {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return match kind {
            EntityKind::Inquiry => "sent".into(),
            EntityKind::Payment => "pending".into(),
        };
    }

    match kind {
        EntityKind::Inquiry => match lower.as_str() {
            "submitted" | "terkirim" | "dikirim" => "sent".into(),
            "dihubungi" => "contacted".into(),
            "dijadwalkan" | "survey" | "surveyed" => "scheduled".into(),
            "selesai" | "done" | "finished" => "completed".into(),
            "dibatalkan" | "canceled" | "batal" => "cancelled".into(),
            "menunggu" | "diproses" | "waiting" | "in_review" => "pending".into(),
            "disetujui" | "accepted" | "diterima" => "approved".into(),
            "ditolak" | "declined" | "denied" => "rejected".into(),
            other => other.to_string(),
        },
        EntityKind::Payment => match lower.as_str() {
            "menunggu" | "unpaid" | "belum_bayar" => "pending".into(),
            "approved" | "paid" | "success" | "settled" | "disetujui" | "lunas" => {
                "confirmed".into()
            }
            "failed" | "cancelled" | "canceled" | "ditolak" | "gagal" | "dibatalkan" => {
                "rejected".into()
            }
            "kadaluarsa" | "expire" | "overdue" => "expired".into(),
            other if other.starts_with("awaiting") || other.starts_with("waiting") => {
                "waiting_verification".into()
            }
            "verifikasi" | "menunggu_verifikasi" | "in_verification" => {
                "waiting_verification".into()
            }
            other => other.to_string(),
        },
    }
}

/// True when `status` belongs to the canonical vocabulary for `kind`.
pub fn is_canonical_status(status: &str, kind: EntityKind) -> bool {
    let set = match kind {
        EntityKind::Inquiry => INQUIRY_STATUSES,
        EntityKind::Payment => PAYMENT_STATUSES,
    };
    set.contains(&status)
}

// ---------------------------------------------------------------------------
// Unit types
// ---------------------------------------------------------------------------

/// Normalize a unit-type availability status by substring match on the raw
/// value. Anything unrecognized counts as available.
pub fn normalize_unit_type_status(raw: &str) -> &'static str {
    let lower = raw.trim().to_lowercase();
    if lower.contains("sold") {
        "sold"
    } else if lower.contains("book") || lower.contains("occupied") {
        "booked"
    } else if lower.contains("maintenance") {
        "maintenance"
    } else {
        "available"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_explicit_status_wins() {
        let rec = json!({ "status": "Contacted", "is_approved": true });
        assert_eq!(normalize_status(&rec, EntityKind::Inquiry), "contacted");
    }

    #[test]
    fn test_alternate_fields_and_flags() {
        let rec = json!({ "inquiry_status": "Submitted" });
        assert_eq!(normalize_status(&rec, EntityKind::Inquiry), "sent");

        let rec = json!({ "is_approved": true });
        assert_eq!(normalize_status(&rec, EntityKind::Inquiry), "approved");

        let rec = json!({ "rejected_at": "2025-11-02T08:00:00Z" });
        assert_eq!(normalize_status(&rec, EntityKind::Payment), "rejected");
    }

    #[test]
    fn test_kind_defaults() {
        assert_eq!(normalize_status(&json!({}), EntityKind::Inquiry), "sent");
        assert_eq!(normalize_status(&json!({}), EntityKind::Payment), "pending");
        assert_eq!(normalize_status(&json!(null), EntityKind::Inquiry), "sent");
    }

    #[test]
    fn test_indonesian_synonyms_fold() {
        assert_eq!(fold_status("Disetujui", EntityKind::Inquiry), "approved");
        assert_eq!(fold_status("ditolak", EntityKind::Inquiry), "rejected");
        assert_eq!(fold_status("dibatalkan", EntityKind::Inquiry), "cancelled");
        assert_eq!(fold_status("menunggu", EntityKind::Payment), "pending");
        assert_eq!(fold_status("lunas", EntityKind::Payment), "confirmed");
    }

    #[test]
    fn test_payment_ui_aliases_fold_to_canon() {
        for alias in ["approved", "paid", "SUCCESS", "settled"] {
            assert_eq!(fold_status(alias, EntityKind::Payment), "confirmed");
        }
        for alias in ["failed", "cancelled"] {
            assert_eq!(fold_status(alias, EntityKind::Payment), "rejected");
        }
        assert_eq!(
            fold_status("awaiting_confirmation", EntityKind::Payment),
            "waiting_verification"
        );
    }

    #[test]
    fn test_unknown_passes_through_lowercased() {
        let rec = json!({ "status": "Sedang Ditinjau Ulang" });
        assert_eq!(
            normalize_status(&rec, EntityKind::Inquiry),
            "sedang ditinjau ulang"
        );
    }

    #[test]
    fn test_total_over_weird_inputs() {
        for v in [json!(42), json!([1, 2]), json!("plain"), json!(true)] {
            // Must not panic, must return the kind default.
            assert_eq!(normalize_status(&v, EntityKind::Payment), "pending");
        }
    }

    #[test]
    fn test_unit_type_status_substrings() {
        assert_eq!(normalize_unit_type_status("Sold Out"), "sold");
        assert_eq!(normalize_unit_type_status("pre-booked"), "booked");
        assert_eq!(normalize_unit_type_status("OCCUPIED"), "booked");
        assert_eq!(normalize_unit_type_status("under maintenance"), "maintenance");
        assert_eq!(normalize_unit_type_status("anything else"), "available");
        assert_eq!(normalize_unit_type_status(""), "available");
    }
}
