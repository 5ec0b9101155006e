//! Backend response decoding.
//!
//! Every endpoint returns JSON in one of exactly four shapes: a bare array,
//! `{data: [...]}`, `{data: {...}}` (a singleton), or something unusable.
//! `unwrap_collection` / `unwrap_single` collapse that into one shape, and
//! the per-entity decoders turn loose records into validated model types,
//! applying identity resolution and status normalization on the way in.
//! A record without a usable id is dropped, never invented.

use serde_json::Value;

use crate::identity::resolve_user_id;
use crate::models::{Inquiry, Payment, PurchaseType, Role, Unit, UnitType, User};
use crate::status::{normalize_status, normalize_unit_type_status, EntityKind};
use crate::{value_f64, value_str};

// ---------------------------------------------------------------------------
// Shape unwrapping
// ---------------------------------------------------------------------------

/// Unwrap a response into a list of records.
///
/// Bare array → as-is; `{data: array}` → inner array; `{data: object}` →
/// single-element list; anything else → empty list.
pub fn unwrap_collection(resp: &Value) -> Vec<Value> {
    if let Some(arr) = resp.as_array() {
        return arr.clone();
    }
    match resp.get("data") {
        Some(Value::Array(arr)) => arr.clone(),
        Some(Value::Object(obj)) => vec![Value::Object(obj.clone())],
        _ => Vec::new(),
    }
}

/// Unwrap a singleton response: `{data: object}` → the object, a bare
/// object without `data` → itself, `{data: [first, ..]}` → the first
/// element. `None` when nothing object-shaped is present; an explicit
/// `{data: null}` (or scalar `data`) is a miss, not the envelope itself.
pub fn unwrap_single(resp: &Value) -> Option<Value> {
    match resp.get("data") {
        Some(Value::Object(obj)) => Some(Value::Object(obj.clone())),
        Some(Value::Array(arr)) => arr.first().cloned(),
        Some(_) => None,
        None => {
            if resp.is_object() {
                Some(resp.clone())
            } else {
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Loose field helpers
// ---------------------------------------------------------------------------

/// Extract an id-ish value: string fields win, numeric fields are
/// stringified. Foreign keys join on these stringified forms so `3` and
/// `"3"` compare equal.
pub fn value_id(v: &Value, keys: &[&str]) -> Option<String> {
    if let Some(s) = value_str(v, keys) {
        return Some(s);
    }
    for key in keys {
        if let Some(i) = v.get(*key).and_then(Value::as_i64) {
            return Some(i.to_string());
        }
    }
    None
}

/// Extract a numeric amount, accepting both JSON numbers and numeric
/// strings (`"1500000"`, `"1500000.00"`).
pub fn value_amount(v: &Value, keys: &[&str]) -> Option<f64> {
    if let Some(n) = value_f64(v, keys) {
        return Some(n);
    }
    for key in keys {
        if let Some(s) = v.get(*key).and_then(Value::as_str) {
            if let Ok(n) = s.trim().replace(',', "").parse::<f64>() {
                return Some(n);
            }
        }
    }
    None
}

/// Extract a list of strings from a field that may be an array, a CSV
/// string, or a single bare string.
pub fn value_string_list(v: &Value, keys: &[&str]) -> Vec<String> {
    for key in keys {
        match v.get(*key) {
            Some(Value::Array(arr)) => {
                return arr
                    .iter()
                    .filter_map(|x| x.as_str())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            Some(Value::String(s)) if !s.trim().is_empty() => {
                return s
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect();
            }
            _ => {}
        }
    }
    Vec::new()
}

// ---------------------------------------------------------------------------
// Entity decoders
// ---------------------------------------------------------------------------

pub fn decode_user(raw: &Value) -> User {
    User {
        id: resolve_user_id(raw),
        name: value_str(raw, &["name", "full_name", "fullName", "username"]).unwrap_or_default(),
        email: value_str(raw, &["email"]).unwrap_or_default(),
        phone: value_str(raw, &["phone", "phone_number", "phoneNumber", "no_hp"])
            .unwrap_or_default(),
        role: Role::from_raw(&value_str(raw, &["role", "user_role"]).unwrap_or_default()),
    }
}

pub fn decode_unit_type(raw: &Value) -> Option<UnitType> {
    let id = value_id(raw, &["id", "unit_type_id", "unitTypeId"])?;
    Some(UnitType {
        id,
        name: value_str(raw, &["name", "type_name", "typeName"]).unwrap_or_default(),
        floor: value_str(raw, &["floor", "lantai"]),
        size: value_str(raw, &["size", "luas"]),
        rent_price: value_amount(raw, &["rent_price", "rentPrice", "harga_sewa"]),
        sale_price: value_amount(raw, &["sale_price", "salePrice", "harga_jual"]),
        status: normalize_unit_type_status(
            &value_str(raw, &["status"]).unwrap_or_default(),
        )
        .to_string(),
        facilities: value_string_list(raw, &["facilities", "fasilitas"]),
        images: value_string_list(raw, &["images", "image", "photos", "photo"]),
    })
}

pub fn decode_unit(raw: &Value) -> Option<Unit> {
    let id = value_id(raw, &["id", "unit_id", "unitId"])?;
    let unit_type_id = value_id(raw, &["unit_type_id", "unitTypeId", "type_id", "typeId"])?;
    Some(Unit { id, unit_type_id })
}

pub fn decode_inquiry(raw: &Value) -> Option<Inquiry> {
    let id = value_id(raw, &["id", "inquiry_id", "inquiryId"])?;
    Some(Inquiry {
        id,
        user_id: value_id(raw, &["user_id", "userId", "customer_id", "customerId"])
            .unwrap_or_default(),
        unit_id: value_id(raw, &["unit_id", "unitId"]),
        unit_type_id: value_id(raw, &["unit_type_id", "unitTypeId"]),
        purchase_type: PurchaseType::from_raw(
            &value_str(raw, &["purchase_type", "purchaseType", "type"]).unwrap_or_default(),
        ),
        status: normalize_status(raw, EntityKind::Inquiry),
        address: value_str(raw, &["address", "alamat"]),
        created_at: value_str(raw, &["created_at", "createdAt"]),
        id_card_photos: value_string_list(
            raw,
            &["id_card_photos", "idCardPhotos", "identity_card", "identityCard"],
        ),
    })
}

pub fn decode_payment(raw: &Value) -> Option<Payment> {
    let id = value_id(raw, &["id", "payment_id", "paymentId"])?;
    Some(Payment {
        id,
        inquiry_id: value_id(raw, &["inquiry_id", "inquiryId"]),
        user_id: value_id(raw, &["user_id", "userId", "customer_id", "customerId"]),
        amount: value_amount(raw, &["amount", "total", "nominal"]),
        method: value_str(raw, &["method", "payment_method", "paymentMethod"]),
        status: normalize_status(raw, EntityKind::Payment),
        due_date: value_str(raw, &["due_date", "dueDate"]),
        paid_at: value_str(raw, &["paid_at", "paidAt"]),
        proof: value_string_list(raw, &["proof", "proofs", "bukti"]),
        invoice_url: value_str(raw, &["invoice_url", "invoiceUrl"]),
        proof_url: value_str(raw, &["proof_url", "proofUrl"]),
        created_at: value_str(raw, &["created_at", "createdAt"]),
        updated_at: value_str(raw, &["updated_at", "updatedAt"]),
    })
}

/// Decode a whole response into typed records, dropping anything without a
/// usable id.
pub fn decode_collection<T>(resp: &Value, decode: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    unwrap_collection(resp).iter().filter_map(decode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_bare_array() {
        let resp = json!([{ "id": 1 }, { "id": 2 }]);
        assert_eq!(unwrap_collection(&resp).len(), 2);
    }

    #[test]
    fn test_unwrap_data_array() {
        let resp = json!({ "data": [{ "id": 1 }] });
        assert_eq!(unwrap_collection(&resp).len(), 1);
    }

    #[test]
    fn test_unwrap_data_object_wraps_singleton() {
        let resp = json!({ "data": { "id": 9 } });
        let rows = unwrap_collection(&resp);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], 9);
    }

    #[test]
    fn test_unwrap_garbage_is_empty() {
        for resp in [json!(null), json!("x"), json!(7), json!({ "data": null })] {
            assert!(unwrap_collection(&resp).is_empty());
        }
    }

    #[test]
    fn test_unwrap_single() {
        assert_eq!(
            unwrap_single(&json!({ "data": { "id": 3 } })).unwrap()["id"],
            3
        );
        assert_eq!(unwrap_single(&json!({ "id": 3 })).unwrap()["id"], 3);
        assert!(unwrap_single(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_unwrap_single_null_data_is_a_miss() {
        // The envelope must never stand in for a missing record.
        assert!(unwrap_single(&json!({ "data": null })).is_none());
        assert!(unwrap_single(&json!({ "data": 5 })).is_none());
        assert!(unwrap_single(&json!({ "data": "x" })).is_none());
    }

    #[test]
    fn test_value_id_stringifies_numbers() {
        assert_eq!(
            value_id(&json!({ "id": 42 }), &["id"]),
            Some("42".to_string())
        );
        assert_eq!(
            value_id(&json!({ "id": "abc" }), &["id"]),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_value_amount_accepts_numeric_strings() {
        assert_eq!(
            value_amount(&json!({ "amount": "1,500,000" }), &["amount"]),
            Some(1_500_000.0)
        );
        assert_eq!(
            value_amount(&json!({ "amount": 999 }), &["amount"]),
            Some(999.0)
        );
        assert_eq!(value_amount(&json!({ "amount": "abc" }), &["amount"]), None);
    }

    #[test]
    fn test_value_string_list_csv_and_array() {
        let v = json!({ "facilities": "AC, WiFi , Kitchen" });
        assert_eq!(
            value_string_list(&v, &["facilities"]),
            vec!["AC", "WiFi", "Kitchen"]
        );
        let v = json!({ "proof": ["a.jpg", "", "b.jpg"] });
        assert_eq!(value_string_list(&v, &["proof"]), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_decode_unit_type_normalizes_status() {
        let raw = json!({
            "id": 1,
            "name": "Studio",
            "rent_price": "2500000",
            "status": "Booked by customer",
            "facilities": "AC,WiFi",
        });
        let ut = decode_unit_type(&raw).expect("decoded");
        assert_eq!(ut.id, "1");
        assert_eq!(ut.status, "booked");
        assert_eq!(ut.rent_price, Some(2_500_000.0));
        assert_eq!(ut.facilities, vec!["AC", "WiFi"]);
    }

    #[test]
    fn test_decode_payment_requires_id() {
        assert!(decode_payment(&json!({ "amount": 5 })).is_none());
        let p = decode_payment(&json!({ "id": 7, "status": "paid" })).expect("decoded");
        assert_eq!(p.id, "7");
        assert_eq!(p.status, "confirmed");
    }

    #[test]
    fn test_decode_collection_drops_idless_rows() {
        let resp = json!({ "data": [{ "id": 1, "unit_type_id": 2 }, { "unit_type_id": 3 }] });
        let units = decode_collection(&resp, decode_unit);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].unit_type_id, "2");
    }
}
