//! Internal data model.
//!
//! Validated views of the backend's loosely-typed records. These are what
//! the rest of the crate works with once `decode` has unwrapped and
//! normalized a response; raw `serde_json::Value` should not travel past
//! the decode layer.

use serde::{Deserialize, Serialize};

/// Account role. Anything the backend sends that is not an admin marker
/// counts as a regular user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "admin" | "administrator" | "superadmin" => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Whether an inquiry is for renting or buying a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseType {
    Rent,
    Sale,
}

impl PurchaseType {
    /// Loose parse; `sale`/`buy`/`beli` mean sale, everything else rents.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "sale" | "sell" | "buy" | "purchase" | "beli" | "jual" => PurchaseType::Sale,
            _ => PurchaseType::Rent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseType::Rent => "rent",
            PurchaseType::Sale => "sale",
        }
    }
}

/// A logged-in account with a resolved, validated identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
}

/// A class of apartment (e.g. "Studio", "2 Bedroom") with shared pricing
/// and facilities, distinct from an individual physical unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitType {
    pub id: String,
    pub name: String,
    pub floor: Option<String>,
    pub size: Option<String>,
    pub rent_price: Option<f64>,
    pub sale_price: Option<f64>,
    /// Normalized availability: available, booked, sold, maintenance.
    pub status: String,
    pub facilities: Vec<String>,
    /// Raw storage paths; resolve through `assets` before display.
    pub images: Vec<String>,
}

/// Thin join row between a physical unit and its type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub unit_type_id: String,
}

/// A customer's structured request to rent or buy a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inquiry {
    pub id: String,
    pub user_id: String,
    pub unit_id: Option<String>,
    pub unit_type_id: Option<String>,
    pub purchase_type: PurchaseType,
    /// Normalized inquiry status.
    pub status: String,
    pub address: Option<String>,
    pub created_at: Option<String>,
    /// Raw storage paths of uploaded ID-card photos.
    pub id_card_photos: Vec<String>,
}

/// A customer's attempt to pay for an approved inquiry, verified manually
/// by an admin from an uploaded proof image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub inquiry_id: Option<String>,
    pub user_id: Option<String>,
    /// Stored amount as sent by the backend; not authoritative, see
    /// `join::derive_payment_amount`.
    pub amount: Option<f64>,
    pub method: Option<String>,
    /// Normalized payment status.
    pub status: String,
    pub due_date: Option<String>,
    pub paid_at: Option<String>,
    /// Raw storage paths of uploaded proof files.
    pub proof: Vec<String>,
    pub invoice_url: Option<String>,
    pub proof_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_raw() {
        assert_eq!(Role::from_raw("Admin"), Role::Admin);
        assert_eq!(Role::from_raw("superadmin"), Role::Admin);
        assert_eq!(Role::from_raw("customer"), Role::User);
        assert_eq!(Role::from_raw(""), Role::User);
    }

    #[test]
    fn test_purchase_type_from_raw() {
        assert_eq!(PurchaseType::from_raw("sale"), PurchaseType::Sale);
        assert_eq!(PurchaseType::from_raw("Beli"), PurchaseType::Sale);
        assert_eq!(PurchaseType::from_raw("rent"), PurchaseType::Rent);
        assert_eq!(PurchaseType::from_raw("sewa"), PurchaseType::Rent);
    }
}
