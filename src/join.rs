//! Cross-entity joining.
//!
//! Units, unit types, inquiries, and payments are fetched independently
//! and reference each other through loosely-typed foreign keys. This
//! module builds id-keyed lookups and reconstructs the derived values the
//! backend does not reliably carry: which unit type a payment is for, what
//! the applicable price is, and who owns a record.

use std::collections::HashMap;

use crate::models::{Inquiry, Payment, PurchaseType, Unit, UnitType};

/// Shown when neither a derived price nor a stored amount is usable.
pub const PRICE_UNAVAILABLE_LABEL: &str = "harga tidak tersedia";

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

/// Id-keyed lookups over one fetch cycle's snapshot.
#[derive(Debug, Default)]
pub struct EntityIndex {
    pub unit_types: HashMap<String, UnitType>,
    pub units: HashMap<String, Unit>,
    pub inquiries: HashMap<String, Inquiry>,
    pub payments: HashMap<String, Payment>,
}

impl EntityIndex {
    pub fn build(
        unit_types: Vec<UnitType>,
        units: Vec<Unit>,
        inquiries: Vec<Inquiry>,
        payments: Vec<Payment>,
    ) -> Self {
        Self {
            unit_types: unit_types.into_iter().map(|t| (t.id.clone(), t)).collect(),
            units: units.into_iter().map(|u| (u.id.clone(), u)).collect(),
            inquiries: inquiries.into_iter().map(|i| (i.id.clone(), i)).collect(),
            payments: payments.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub fn payment_by_id(&self, id: &str) -> Option<&Payment> {
        self.payments.get(id)
    }

    /// Resolve the unit type an inquiry refers to: the direct
    /// `unit_type_id` when present, else via `unit_id → Unit →
    /// unit_type_id`.
    pub fn unit_type_for_inquiry(&self, inquiry: &Inquiry) -> Option<&UnitType> {
        if let Some(tid) = &inquiry.unit_type_id {
            if let Some(ut) = self.unit_types.get(tid) {
                return Some(ut);
            }
        }
        let unit = self.units.get(inquiry.unit_id.as_deref()?)?;
        self.unit_types.get(&unit.unit_type_id)
    }

    pub fn inquiry_for_payment(&self, payment: &Payment) -> Option<&Inquiry> {
        self.inquiries.get(payment.inquiry_id.as_deref()?)
    }
}

// ---------------------------------------------------------------------------
// Amount derivation
// ---------------------------------------------------------------------------

/// Where a displayed payment amount came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayAmount {
    /// Reconstructed from the current unit-type price table.
    Derived(f64),
    /// Fallback to the payment's own stored amount field.
    Stored(f64),
    /// Nothing usable; render the explicit unavailable state, never zero.
    Unavailable,
}

impl DisplayAmount {
    pub fn value(&self) -> Option<f64> {
        match self {
            DisplayAmount::Derived(n) | DisplayAmount::Stored(n) => Some(*n),
            DisplayAmount::Unavailable => None,
        }
    }

    pub fn label(&self) -> String {
        match self.value() {
            Some(n) => format_rupiah(n),
            None => PRICE_UNAVAILABLE_LABEL.to_string(),
        }
    }
}

/// Derive the amount to display for a payment.
///
/// The unit-type price applicable to the joined inquiry's purchase type
/// wins over the payment's stored `amount`, because stored amounts are
/// frequently missing or stale. When the join fails entirely, a finite
/// positive stored amount is still shown; otherwise the explicit
/// unavailable state.
///
/// Note the price table is mutable, so a derived amount is only a
/// best-effort reconstruction of what was owed at payment time. Callers
/// that cache payment details persist the derived value alongside the
/// record so a later price edit does not rewrite cached history.
pub fn derive_payment_amount(payment: &Payment, index: &EntityIndex) -> DisplayAmount {
    let derived = index
        .inquiry_for_payment(payment)
        .and_then(|inquiry| {
            let unit_type = index.unit_type_for_inquiry(inquiry)?;
            Some(match inquiry.purchase_type {
                PurchaseType::Rent => unit_type.rent_price,
                PurchaseType::Sale => unit_type.sale_price,
            })
        })
        .flatten();

    if let Some(n) = derived {
        if n.is_finite() && n > 0.0 {
            return DisplayAmount::Derived(n);
        }
    }

    if let Some(n) = payment.amount {
        if n.is_finite() && n > 0.0 {
            return DisplayAmount::Stored(n);
        }
    }

    DisplayAmount::Unavailable
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

/// Resolve the owning user of a payment: its own `user_id`, else the
/// joined inquiry's.
pub fn payment_owner(payment: &Payment, index: &EntityIndex) -> Option<String> {
    if let Some(uid) = &payment.user_id {
        if !uid.trim().is_empty() {
            return Some(uid.clone());
        }
    }
    index
        .inquiry_for_payment(payment)
        .map(|i| i.user_id.clone())
        .filter(|uid| !uid.trim().is_empty())
}

/// Records are scoped by string equality on the resolved identity. The
/// backend is expected to scope responses already; this check runs
/// client-side as well.
pub fn is_owned_by(identity: &str, owner: Option<&str>) -> bool {
    match owner {
        Some(o) => !identity.is_empty() && o == identity,
        None => false,
    }
}

/// Format an amount the way the front-end shows prices: `Rp` with dotted
/// thousands groups, fractional part dropped.
pub fn format_rupiah(amount: f64) -> String {
    let whole = amount.max(0.0).round() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 3);
    let offset = digits.len() % 3;
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - offset) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    format!("Rp {out}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_type(id: &str, rent: Option<f64>, sale: Option<f64>) -> UnitType {
        UnitType {
            id: id.into(),
            name: format!("Type {id}"),
            floor: None,
            size: None,
            rent_price: rent,
            sale_price: sale,
            status: "available".into(),
            facilities: vec![],
            images: vec![],
        }
    }

    fn inquiry(id: &str, user: &str, type_id: Option<&str>, unit: Option<&str>) -> Inquiry {
        Inquiry {
            id: id.into(),
            user_id: user.into(),
            unit_id: unit.map(Into::into),
            unit_type_id: type_id.map(Into::into),
            purchase_type: PurchaseType::Rent,
            status: "approved".into(),
            address: None,
            created_at: None,
            id_card_photos: vec![],
        }
    }

    fn payment(id: &str, inquiry: Option<&str>, amount: Option<f64>) -> Payment {
        Payment {
            id: id.into(),
            inquiry_id: inquiry.map(Into::into),
            user_id: None,
            amount,
            method: None,
            status: "pending".into(),
            due_date: None,
            paid_at: None,
            proof: vec![],
            invoice_url: None,
            proof_url: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_derived_amount_wins_over_stored() {
        let index = EntityIndex::build(
            vec![unit_type("t1", Some(1_500_000.0), Some(300_000_000.0))],
            vec![],
            vec![inquiry("i1", "u1", Some("t1"), None)],
            vec![],
        );
        let p = payment("p1", Some("i1"), Some(999.0));
        assert_eq!(
            derive_payment_amount(&p, &index),
            DisplayAmount::Derived(1_500_000.0)
        );
    }

    #[test]
    fn test_sale_price_for_sale_inquiries() {
        let mut inq = inquiry("i1", "u1", Some("t1"), None);
        inq.purchase_type = PurchaseType::Sale;
        let index = EntityIndex::build(
            vec![unit_type("t1", Some(1_500_000.0), Some(300_000_000.0))],
            vec![],
            vec![inq],
            vec![],
        );
        let p = payment("p1", Some("i1"), None);
        assert_eq!(
            derive_payment_amount(&p, &index),
            DisplayAmount::Derived(300_000_000.0)
        );
    }

    #[test]
    fn test_unit_type_resolved_via_unit_row() {
        let index = EntityIndex::build(
            vec![unit_type("t2", Some(2_000_000.0), None)],
            vec![Unit {
                id: "u7".into(),
                unit_type_id: "t2".into(),
            }],
            vec![inquiry("i1", "u1", None, Some("u7"))],
            vec![],
        );
        let p = payment("p1", Some("i1"), None);
        assert_eq!(
            derive_payment_amount(&p, &index),
            DisplayAmount::Derived(2_000_000.0)
        );
    }

    #[test]
    fn test_stored_amount_fallback_when_join_fails() {
        let index = EntityIndex::default();
        let p = payment("p1", Some("missing"), Some(750_000.0));
        assert_eq!(
            derive_payment_amount(&p, &index),
            DisplayAmount::Stored(750_000.0)
        );
    }

    #[test]
    fn test_unavailable_never_zero() {
        let index = EntityIndex::default();
        for bad in [None, Some(0.0), Some(-5.0), Some(f64::NAN)] {
            let p = payment("p1", None, bad);
            let amount = derive_payment_amount(&p, &index);
            assert_eq!(amount, DisplayAmount::Unavailable);
            assert_eq!(amount.label(), PRICE_UNAVAILABLE_LABEL);
        }
    }

    #[test]
    fn test_derived_zero_price_falls_through_to_stored() {
        let index = EntityIndex::build(
            vec![unit_type("t1", Some(0.0), None)],
            vec![],
            vec![inquiry("i1", "u1", Some("t1"), None)],
            vec![],
        );
        let p = payment("p1", Some("i1"), Some(500_000.0));
        assert_eq!(
            derive_payment_amount(&p, &index),
            DisplayAmount::Stored(500_000.0)
        );
    }

    #[test]
    fn test_payment_owner_via_inquiry() {
        let index =
            EntityIndex::build(vec![], vec![], vec![inquiry("i1", "3174", None, None)], vec![]);
        let p = payment("p1", Some("i1"), None);
        assert_eq!(payment_owner(&p, &index), Some("3174".to_string()));
        assert!(is_owned_by("3174", payment_owner(&p, &index).as_deref()));
        assert!(!is_owned_by("9999", payment_owner(&p, &index).as_deref()));
        assert!(!is_owned_by("", None));
    }

    #[test]
    fn test_payment_lookup_by_id() {
        let index = EntityIndex::build(vec![], vec![], vec![], vec![payment("p9", None, None)]);
        assert!(index.payment_by_id("p9").is_some());
        assert!(index.payment_by_id("p1").is_none());
    }

    #[test]
    fn test_format_rupiah() {
        assert_eq!(format_rupiah(1_500_000.0), "Rp 1.500.000");
        assert_eq!(format_rupiah(999.0), "Rp 999");
        assert_eq!(format_rupiah(12_345_678.0), "Rp 12.345.678");
    }
}
