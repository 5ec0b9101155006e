//! Unit listing operations.
//!
//! Fetches unit types and unit rows, and provides the client-side
//! filtering/sorting/pagination the listing pages use. All statuses are
//! already normalized by the decode layer.

use serde_json::Value;
use tracing::debug;

use crate::db::DbState;
use crate::decode::{decode_collection, decode_unit, decode_unit_type, unwrap_single};
use crate::models::{Unit, UnitType};
use crate::{api, assets, auth};

// ---------------------------------------------------------------------------
// Fetches
// ---------------------------------------------------------------------------

/// Fetch all unit types. Public endpoint; works without a session.
pub async fn fetch_unit_types(db: &DbState) -> Result<Vec<UnitType>, String> {
    let base = auth::backend_url()?;
    let token = auth::token().unwrap_or_default();
    let resp = api::fetch_from_backend(&base, &token, "/unit-type", "GET", None)
        .await
        .map_err(|e| auth::check_auth_error(db, "fetch_unit_types", e))?;
    let types = decode_collection(&resp, decode_unit_type);
    debug!(count = types.len(), "fetched unit types");
    Ok(types)
}

/// Fetch a single unit type by id.
pub async fn fetch_unit_type(db: &DbState, id: &str) -> Result<UnitType, String> {
    let base = auth::backend_url()?;
    let token = auth::token().unwrap_or_default();
    let resp = api::fetch_from_backend(&base, &token, &format!("/unit-type/{id}"), "GET", None)
        .await
        .map_err(|e| auth::check_auth_error(db, "fetch_unit_type", e))?;
    unwrap_single(&resp)
        .as_ref()
        .and_then(decode_unit_type)
        .ok_or_else(|| format!("Unit type not found: {id}"))
}

/// Fetch the unit join rows.
pub async fn fetch_units(db: &DbState) -> Result<Vec<Unit>, String> {
    let base = auth::backend_url()?;
    let token = auth::token().unwrap_or_default();
    let resp = api::fetch_from_backend(&base, &token, "/unit", "GET", None)
        .await
        .map_err(|e| auth::check_auth_error(db, "fetch_units", e))?;
    Ok(decode_collection(&resp, decode_unit))
}

// ---------------------------------------------------------------------------
// Client-side list shaping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    PriceAsc,
    PriceDesc,
    NameAsc,
}

/// Filters and paging for the listing pages.
#[derive(Debug, Clone)]
pub struct UnitTypeQuery {
    /// Case-insensitive substring match on the name.
    pub search: Option<String>,
    /// Normalized availability status to keep, e.g. `available`.
    pub status: Option<String>,
    pub max_rent_price: Option<f64>,
    pub sort: SortOrder,
    /// 1-based page number.
    pub page: usize,
    pub per_page: usize,
}

impl Default for UnitTypeQuery {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            max_rent_price: None,
            sort: SortOrder::PriceAsc,
            page: 1,
            per_page: 12,
        }
    }
}

/// Apply filters, sort, and paging to a fetched unit-type list.
pub fn filter_unit_types(types: &[UnitType], query: &UnitTypeQuery) -> Vec<UnitType> {
    let mut out: Vec<UnitType> = types
        .iter()
        .filter(|t| {
            if let Some(search) = &query.search {
                if !t.name.to_lowercase().contains(&search.trim().to_lowercase()) {
                    return false;
                }
            }
            if let Some(status) = &query.status {
                if &t.status != status {
                    return false;
                }
            }
            if let Some(max) = query.max_rent_price {
                match t.rent_price {
                    Some(p) if p <= max => {}
                    _ => return false,
                }
            }
            true
        })
        .cloned()
        .collect();

    match query.sort {
        SortOrder::PriceAsc => out.sort_by(|a, b| {
            price_key(a)
                .partial_cmp(&price_key(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        SortOrder::PriceDesc => out.sort_by(|a, b| {
            price_key(b)
                .partial_cmp(&price_key(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        SortOrder::NameAsc => out.sort_by(|a, b| a.name.cmp(&b.name)),
    }

    let page = query.page.max(1);
    let per_page = query.per_page.max(1);
    out.into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect()
}

/// Unlisted prices sort last in ascending order.
fn price_key(t: &UnitType) -> f64 {
    t.rent_price.unwrap_or(f64::MAX)
}

pub fn available_unit_types(types: &[UnitType]) -> Vec<UnitType> {
    types
        .iter()
        .filter(|t| t.status == "available")
        .cloned()
        .collect()
}

/// Ranked URL candidates for every image of a unit type, for the gallery's
/// first-success-wins loader.
pub fn unit_type_image_candidates(unit_type: &UnitType, base_url: &str) -> Vec<Vec<String>> {
    unit_type
        .images
        .iter()
        .map(|path| assets::build_asset_candidates(path, base_url))
        .filter(|c| !c.is_empty())
        .collect()
}

/// JSON view of a unit type for display, with resolved image candidates.
pub fn unit_type_view(unit_type: &UnitType, base_url: &str) -> Value {
    let mut v = serde_json::to_value(unit_type).unwrap_or(Value::Null);
    if let Some(obj) = v.as_object_mut() {
        obj.insert(
            "image_candidates".into(),
            serde_json::to_value(unit_type_image_candidates(unit_type, base_url))
                .unwrap_or(Value::Null),
        );
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_type(name: &str, status: &str, rent: Option<f64>) -> UnitType {
        UnitType {
            id: name.to_lowercase(),
            name: name.into(),
            floor: None,
            size: None,
            rent_price: rent,
            sale_price: None,
            status: status.into(),
            facilities: vec![],
            images: vec!["public/img.png".into()],
        }
    }

    fn sample() -> Vec<UnitType> {
        vec![
            unit_type("Studio", "available", Some(1_500_000.0)),
            unit_type("2 Bedroom", "available", Some(2_800_000.0)),
            unit_type("Penthouse", "booked", None),
        ]
    }

    #[test]
    fn test_filter_by_search_and_status() {
        let types = sample();
        let query = UnitTypeQuery {
            search: Some("studio".into()),
            ..Default::default()
        };
        let out = filter_unit_types(&types, &query);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Studio");

        let query = UnitTypeQuery {
            status: Some("available".into()),
            ..Default::default()
        };
        assert_eq!(filter_unit_types(&types, &query).len(), 2);
    }

    #[test]
    fn test_sort_price_desc_and_missing_prices_last_asc() {
        let types = sample();
        let query = UnitTypeQuery {
            sort: SortOrder::PriceDesc,
            ..Default::default()
        };
        let out = filter_unit_types(&types, &query);
        assert_eq!(out[0].name, "Penthouse"); // f64::MAX key sorts first desc
        let query = UnitTypeQuery {
            sort: SortOrder::PriceAsc,
            ..Default::default()
        };
        let out = filter_unit_types(&types, &query);
        assert_eq!(out.last().unwrap().name, "Penthouse");
        assert_eq!(out[0].name, "Studio");
    }

    #[test]
    fn test_pagination() {
        let types = sample();
        let query = UnitTypeQuery {
            per_page: 2,
            page: 2,
            ..Default::default()
        };
        let out = filter_unit_types(&types, &query);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_available_filter() {
        assert_eq!(available_unit_types(&sample()).len(), 2);
    }

    #[test]
    fn test_image_candidates_attached() {
        let view = unit_type_view(&sample()[0], "https://api.example.com");
        let candidates = view["image_candidates"][0]
            .as_array()
            .expect("candidate list");
        assert!(!candidates.is_empty());
        assert_eq!(
            candidates[0].as_str().unwrap(),
            "https://api.example.com/storage/img.png"
        );
    }
}
