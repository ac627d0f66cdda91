// Typed filter and search criteria for the marketplace pipeline.
// Clients (and the model behind AI search) send these loosely: empty strings
// for "any", numbers as strings, camelCase keys. Everything is normalised in
// `validate()` before the engine sees it.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

use super::sort::SortOption;
use crate::models::{BodyStyle, Condition, DriveType, FuelType, GeoPoint, SellerType, Vehicle};

/// Smallest accepted upper price bound.
pub const MIN_MAX_PRICE: f64 = 1000.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Minimum price cannot be negative (got {0})")]
    NegativeMinPrice(f64),
    #[error("Maximum price must be at least $1,000 (got {0})")]
    MaxPriceTooLow(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchRadius {
    #[default]
    Unlimited,
    Miles(u32),
}

impl SearchRadius {
    pub fn limit(&self) -> Option<u32> {
        match self {
            SearchRadius::Unlimited => None,
            SearchRadius::Miles(miles) => Some(*miles),
        }
    }
}

impl Serialize for SearchRadius {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SearchRadius::Unlimited => serializer.serialize_str("unlimited"),
            SearchRadius::Miles(miles) => serializer.serialize_u32(*miles),
        }
    }
}

impl<'de> Deserialize<'de> for SearchRadius {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Null => Ok(SearchRadius::Unlimited),
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() || s.eq_ignore_ascii_case("unlimited") {
                    Ok(SearchRadius::Unlimited)
                } else {
                    s.parse::<u32>()
                        .map(SearchRadius::Miles)
                        .map_err(|_| serde::de::Error::custom(format!("invalid search radius '{}'", s)))
                }
            }
            Value::Number(n) => n
                .as_u64()
                .and_then(|miles| u32::try_from(miles).ok())
                .map(SearchRadius::Miles)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid search radius {}", n))),
            other => Err(serde::de::Error::custom(format!("invalid search radius {}", other))),
        }
    }
}

// Accepts a number, a numeric string, an empty string or null.
fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + FromStr,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("'{}' is not a number", s))),
        other => serde_json::from_value(other).map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub label: String,
    pub coordinates: Option<GeoPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    #[serde(alias = "minPrice", deserialize_with = "lenient_number")]
    pub min_price: Option<f64>,
    #[serde(alias = "maxPrice", deserialize_with = "lenient_number")]
    pub max_price: Option<f64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub condition: Option<Condition>,
    pub seller_type: Option<SellerType>,
    pub fuel_type: Option<FuelType>,
    #[serde(alias = "minYear", deserialize_with = "lenient_number")]
    pub min_year: Option<i32>,
    #[serde(alias = "maxYear", deserialize_with = "lenient_number")]
    pub max_year: Option<i32>,
    pub body_style: Option<BodyStyle>,
    pub drive_type: Option<DriveType>,
    #[serde(deserialize_with = "lenient_number")]
    pub seating_capacity: Option<u32>,
    pub features: Vec<String>,
    pub exterior_color: Option<String>,
    pub interior_color: Option<String>,
    pub engine_type: Option<String>,
    #[serde(alias = "userLocation")]
    pub user_location: Option<UserLocation>,
    #[serde(alias = "searchRadius")]
    pub search_radius: SearchRadius,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn known<T>(value: Option<T>, as_str: impl Fn(&T) -> &str) -> Option<T> {
    value.filter(|v| !as_str(v).trim().is_empty())
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

impl FilterCriteria {
    /// Normalises "any" values to `None` and checks the price bounds.
    pub fn validate(self) -> Result<Self, FilterError> {
        if let Some(min) = self.min_price {
            if min < 0.0 {
                return Err(FilterError::NegativeMinPrice(min));
            }
        }
        if let Some(max) = self.max_price {
            if max < MIN_MAX_PRICE {
                return Err(FilterError::MaxPriceTooLow(max));
            }
        }

        let user_location = self.user_location.and_then(|location| {
            let label = location.label.trim().to_string();
            if label.is_empty() && location.coordinates.is_none() {
                None
            } else {
                Some(UserLocation { label, ..location })
            }
        });

        Ok(Self {
            make: non_empty(self.make),
            model: non_empty(self.model),
            trim: non_empty(self.trim),
            condition: known(self.condition, Condition::as_str),
            seller_type: known(self.seller_type, SellerType::as_str),
            fuel_type: known(self.fuel_type, FuelType::as_str),
            body_style: known(self.body_style, BodyStyle::as_str),
            drive_type: known(self.drive_type, DriveType::as_str),
            features: self
                .features
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            exterior_color: non_empty(self.exterior_color),
            interior_color: non_empty(self.interior_color),
            engine_type: non_empty(self.engine_type),
            user_location,
            ..self
        })
    }

    /// Coordinates to measure distances from, when the user gave a location.
    pub fn origin(&self) -> Option<GeoPoint> {
        self.user_location.as_ref().and_then(|location| location.coordinates)
    }

    /// Field filters only; status, keywords and radius are separate stages.
    pub fn matches(&self, vehicle: &Vehicle) -> bool {
        if self.min_price.is_some_and(|min| vehicle.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| vehicle.price > max) {
            return false;
        }
        if let Some(make) = &self.make {
            if !contains_ci(Some(&vehicle.make), make) {
                return false;
            }
        }
        if let Some(model) = &self.model {
            if !contains_ci(Some(&vehicle.model), model) {
                return false;
            }
        }
        if let Some(trim) = &self.trim {
            if !contains_ci(vehicle.trim.as_deref(), trim) {
                return false;
            }
        }
        if !exact(&self.condition, &vehicle.condition, Condition::matches)
            || !exact(&self.seller_type, &vehicle.seller_type, SellerType::matches)
            || !exact(&self.fuel_type, &vehicle.fuel_type, FuelType::matches)
            || !exact(&self.body_style, &vehicle.body_style, BodyStyle::matches)
            || !exact(&self.drive_type, &vehicle.drive_type, DriveType::matches)
        {
            return false;
        }
        if self.min_year.is_some_and(|min| vehicle.year < min) {
            return false;
        }
        if self.max_year.is_some_and(|max| vehicle.year > max) {
            return false;
        }
        if let Some(seats) = self.seating_capacity {
            if vehicle.seating_capacity.map_or(true, |have| have < seats) {
                return false;
            }
        }
        if !self.features.is_empty() {
            if vehicle.features.is_empty() {
                return false;
            }
            let all_present = self.features.iter().all(|wanted| {
                vehicle
                    .features
                    .iter()
                    .any(|have| contains_ci(Some(have), wanted))
            });
            if !all_present {
                return false;
            }
        }
        if let Some(color) = &self.exterior_color {
            if !contains_ci(vehicle.exterior_color.as_deref(), color) {
                return false;
            }
        }
        if let Some(color) = &self.interior_color {
            if !contains_ci(vehicle.interior_color.as_deref(), color) {
                return false;
            }
        }
        if let Some(engine) = &self.engine_type {
            if !contains_ci(vehicle.engine_type.as_deref(), engine) {
                return false;
            }
        }
        true
    }
}

fn exact<T>(wanted: &Option<T>, have: &Option<T>, matches: impl Fn(&T, &T) -> bool) -> bool {
    match (wanted, have) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(wanted), Some(have)) => matches(have, wanted),
    }
}

/// Free-text keywords and AI tags from the search bar or AI search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCriteria {
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
}

impl SearchCriteria {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.tags.is_empty()
    }
}

/// Everything one browsing session has chosen on the marketplace page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceState {
    pub filters: FilterCriteria,
    pub criteria: SearchCriteria,
    pub sort: SortOption,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loose_client_payload_normalises() {
        let filters: FilterCriteria = serde_json::from_value(json!({
            "minPrice": "",
            "maxPrice": "30000",
            "make": "  ",
            "condition": "",
            "body_style": "SUV",
            "features": ["Sunroof", ""],
            "searchRadius": "25"
        }))
        .unwrap();
        let filters = filters.validate().unwrap();

        assert_eq!(filters.min_price, None);
        assert_eq!(filters.max_price, Some(30000.0));
        assert_eq!(filters.make, None);
        assert_eq!(filters.condition, None);
        assert_eq!(filters.body_style, Some(BodyStyle::Suv));
        assert_eq!(filters.features, vec!["Sunroof".to_string()]);
        assert_eq!(filters.search_radius, SearchRadius::Miles(25));
    }

    #[test]
    fn price_bounds_are_checked() {
        let negative = FilterCriteria {
            min_price: Some(-1.0),
            ..Default::default()
        };
        assert_eq!(negative.validate(), Err(FilterError::NegativeMinPrice(-1.0)));

        let too_low = FilterCriteria {
            max_price: Some(999.0),
            ..Default::default()
        };
        assert_eq!(too_low.validate(), Err(FilterError::MaxPriceTooLow(999.0)));
    }

    #[test]
    fn radius_accepts_unlimited_and_numbers() {
        let unlimited: SearchRadius = serde_json::from_value(json!("unlimited")).unwrap();
        let numeric: SearchRadius = serde_json::from_value(json!(50)).unwrap();
        assert_eq!(unlimited, SearchRadius::Unlimited);
        assert_eq!(numeric.limit(), Some(50));
        assert!(serde_json::from_value::<SearchRadius>(json!("far")).is_err());
    }

    #[test]
    fn vehicles_without_the_field_fail_substring_filters() {
        let filters = FilterCriteria {
            engine_type: Some("v6".into()),
            ..Default::default()
        };
        let without = Vehicle::default();
        let with = Vehicle {
            engine_type: Some("3.5L V6".into()),
            ..Default::default()
        };
        assert!(!filters.matches(&without));
        assert!(filters.matches(&with));
    }
}
