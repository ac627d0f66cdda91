// Sort options offered on the marketplace page.
// Keys are the backend's sort strings; a leading '-' means descending.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;

use super::RankedVehicle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOption {
    #[default]
    Newest,
    Oldest,
    PriceLowToHigh,
    PriceHighToLow,
    MileageLowToHigh,
    MileageHighToLow,
    YearOldest,
    YearNewest,
    Distance,
    TitleAToZ,
    TitleZToA,
    ConditionScore,
}

impl SortOption {
    pub const ALL: [SortOption; 12] = [
        SortOption::Newest,
        SortOption::Oldest,
        SortOption::PriceLowToHigh,
        SortOption::PriceHighToLow,
        SortOption::MileageLowToHigh,
        SortOption::MileageHighToLow,
        SortOption::YearOldest,
        SortOption::YearNewest,
        SortOption::Distance,
        SortOption::TitleAToZ,
        SortOption::TitleZToA,
        SortOption::ConditionScore,
    ];

    /// Unknown keys fall back to newest first.
    pub fn from_key(key: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|option| option.as_key() == key.trim())
            .unwrap_or_default()
    }

    pub fn as_key(&self) -> &'static str {
        match self {
            SortOption::Newest => "-created_date",
            SortOption::Oldest => "created_date",
            SortOption::PriceLowToHigh => "price",
            SortOption::PriceHighToLow => "-price",
            SortOption::MileageLowToHigh => "mileage",
            SortOption::MileageHighToLow => "-mileage",
            SortOption::YearOldest => "year",
            SortOption::YearNewest => "-year",
            SortOption::Distance => "distance",
            SortOption::TitleAToZ => "title",
            SortOption::TitleZToA => "-title",
            SortOption::ConditionScore => "-ai_condition_score",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortOption::Newest => "Newest Listed",
            SortOption::Oldest => "Oldest Listed",
            SortOption::PriceLowToHigh => "Price: Low to High",
            SortOption::PriceHighToLow => "Price: High to Low",
            SortOption::MileageLowToHigh => "Mileage: Low to High",
            SortOption::MileageHighToLow => "Mileage: High to Low",
            SortOption::YearOldest => "Year: Oldest First",
            SortOption::YearNewest => "Year: Newest First",
            SortOption::Distance => "Distance: Nearest First",
            SortOption::TitleAToZ => "Title: A to Z",
            SortOption::TitleZToA => "Title: Z to A",
            SortOption::ConditionScore => "Best AI Condition",
        }
    }

    fn compare(&self, a: &RankedVehicle, b: &RankedVehicle) -> Ordering {
        let (va, vb) = (&a.vehicle, &b.vehicle);
        match self {
            SortOption::Newest => vb.created_date.cmp(&va.created_date),
            SortOption::Oldest => va.created_date.cmp(&vb.created_date),
            SortOption::PriceLowToHigh => va.price.total_cmp(&vb.price),
            SortOption::PriceHighToLow => vb.price.total_cmp(&va.price),
            SortOption::MileageLowToHigh => va.mileage.cmp(&vb.mileage),
            SortOption::MileageHighToLow => vb.mileage.cmp(&va.mileage),
            SortOption::YearOldest => va.year.cmp(&vb.year),
            SortOption::YearNewest => vb.year.cmp(&va.year),
            SortOption::Distance => match (a.distance, b.distance) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            SortOption::TitleAToZ => title_key(a).cmp(&title_key(b)),
            SortOption::TitleZToA => title_key(b).cmp(&title_key(a)),
            SortOption::ConditionScore => vb.condition_score().total_cmp(&va.condition_score()),
        }
    }

    /// Stable sort; ties keep their input order.
    pub fn apply(&self, vehicles: &mut [RankedVehicle]) {
        vehicles.sort_by(|a, b| self.compare(a, b));
    }
}

fn title_key(ranked: &RankedVehicle) -> String {
    ranked.vehicle.display_title().to_lowercase()
}

impl Serialize for SortOption {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_key())
    }
}

impl<'de> Deserialize<'de> for SortOption {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = Option::<String>::deserialize(deserializer)?;
        Ok(key.as_deref().map(SortOption::from_key).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AiAnalysis, Vehicle};

    fn ranked(id: &str, title: &str, score: Option<f64>, distance: Option<u32>) -> RankedVehicle {
        RankedVehicle {
            vehicle: Vehicle {
                id: id.into(),
                title: title.into(),
                ai_analysis: score.map(|s| AiAnalysis {
                    condition_score: Some(s),
                    ..Default::default()
                }),
                ..Default::default()
            },
            distance,
        }
    }

    fn ids(list: &[RankedVehicle]) -> Vec<&str> {
        list.iter().map(|r| r.vehicle.id.as_str()).collect()
    }

    #[test]
    fn keys_round_trip_and_unknown_falls_back() {
        for option in SortOption::ALL {
            assert_eq!(SortOption::from_key(option.as_key()), option);
        }
        assert_eq!(SortOption::from_key("-horsepower"), SortOption::Newest);
    }

    #[test]
    fn distance_puts_unknown_last() {
        let mut list = vec![
            ranked("a", "", None, None),
            ranked("b", "", None, Some(40)),
            ranked("c", "", None, Some(10)),
        ];
        SortOption::Distance.apply(&mut list);
        assert_eq!(ids(&list), vec!["c", "b", "a"]);
    }

    #[test]
    fn title_is_case_insensitive() {
        let mut list = vec![
            ranked("a", "zephyr", None, None),
            ranked("b", "Accord", None, None),
            ranked("c", "bronco", None, None),
        ];
        SortOption::TitleAToZ.apply(&mut list);
        assert_eq!(ids(&list), vec!["b", "c", "a"]);
    }

    #[test]
    fn missing_condition_score_counts_as_zero() {
        let mut list = vec![
            ranked("a", "", None, None),
            ranked("b", "", Some(7.5), None),
            ranked("c", "", Some(9.0), None),
        ];
        SortOption::ConditionScore.apply(&mut list);
        assert_eq!(ids(&list), vec!["c", "b", "a"]);
    }
}
