// Keyword and AI-tag matching.

use super::criteria::SearchCriteria;
use crate::models::Vehicle;

// A keyword containing the trigger also matches text containing any synonym.
const EXPANSIONS: &[(&str, &[&str])] = &[
    ("luxury", &["leather", "premium", "luxury"]),
    ("efficient", &["hybrid", "electric", "mpg"]),
];

fn keyword_matches(keyword: &str, text: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }
    if text.contains(&keyword) {
        return true;
    }
    EXPANSIONS.iter().any(|(trigger, synonyms)| {
        keyword.contains(trigger) && synonyms.iter().any(|synonym| text.contains(synonym))
    })
}

fn tag_matches(vehicle: &Vehicle, tags: &[String]) -> bool {
    vehicle
        .ai_tags
        .iter()
        .any(|have| tags.iter().any(|wanted| have.eq_ignore_ascii_case(wanted.trim())))
}

/// True when the vehicle matches any keyword or any tag.
/// Blank keywords are dropped; with nothing left every vehicle matches.
pub fn matches(criteria: &SearchCriteria, vehicle: &Vehicle) -> bool {
    let keywords: Vec<&String> = criteria
        .keywords
        .iter()
        .filter(|keyword| !keyword.trim().is_empty())
        .collect();
    if keywords.is_empty() && criteria.tags.is_empty() {
        return true;
    }

    let keyword_hit = !keywords.is_empty() && {
        let text = vehicle.search_text();
        keywords.iter().any(|keyword| keyword_matches(keyword, &text))
    };
    keyword_hit || (!criteria.tags.is_empty() && tag_matches(vehicle, &criteria.tags))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(keywords: &[&str], tags: &[&str]) -> SearchCriteria {
        SearchCriteria {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn luxury_matches_leather() {
        let vehicle = Vehicle {
            description: Some("Black leather seats, one owner".into()),
            ..Default::default()
        };
        assert!(matches(&criteria(&["luxury"], &[]), &vehicle));
        assert!(matches(&criteria(&["Luxury sedan"], &[]), &vehicle));
        assert!(!matches(&criteria(&["sporty"], &[]), &vehicle));
    }

    #[test]
    fn efficient_matches_hybrid_fuel_type() {
        let vehicle = Vehicle {
            fuel_type: Some(crate::models::FuelType::Hybrid),
            ..Default::default()
        };
        assert!(matches(&criteria(&["fuel efficient"], &[]), &vehicle));
    }

    #[test]
    fn keyword_or_tag() {
        let vehicle = Vehicle {
            title: "2020 Subaru Outback".into(),
            ai_tags: vec!["Family-Friendly".into()],
            ..Default::default()
        };
        assert!(matches(&criteria(&["truck"], &["family-friendly"]), &vehicle));
        assert!(matches(&criteria(&["outback"], &["sporty"]), &vehicle));
        assert!(!matches(&criteria(&["truck"], &["sporty"]), &vehicle));
    }

    #[test]
    fn blank_keywords_are_ignored() {
        let vehicle = Vehicle {
            title: "Anything".into(),
            ..Default::default()
        };
        assert!(matches(&criteria(&["", "  "], &[]), &vehicle));
        assert!(matches(&criteria(&[], &[]), &vehicle));
        assert!(!matches(&criteria(&["", "truck"], &[]), &vehicle));
    }
}
