// Natural-language and guided search, plus user location resolution.
// The model only ever proposes criteria; they go through the same
// validation as criteria typed by hand, except that out-of-range price
// bounds are dropped instead of rejected.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    criteria::{FilterCriteria, MarketplaceState, SearchCriteria, SearchRadius, UserLocation, MIN_MAX_PRICE},
    SearchError, SearchService,
};
use crate::{
    integrations::{invoke_structured, LlmRequest},
    models::GeoPoint,
};

const AI_TAGS: [&str; 9] = [
    "sporty",
    "luxury",
    "reliable",
    "family-friendly",
    "off-road",
    "commuter",
    "economical",
    "safe",
    "high-performance",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct UserIntent {
    purpose: Option<String>,
    priorities: Option<Vec<String>>,
    lifestyle: Option<String>,
}

/// Criteria proposed by the model, in the shape of its JSON schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProposedCriteria {
    #[serde(flatten)]
    filters: FilterCriteria,
    keywords: Option<Vec<String>>,
    ai_tags: Option<Vec<String>>,
    #[serde(rename = "userIntent", alias = "user_intent")]
    user_intent: Option<UserIntent>,
    location: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    radius: Option<SearchRadius>,
}

impl ProposedCriteria {
    /// Builds a fresh marketplace state: every filter the model did not set is
    /// reset, the sort is kept.
    fn into_state(self, sort: super::SortOption) -> Result<MarketplaceState, SearchError> {
        let intent = self.user_intent.unwrap_or_default();
        let keywords: Vec<String> = self
            .keywords
            .unwrap_or_default()
            .into_iter()
            .chain(intent.purpose)
            .chain(intent.priorities.unwrap_or_default())
            .chain(intent.lifestyle)
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty())
            .collect();

        let coordinates = match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        };
        let user_location = self.location.map(|label| UserLocation { label, coordinates });

        // Out-of-range bounds from the model are dropped rather than failing the search.
        let mut proposed = self.filters;
        if let Some(min) = proposed.min_price.filter(|min| *min < 0.0) {
            tracing::warn!(min_price = min, "Ignoring negative minimum price from the model");
            proposed.min_price = None;
        }
        if let Some(max) = proposed.max_price.filter(|max| *max < MIN_MAX_PRICE) {
            tracing::warn!(max_price = max, "Ignoring out-of-range maximum price from the model");
            proposed.max_price = None;
        }

        let filters = FilterCriteria {
            user_location,
            search_radius: self.radius.unwrap_or_default(),
            ..proposed
        }
        .validate()?;

        Ok(MarketplaceState {
            filters,
            criteria: SearchCriteria {
                keywords,
                tags: self.ai_tags.unwrap_or_default(),
            },
            sort,
        })
    }
}

fn filter_properties() -> Value {
    json!({
        "body_style": {
            "type": "string",
            "enum": ["sedan", "suv", "truck", "coupe", "convertible", "hatchback", "wagon", "van"],
            "description": "The primary vehicle body style inferred from the query."
        },
        "minPrice": { "type": "integer", "description": "Minimum price inferred from budget terms" },
        "maxPrice": { "type": "integer", "description": "Maximum price inferred from budget terms" },
        "make": { "type": "string", "description": "Specific brand if mentioned" },
        "model": { "type": "string", "description": "Specific model if mentioned" },
        "condition": { "type": "string", "enum": ["new", "excellent", "good", "fair"] },
        "drive_type": { "type": "string", "enum": ["awd", "fwd", "rwd"] },
        "fuel_type": { "type": "string", "enum": ["gasoline", "hybrid", "electric", "diesel"] },
        "minYear": { "type": "integer" },
        "maxYear": { "type": "integer" },
        "keywords": {
            "type": "array",
            "items": { "type": "string" },
            "description": "Keywords for a broad text search"
        },
        "ai_tags": {
            "type": "array",
            "items": { "type": "string", "enum": AI_TAGS }
        }
    })
}

fn search_schema() -> Value {
    let mut properties = filter_properties();
    properties["userIntent"] = json!({
        "type": "object",
        "properties": {
            "purpose": { "type": "string", "description": "Primary use case (family, commuting, work, ...)" },
            "priorities": { "type": "array", "items": { "type": "string" } },
            "lifestyle": { "type": "string", "description": "Lifestyle context (urban, suburban, rural, ...)" }
        }
    });
    json!({ "type": "object", "properties": properties })
}

fn search_prompt(query: &str) -> String {
    format!(
        "You are a car shopping assistant. Translate the shopper's request into structured \
         search filters for a vehicle marketplace.\n\n\
         Request: \"{query}\"\n\n\
         Interpret intent: \"family car\" implies suv/minivan and the \"family-friendly\" tag; \
         \"fast car\" implies coupe or sedan and the \"sporty\" tag; a budget such as \
         \"under $30k\" sets maxPrice to 30000; \"newer than 2020\" sets minYear to 2020; \
         \"AWD\" sets drive_type to \"awd\".\n\n\
         Only include a field when it can be inferred with confidence. Tags must come from: {tags}.",
        query = query,
        tags = AI_TAGS.join(", "),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidedTurn {
    pub speaker: Speaker,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct GuidedReply {
    #[serde(default)]
    message: String,
    #[serde(default)]
    search_ready: bool,
    #[serde(default)]
    search_criteria: Option<ProposedCriteria>,
    #[serde(default)]
    progress_percentage: Option<u8>,
}

/// The assistant's next turn; `state` is set once it has enough to search.
#[derive(Debug, Clone, Serialize)]
pub struct GuidedOutcome {
    pub message: String,
    pub search_ready: bool,
    pub progress_percentage: u8,
    pub state: Option<MarketplaceState>,
}

fn guided_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "message": { "type": "string", "description": "Your conversational response to the user" },
            "search_ready": { "type": "boolean" },
            "search_criteria": { "type": "object", "properties": filter_properties() },
            "progress_percentage": { "type": "integer", "description": "Progress toward a search (10-100)" }
        },
        "required": ["message", "search_ready", "progress_percentage"]
    })
}

fn guided_prompt(turns: &[GuidedTurn]) -> String {
    let history = turns
        .iter()
        .map(|turn| {
            let who = match turn.speaker {
                Speaker::User => "User",
                Speaker::Assistant => "Assistant",
            };
            format!("{}: {}", who, turn.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a car shopping consultant running a guided search. Ask ONE focused question \
         at a time, in this order: body style, budget, primary usage, key preferences. After \
         4-6 exchanges, or as soon as you know a body style and/or budget, set search_ready \
         to true and fill search_criteria.\n\n\
         Leave every filter null unless the user stated a specific positive preference. A single \
         budget number sets maxPrice only; a range sets both bounds. \"Any\" or \"no preference\" \
         keeps the filter null.\n\n\
         Conversation so far:\n{history}\n\nRespond in JSON."
    )
}

impl SearchService {
    /// Maps a natural-language query onto a fresh marketplace state.
    pub async fn ai_search(&self, query: &str, sort: super::SortOption) -> Result<MarketplaceState, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let request = LlmRequest::new(search_prompt(query)).with_schema(search_schema());
        let proposed: ProposedCriteria = invoke_structured(self.integrations.as_ref(), request)
            .await
            .map_err(SearchError::Upstream)?;

        let mut state = proposed.into_state(sort)?;
        self.locate_filters(&mut state.filters).await;
        tracing::info!(
            query,
            keywords = state.criteria.keywords.len(),
            tags = state.criteria.tags.len(),
            "AI search mapped to criteria"
        );
        Ok(state)
    }

    /// One guided-search exchange. The last turn must be the user's.
    pub async fn guided_search(&self, turns: &[GuidedTurn], sort: super::SortOption) -> Result<GuidedOutcome, SearchError> {
        match turns.last() {
            Some(turn) if turn.speaker == Speaker::User && !turn.content.trim().is_empty() => {}
            _ => return Err(SearchError::NoUserTurn),
        }

        let request = LlmRequest::new(guided_prompt(turns)).with_schema(guided_schema());
        let reply: GuidedReply = invoke_structured(self.integrations.as_ref(), request)
            .await
            .map_err(SearchError::Upstream)?;

        let state = match (reply.search_ready, reply.search_criteria) {
            (true, Some(criteria)) => {
                let mut state = criteria.into_state(sort)?;
                self.locate_filters(&mut state.filters).await;
                Some(state)
            }
            _ => None,
        };

        Ok(GuidedOutcome {
            message: reply.message,
            search_ready: state.is_some(),
            progress_percentage: reply.progress_percentage.unwrap_or(10).min(100),
            state,
        })
    }

    // A location label without coordinates is forward-geocoded; failures leave
    // it without coordinates, which disables the distance stage.
    async fn locate_filters(&self, filters: &mut FilterCriteria) {
        let Some(location) = filters.user_location.as_mut() else {
            return;
        };
        if location.coordinates.is_some() || location.label.is_empty() {
            return;
        }
        match self.geocoder.geocode(&location.label).await {
            Ok(Some(result)) => location.coordinates = Some(result.point),
            Ok(None) => tracing::debug!(location = %location.label, "User location not found"),
            Err(e) => tracing::warn!(location = %location.label, "Failed to geocode user location: {:?}", e),
        }
    }

    /// Resolves a typed "City, State" to a user location with coordinates.
    pub async fn geocode_location(&self, label: &str) -> Result<UserLocation, SearchError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(SearchError::EmptyLocation);
        }
        let result = self
            .geocoder
            .geocode(label)
            .await
            .map_err(SearchError::Upstream)?
            .ok_or(SearchError::LocationNotFound)?;
        Ok(UserLocation {
            label: result.label.unwrap_or_else(|| label.to_string()),
            coordinates: Some(result.point),
        })
    }

    /// Turns browser coordinates into a labelled user location.
    pub async fn reverse_location(&self, point: GeoPoint) -> Result<UserLocation, SearchError> {
        let label = self
            .geocoder
            .reverse(point)
            .await
            .map_err(SearchError::Upstream)?
            .ok_or(SearchError::LocationNotFound)?;
        Ok(UserLocation {
            label,
            coordinates: Some(point),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BodyStyle;

    #[test]
    fn intent_extends_keywords_and_resets_other_filters() {
        let proposed: ProposedCriteria = serde_json::from_value(json!({
            "body_style": "suv",
            "maxPrice": 30000,
            "make": null,
            "keywords": ["family", ""],
            "ai_tags": ["family-friendly"],
            "userIntent": {
                "purpose": "school runs",
                "priorities": ["safety", "space"],
                "lifestyle": ""
            }
        }))
        .unwrap();

        let state = proposed.into_state(super::super::SortOption::PriceLowToHigh).unwrap();
        assert_eq!(state.filters.body_style, Some(BodyStyle::Suv));
        assert_eq!(state.filters.max_price, Some(30000.0));
        assert_eq!(state.filters.make, None);
        assert_eq!(state.filters.search_radius, SearchRadius::Unlimited);
        assert_eq!(state.criteria.keywords, vec!["family", "school runs", "safety", "space"]);
        assert_eq!(state.criteria.tags, vec!["family-friendly"]);
        assert_eq!(state.sort, super::super::SortOption::PriceLowToHigh);
    }

    #[test]
    fn out_of_range_model_prices_are_dropped() {
        let proposed: ProposedCriteria =
            serde_json::from_value(json!({ "maxPrice": 500, "minPrice": -10, "make": "Honda" })).unwrap();
        let state = proposed.into_state(Default::default()).unwrap();
        assert_eq!(state.filters.max_price, None);
        assert_eq!(state.filters.min_price, None);
        assert_eq!(state.filters.make.as_deref(), Some("Honda"));

        let proposed: ProposedCriteria = serde_json::from_value(json!({ "maxPrice": 1000 })).unwrap();
        let state = proposed.into_state(Default::default()).unwrap();
        assert_eq!(state.filters.max_price, Some(1000.0));
    }

    #[test]
    fn guided_prompt_lists_turns_in_order() {
        let prompt = guided_prompt(&[
            GuidedTurn {
                speaker: Speaker::Assistant,
                content: "What type of vehicle?".into(),
            },
            GuidedTurn {
                speaker: Speaker::User,
                content: "An SUV".into(),
            },
        ]);
        let assistant = prompt.find("Assistant: What type").unwrap();
        let user = prompt.find("User: An SUV").unwrap();
        assert!(assistant < user);
    }
}
