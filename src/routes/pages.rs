use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse},
};
use serde::Deserialize;

use super::vehicles::viewer_id;
use crate::{
    error::AppError,
    listings::VehicleDetail,
    search::{paginate, MarketplaceState, Page, RankedVehicle, SortOption},
    AppState,
};

struct SortChoice {
    key: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Template)]
#[template(path = "marketplace.html")]
struct MarketplaceTemplate {
    results: Page<RankedVehicle>,
    sort: SortOption,
    sort_options: Vec<SortChoice>,
}

#[derive(Template)]
#[template(path = "vehicle.html")]
struct VehicleTemplate {
    detail: VehicleDetail,
}

fn render(template: impl Template, name: &str) -> Result<Html<String>, AppError> {
    match template.render() {
        Ok(html) => Ok(Html(html)),
        Err(e) => {
            tracing::error!("Failed to render {} template: {}", name, e);
            Err(AppError::InternalServerError(anyhow::Error::new(e)))
        }
    }
}

#[derive(Deserialize)]
pub struct MarketplaceQuery {
    #[serde(default)]
    page: usize,
    sort: Option<String>,
}

// GET /
// Server-rendered first page with default filters; the client takes over through the JSON API.
pub async fn marketplace_page(
    State(app_state): State<AppState>,
    Query(query): Query<MarketplaceQuery>,
) -> Result<impl IntoResponse, AppError> {
    let state = MarketplaceState {
        sort: query.sort.as_deref().map(SortOption::from_key).unwrap_or_default(),
        ..Default::default()
    };
    let results = app_state.search.search(&state).await.map_err(AppError::Upstream)?;
    let template = MarketplaceTemplate {
        results: paginate(results, query.page, app_state.settings.marketplace.page_size),
        sort: state.sort,
        sort_options: SortOption::ALL
            .iter()
            .map(|option| SortChoice {
                key: option.as_key(),
                label: option.label(),
                selected: *option == state.sort,
            })
            .collect(),
    };
    render(template, "marketplace")
}

// GET /vehicles/:id
pub async fn vehicle_page(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let detail = app_state.listings.vehicle_detail(&id, None, &viewer_id(&headers)).await?;
    render(VehicleTemplate { detail }, "vehicle")
}
