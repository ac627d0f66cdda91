// Handlers for marketplace search, session state and user location.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use crate::{
    auth_middleware::MaybeUser,
    error::AppError,
    models::GeoPoint,
    search::{paginate, GuidedOutcome, GuidedTurn, MarketplaceState, Page, RankedVehicle, SortOption, UserLocation},
    AppState,
};

const SESSION_HEADER: &str = "x-session-id";

/// Signed-in users keep their state by email; anonymous browsers by the session header.
fn session_key(user: &MaybeUser, headers: &HeaderMap) -> Option<String> {
    if let MaybeUser(Some(user)) = user {
        return Some(user.email.clone());
    }
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| format!("session:{}", v))
}

fn validated(mut state: MarketplaceState) -> Result<MarketplaceState, AppError> {
    state.filters = state.filters.validate()?;
    Ok(state)
}

async fn run_search(
    app_state: &AppState,
    state: &MarketplaceState,
    page: usize,
    page_size: Option<usize>,
) -> Result<Page<RankedVehicle>, AppError> {
    let results = app_state.search.search(state).await.map_err(AppError::Upstream)?;
    let page_size = page_size.unwrap_or(app_state.settings.marketplace.page_size);
    Ok(paginate(results, page, page_size))
}

#[derive(Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    state: Option<MarketplaceState>,
    #[serde(default)]
    page: usize,
    page_size: Option<usize>,
}

// POST /api/marketplace/search
// Without a `state` in the body the stored session state is used.
pub async fn search(
    State(app_state): State<AppState>,
    user: MaybeUser,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = session_key(&user, &headers);
    let state = match (request.state, &session) {
        (Some(state), session) => {
            let state = validated(state)?;
            if let Some(session) = session {
                app_state.marketplace_state.put(session, state.clone()).await;
            }
            state
        }
        (None, Some(session)) => app_state.marketplace_state.get(session).await,
        (None, None) => MarketplaceState::default(),
    };

    let page = run_search(&app_state, &state, request.page, request.page_size).await?;
    tracing::info!(total = page.total, page = page.page, sort = state.sort.as_key(), "Marketplace search");
    Ok(Json(page))
}

// GET /api/marketplace/state
pub async fn get_state(
    State(app_state): State<AppState>,
    user: MaybeUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let state = match session_key(&user, &headers) {
        Some(session) => app_state.marketplace_state.get(&session).await,
        None => MarketplaceState::default(),
    };
    Ok(Json(state))
}

// PUT /api/marketplace/state
pub async fn put_state(
    State(app_state): State<AppState>,
    user: MaybeUser,
    headers: HeaderMap,
    Json(state): Json<MarketplaceState>,
) -> Result<impl IntoResponse, AppError> {
    let session = session_key(&user, &headers)
        .ok_or_else(|| AppError::BadRequest(format!("Sign in or send an {} header", SESSION_HEADER)))?;
    let state = validated(state)?;
    app_state.marketplace_state.put(&session, state).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct AiSearchRequest {
    query: String,
    #[serde(default)]
    sort: SortOption,
}

#[derive(Serialize)]
pub struct AiSearchResponse {
    state: MarketplaceState,
    results: Page<RankedVehicle>,
}

// POST /api/marketplace/ai-search
pub async fn ai_search(
    State(app_state): State<AppState>,
    user: MaybeUser,
    headers: HeaderMap,
    Json(request): Json<AiSearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let state = app_state.search.ai_search(&request.query, request.sort).await?;
    if let Some(session) = session_key(&user, &headers) {
        app_state.marketplace_state.put(&session, state.clone()).await;
    }
    let results = run_search(&app_state, &state, 1, None).await?;
    Ok(Json(AiSearchResponse { state, results }))
}

#[derive(Deserialize)]
pub struct GuidedSearchRequest {
    turns: Vec<GuidedTurn>,
    #[serde(default)]
    sort: SortOption,
}

#[derive(Serialize)]
pub struct GuidedSearchResponse {
    #[serde(flatten)]
    outcome: GuidedOutcome,
    results: Option<Page<RankedVehicle>>,
}

// POST /api/marketplace/guided-search
pub async fn guided_search(
    State(app_state): State<AppState>,
    user: MaybeUser,
    headers: HeaderMap,
    Json(request): Json<GuidedSearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = app_state.search.guided_search(&request.turns, request.sort).await?;
    let results = match &outcome.state {
        Some(state) => {
            if let Some(session) = session_key(&user, &headers) {
                app_state.marketplace_state.put(&session, state.clone()).await;
            }
            Some(run_search(&app_state, state, 1, None).await?)
        }
        None => None,
    };
    Ok(Json(GuidedSearchResponse { outcome, results }))
}

#[derive(Deserialize)]
pub struct GeocodeRequest {
    location: String,
}

// POST /api/location/geocode
pub async fn geocode(
    State(app_state): State<AppState>,
    Json(request): Json<GeocodeRequest>,
) -> Result<Json<UserLocation>, AppError> {
    Ok(Json(app_state.search.geocode_location(&request.location).await?))
}

// POST /api/location/reverse
pub async fn reverse_geocode(
    State(app_state): State<AppState>,
    Json(point): Json<GeoPoint>,
) -> Result<Json<UserLocation>, AppError> {
    Ok(Json(app_state.search.reverse_location(point).await?))
}
