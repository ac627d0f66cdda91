// Handlers for vehicle detail, saved listings and owner listing management.

use axum::{
    extract::{Path, Query, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use crate::{
    auth_middleware::{AuthenticatedUser, MaybeUser},
    error::AppError,
    models::VehicleStatus,
    AppState,
};

/// Identifier stored on view records: a user-agent prefix plus a timestamp.
pub(crate) fn viewer_id(headers: &HeaderMap) -> String {
    let agent: String = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .chars()
        .take(50)
        .collect();
    format!("{}_{}", agent, chrono::Utc::now().timestamp_millis())
}

// GET /api/vehicles/:id
pub async fn vehicle_detail(
    State(app_state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let detail = app_state
        .listings
        .vehicle_detail(&id, user.as_ref().map(|u| u.email.as_str()), &viewer_id(&headers))
        .await?;
    Ok(Json(detail))
}

#[derive(Serialize)]
struct SavedResponse {
    saved: bool,
}

// POST /api/vehicles/:id/save
pub async fn toggle_saved(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let saved = app_state.listings.toggle_saved(&user.email, &id).await?;
    Ok(Json(SavedResponse { saved }))
}

// GET /api/saved
pub async fn saved_listings(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(app_state.listings.saved_vehicles(&user.email).await?))
}

#[derive(Deserialize)]
pub struct ListingsQuery {
    q: Option<String>,
}

// GET /api/my-listings?q=civic
pub async fn my_listings(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListingsQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(app_state.listings.my_listings(&user.email, query.q.as_deref()).await?))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    status: VehicleStatus,
}

// PUT /api/my-listings/:id/status
pub async fn change_status(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let VehicleStatus::Other(value) = &request.status {
        return Err(AppError::BadRequest(format!("Unknown listing status: {}", value)));
    }
    Ok(Json(app_state.listings.change_status(&user.email, &id, request.status).await?))
}

// DELETE /api/my-listings/:id
pub async fn delete_listing(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    app_state.listings.delete(&user.email, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/sellers/:email
pub async fn seller_listings(
    State(app_state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(app_state.listings.seller_listings(&email).await?))
}
