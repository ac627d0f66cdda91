use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;

use crate::{
    auth_middleware::{forget_session, AuthenticatedUser},
    error::AppError,
    AppState,
};

#[derive(Deserialize)]
pub struct LoginQuery {
    redirect: Option<String>,
}

// GET /login?redirect=/vehicles/abc
pub async fn login(State(app_state): State<AppState>, Query(query): Query<LoginQuery>) -> impl IntoResponse {
    let redirect = query.redirect.filter(|r| !r.is_empty()).unwrap_or_else(|| "/".to_string());
    Redirect::to(&app_state.auth.login_url(&redirect))
}

// POST /logout
pub async fn logout(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    forget_session(&user.token);
    app_state.marketplace_state.clear(&user.email).await;
    if let Err(e) = app_state.auth.logout(&user.token).await {
        // The local session is gone either way.
        tracing::warn!(user = %user.email, "Backend logout failed: {:?}", e);
    }
    tracing::info!(user = %user.email, "Signed out");
    Ok(StatusCode::NO_CONTENT)
}
