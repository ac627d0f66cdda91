use axum::{
    extract::{Multipart, State},
    response::Json,
};
use serde::Deserialize;

use super::read_uploads;
use crate::{
    auth_middleware::AuthenticatedUser,
    error::AppError,
    models::{User, UserPatch},
    AppState,
};

// GET /api/profile
pub async fn get_profile(State(app_state): State<AppState>, user: AuthenticatedUser) -> Result<Json<User>, AppError> {
    Ok(Json(app_state.profile.get(&user.token).await?))
}

// PUT /api/profile
pub async fn update_profile(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(patch): Json<UserPatch>,
) -> Result<Json<User>, AppError> {
    Ok(Json(app_state.profile.update(&user.token, patch).await?))
}

// POST /api/profile/picture (multipart, a single image)
pub async fn upload_picture(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<User>, AppError> {
    let file = read_uploads(multipart)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::BadRequest("No image in the upload".to_string()))?;
    Ok(Json(app_state.profile.upload_picture(&user.token, file).await?))
}

#[derive(Deserialize)]
pub struct GeneratePictureRequest {
    prompt: String,
}

// POST /api/profile/picture/generate
pub async fn generate_picture(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<GeneratePictureRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(app_state.profile.generate_picture(&user.token, &request.prompt).await?))
}
