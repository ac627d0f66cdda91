// Handlers for the listing wizard. Each request takes a copy of the draft,
// works on it and stores it back.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::read_uploads;
use crate::{
    auth_middleware::AuthenticatedUser,
    error::AppError,
    wizard::{FormPatch, ListingWizard, WizardStep},
    AppState,
};

async fn load(app_state: &AppState, user: &AuthenticatedUser, id: Uuid) -> Result<ListingWizard, AppError> {
    Ok(app_state.drafts.get(id, &user.email).await?)
}

async fn store(app_state: &AppState, wizard: ListingWizard) -> Json<ListingWizard> {
    app_state.drafts.put(&wizard).await;
    Json(wizard)
}

#[derive(Deserialize, Default)]
pub struct CreateDraftRequest {
    vehicle_id: Option<String>,
}

// POST /api/drafts
pub async fn create_draft(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    request: Option<Json<CreateDraftRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let wizard = match request.vehicle_id {
        Some(vehicle_id) => app_state.wizard.load_for_edit(&user.email, &vehicle_id).await?,
        None => ListingWizard::new(user.email.as_str()),
    };
    tracing::info!(draft = %wizard.id, editing = ?wizard.editing, user = %user.email, "Draft opened");
    let wizard = app_state.drafts.insert(wizard).await;
    Ok((StatusCode::CREATED, Json(wizard)))
}

// GET /api/drafts/:id
pub async fn get_draft(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ListingWizard>, AppError> {
    Ok(Json(load(&app_state, &user, id).await?))
}

// PATCH /api/drafts/:id
pub async fn update_draft(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<FormPatch>,
) -> Result<Json<ListingWizard>, AppError> {
    let mut wizard = load(&app_state, &user, id).await?;
    patch.apply(&mut wizard.form);
    Ok(store(&app_state, wizard).await)
}

// POST /api/drafts/:id/next
pub async fn next_step(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ListingWizard>, AppError> {
    let mut wizard = load(&app_state, &user, id).await?;
    wizard.next()?;
    Ok(store(&app_state, wizard).await)
}

// POST /api/drafts/:id/back
pub async fn previous_step(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ListingWizard>, AppError> {
    let mut wizard = load(&app_state, &user, id).await?;
    wizard.back()?;
    Ok(store(&app_state, wizard).await)
}

#[derive(Deserialize)]
pub struct StepRequest {
    step: WizardStep,
}

// POST /api/drafts/:id/step
pub async fn go_to_step(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<StepRequest>,
) -> Result<Json<ListingWizard>, AppError> {
    let mut wizard = load(&app_state, &user, id).await?;
    wizard.go_to(request.step)?;
    Ok(store(&app_state, wizard).await)
}

#[derive(Deserialize)]
pub struct VinRequest {
    vin: String,
}

// POST /api/drafts/:id/vin
pub async fn decode_vin(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<VinRequest>,
) -> Result<Json<ListingWizard>, AppError> {
    let mut wizard = load(&app_state, &user, id).await?;
    app_state.wizard.decode_vin(&mut wizard, &request.vin).await?;
    Ok(store(&app_state, wizard).await)
}

// POST /api/drafts/:id/vin/clear
pub async fn clear_vin(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ListingWizard>, AppError> {
    let mut wizard = load(&app_state, &user, id).await?;
    app_state.wizard.clear_vin(&mut wizard);
    Ok(store(&app_state, wizard).await)
}

#[derive(Serialize)]
struct TitleResponse {
    title: String,
}

// POST /api/drafts/:id/title
pub async fn generate_title(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut wizard = load(&app_state, &user, id).await?;
    let title = app_state.wizard.generate_title(&mut wizard).await?;
    app_state.drafts.put(&wizard).await;
    Ok(Json(TitleResponse { title }))
}

// POST /api/drafts/:id/images (multipart, one or more files)
pub async fn upload_images(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ListingWizard>, AppError> {
    let files = read_uploads(multipart).await?;
    if files.is_empty() {
        return Err(AppError::BadRequest("No image files in the upload".to_string()));
    }
    let mut wizard = load(&app_state, &user, id).await?;
    app_state.wizard.upload_images(&mut wizard, files).await?;
    Ok(store(&app_state, wizard).await)
}

#[derive(Deserialize)]
pub struct ImageOrderRequest {
    images: Vec<String>,
}

// PUT /api/drafts/:id/images
pub async fn reorder_images(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ImageOrderRequest>,
) -> Result<Json<ListingWizard>, AppError> {
    let mut wizard = load(&app_state, &user, id).await?;
    app_state.wizard.set_image_order(&mut wizard, request.images).await?;
    Ok(store(&app_state, wizard).await)
}

// POST /api/drafts/:id/carfax (multipart, a single PDF)
pub async fn upload_carfax(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ListingWizard>, AppError> {
    let file = read_uploads(multipart)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::BadRequest("No Carfax report in the upload".to_string()))?;
    let mut wizard = load(&app_state, &user, id).await?;
    let result = app_state.wizard.ingest_carfax(&mut wizard, file).await;
    // The uploaded report URL is kept even when extraction fails.
    app_state.drafts.put(&wizard).await;
    result?;
    Ok(Json(wizard))
}

// POST /api/drafts/:id/publish
pub async fn publish(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let wizard = load(&app_state, &user, id).await?;
    let vehicle = app_state.wizard.publish(&wizard).await?;
    app_state.drafts.remove(id).await;
    let status = if wizard.is_editing() { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(vehicle)))
}

// POST /api/drafts/:id/save
pub async fn save_progress(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let wizard = load(&app_state, &user, id).await?;
    Ok(Json(app_state.wizard.save_progress(&wizard).await?))
}
