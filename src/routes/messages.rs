// Handlers for message threads, sends and offers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;

use crate::{auth_middleware::AuthenticatedUser, error::AppError, models::User, AppState};

#[derive(Deserialize)]
pub struct ThreadsQuery {
    q: Option<String>,
}

// GET /api/threads?q=civic
pub async fn list_threads(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ThreadsQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(app_state.messaging.list_threads(&user.email, query.q.as_deref()).await?))
}

#[derive(Deserialize)]
pub struct StartThreadRequest {
    vehicle_id: String,
}

// POST /api/threads
pub async fn start_thread(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<StartThreadRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Only used for the display name in the announcement.
    let buyer = match app_state.auth.me(&user.token).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(user = %user.email, "Failed to load profile for new thread: {:?}", e);
            User {
                email: user.email.clone(),
                ..Default::default()
            }
        }
    };
    let thread = app_state.messaging.start_thread(&buyer, &request.vehicle_id).await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

// GET /api/threads/:id/messages
pub async fn open_thread(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(app_state.messaging.open_thread(&user.email, &id).await?))
}

// GET /api/threads/:id/poll
pub async fn poll_thread(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(app_state.messaging.poll(&user.email, &id).await?))
}

// GET /api/threads/:id/events
// Server-sent "messages" events carrying the full list whenever a poll sees a change.
pub async fn thread_events(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // Fail fast on unknown threads or non-participants instead of opening an empty stream.
    app_state.messaging.poll(&user.email, &id).await?;

    let stream = Arc::clone(&app_state.messaging)
        .watch(user.email, id)
        .map(|messages| Event::default().event("messages").json_data(messages));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    content: String,
}

// POST /api/threads/:id/messages
pub async fn send_message(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = app_state
        .messaging
        .send_message(&user.email, &id, &request.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Deserialize)]
pub struct OfferRequest {
    amount: f64,
    note: Option<String>,
}

// POST /api/threads/:id/offers
pub async fn send_offer(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(request): Json<OfferRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = app_state
        .messaging
        .send_offer(&user.email, &id, request.amount, request.note.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Deserialize)]
pub struct OfferResponseRequest {
    accept: bool,
}

// POST /api/messages/:id/offer-response
pub async fn respond_to_offer(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(request): Json<OfferResponseRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        app_state
            .messaging
            .respond_to_offer(&user.email, &id, request.accept)
            .await?,
    ))
}
