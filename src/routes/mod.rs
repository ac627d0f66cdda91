// Route definitions

use axum::{
    extract::{DefaultBodyLimit, Multipart},
    routing::{delete, get, post, put},
    Router,
};

use crate::{error::AppError, integrations::UploadFile, AppState};

mod auth;
mod drafts;
mod marketplace;
mod messages;
mod pages;
mod profile;
mod vehicles;

const UPLOAD_LIMIT_BYTES: usize = 25 * 1024 * 1024;

/// Reads every file part of a multipart body, in order. Non-file fields are skipped.
pub(crate) async fn read_uploads(mut multipart: Multipart) -> Result<Vec<UploadFile>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload {}: {}", file_name, e)))?;
        files.push(UploadFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Ok(files)
}

pub fn create_router(app_state: AppState) -> Router {
    let draft_router = Router::new()
        .route("/", post(drafts::create_draft))
        .route("/:id", get(drafts::get_draft).patch(drafts::update_draft))
        .route("/:id/next", post(drafts::next_step))
        .route("/:id/back", post(drafts::previous_step))
        .route("/:id/step", post(drafts::go_to_step))
        .route("/:id/vin", post(drafts::decode_vin))
        .route("/:id/vin/clear", post(drafts::clear_vin))
        .route("/:id/title", post(drafts::generate_title))
        .route("/:id/images", post(drafts::upload_images).put(drafts::reorder_images))
        .route("/:id/carfax", post(drafts::upload_carfax))
        .route("/:id/publish", post(drafts::publish))
        .route("/:id/save", post(drafts::save_progress))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES));

    let api_router = Router::new()
        // Marketplace
        .route("/marketplace/search", post(marketplace::search))
        .route("/marketplace/state", get(marketplace::get_state).put(marketplace::put_state))
        .route("/marketplace/ai-search", post(marketplace::ai_search))
        .route("/marketplace/guided-search", post(marketplace::guided_search))
        .route("/location/geocode", post(marketplace::geocode))
        .route("/location/reverse", post(marketplace::reverse_geocode))
        // Vehicles and saved listings
        .route("/vehicles/:id", get(vehicles::vehicle_detail))
        .route("/vehicles/:id/save", post(vehicles::toggle_saved))
        .route("/saved", get(vehicles::saved_listings))
        .route("/my-listings", get(vehicles::my_listings))
        .route("/my-listings/:id/status", put(vehicles::change_status))
        .route("/my-listings/:id", delete(vehicles::delete_listing))
        .route("/sellers/:email", get(vehicles::seller_listings))
        // Listing wizard
        .nest("/drafts", draft_router)
        // Messaging
        .route("/threads", get(messages::list_threads).post(messages::start_thread))
        .route(
            "/threads/:id/messages",
            get(messages::open_thread).post(messages::send_message),
        )
        .route("/threads/:id/poll", get(messages::poll_thread))
        .route("/threads/:id/events", get(messages::thread_events))
        .route("/threads/:id/offers", post(messages::send_offer))
        .route("/messages/:id/offer-response", post(messages::respond_to_offer))
        // Profile
        .route("/profile", get(profile::get_profile).put(profile::update_profile))
        .route(
            "/profile/picture",
            post(profile::upload_picture).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/profile/picture/generate", post(profile::generate_picture));

    Router::new()
        .route("/", get(pages::marketplace_page))
        .route("/vehicles/:id", get(pages::vehicle_page))
        .route("/login", get(auth::login))
        .route("/logout", post(auth::logout))
        .nest("/api", api_router)
        .with_state(app_state)
}
