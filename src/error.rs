// Application error type and its conversion into HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::{
    listings::ListingError,
    messaging::MessagingError,
    profile::ProfileError,
    search::{FilterError, SearchError},
    wizard::{ValidationErrors, WizardError},
};

#[derive(Debug)]
pub enum AppError {
    InternalServerError(anyhow::Error),
    // An external collaborator (backend, LLM, upload, geocoder) failed.
    Upstream(anyhow::Error),
    Unauthorized {
        message: String,
        login_url: Option<String>,
    },
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Validation(ValidationErrors),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized {
            message: message.into(),
            login_url: None,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::InternalServerError(error)
    }
}

impl From<FilterError> for AppError {
    fn from(error: FilterError) -> Self {
        AppError::BadRequest(error.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(error: SearchError) -> Self {
        match error {
            SearchError::Upstream(e) => {
                tracing::warn!("Search assistant failed: {:?}", e);
                AppError::BadRequest(
                    "I couldn't understand that search. Please try rephrasing your request.".to_string(),
                )
            }
            SearchError::LocationNotFound => AppError::NotFound(error.to_string()),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<WizardError> for AppError {
    fn from(error: WizardError) -> Self {
        match error {
            WizardError::Validation(errors) => AppError::Validation(errors),
            WizardError::NotOwner => AppError::Forbidden(error.to_string()),
            WizardError::VehicleNotFound(_) | WizardError::DraftNotFound(_) => AppError::NotFound(error.to_string()),
            WizardError::Upstream(e) => AppError::Upstream(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<MessagingError> for AppError {
    fn from(error: MessagingError) -> Self {
        match error {
            MessagingError::ThreadNotFound(_)
            | MessagingError::VehicleNotFound(_)
            | MessagingError::MessageNotFound(_) => AppError::NotFound(error.to_string()),
            MessagingError::NotParticipant | MessagingError::NotOfferRecipient => {
                AppError::Forbidden(error.to_string())
            }
            MessagingError::SendFailed(e) | MessagingError::Backend(e) => AppError::Upstream(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<ListingError> for AppError {
    fn from(error: ListingError) -> Self {
        match error {
            ListingError::NotFound(_) => AppError::NotFound(error.to_string()),
            ListingError::NotOwner => AppError::Forbidden(error.to_string()),
            ListingError::Backend(e) => AppError::Upstream(e),
        }
    }
}

impl From<ProfileError> for AppError {
    fn from(error: ProfileError) -> Self {
        match error {
            ProfileError::Backend(e) => AppError::Upstream(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InternalServerError(e) => {
                tracing::error!("Internal server error: {:?}", e);
                // Don't expose internal details to the client
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
            AppError::Upstream(e) => {
                tracing::error!("External service call failed: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "An external service is unavailable. Please try again." }),
                )
            }
            AppError::Unauthorized { message, login_url } => {
                tracing::warn!("Unauthorized access attempt: {}", message);
                (
                    StatusCode::UNAUTHORIZED,
                    json!({ "error": message, "login_url": login_url }),
                )
            }
            AppError::Forbidden(message) => {
                tracing::warn!("Forbidden: {}", message);
                (StatusCode::FORBIDDEN, json!({ "error": message }))
            }
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": errors.summary(),
                    "section": errors.section,
                    "fields": errors.fields,
                }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
