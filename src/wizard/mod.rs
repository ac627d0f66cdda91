//! Listing creation and editing.
//!
//! A [`ListingWizard`] is the draft (form, images, analysis, current step).
//! [`WizardService`] runs the external work on it: VIN decode, uploads,
//! condition analysis, Carfax extraction, publish and background enrichment.
//! Drafts live in a [`DraftStore`] between requests.

use thiserror::Error;
use uuid::Uuid;

pub mod drafts;
pub mod service;
pub mod state;
pub mod validation;

pub use drafts::DraftStore;
pub use service::{VinDecode, WizardService};
pub use state::{FormPatch, ListingForm, ListingWizard, WizardStep};
pub use validation::{FieldError, Section, ValidationErrors};

#[derive(Error, Debug)]
pub enum WizardError {
    #[error("Steps can only be jumped to while editing an existing listing")]
    StepJumpNotAllowed,
    #[error("Already on the last step")]
    NoNextStep,
    #[error("Already on the first step")]
    NoPreviousStep,
    #[error("Please enter a valid 17-character VIN (got {0} characters)")]
    InvalidVin(usize),
    #[error("{0}")]
    VinDecodeFailed(String),
    #[error("Please fill in Make, Model, and Year before generating a title.")]
    TitleRequiresBasics,
    #[error("{0}")]
    Validation(ValidationErrors),
    #[error("Progress can only be saved while editing an existing listing")]
    NotEditing,
    #[error("New image order must be a subset of the uploaded images without duplicates")]
    InvalidImageOrder,
    #[error("{0}")]
    CarfaxExtractionFailed(String),
    #[error("You can only edit your own listings")]
    NotOwner,
    #[error("Vehicle {0} not found")]
    VehicleNotFound(String),
    #[error("Draft {0} not found")]
    DraftNotFound(Uuid),
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl From<ValidationErrors> for WizardError {
    fn from(errors: ValidationErrors) -> Self {
        WizardError::Validation(errors)
    }
}
