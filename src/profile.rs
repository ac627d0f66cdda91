// Signed-in user's profile.

use std::sync::Arc;
use thiserror::Error;

use crate::{
    backend::AuthService,
    integrations::{Integrations, UploadFile},
    models::{User, UserPatch},
};

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Please select a valid image file.")]
    NotAnImage,
    #[error("Nothing to update")]
    EmptyPatch,
    #[error("Describe the picture you want generated")]
    EmptyPrompt,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct ProfileService {
    auth: Arc<dyn AuthService>,
    integrations: Arc<dyn Integrations>,
}

impl ProfileService {
    pub fn new(auth: Arc<dyn AuthService>, integrations: Arc<dyn Integrations>) -> Self {
        Self { auth, integrations }
    }

    pub async fn get(&self, token: &str) -> Result<User, ProfileError> {
        Ok(self.auth.me(token).await?)
    }

    /// Applies `patch`. Turning dealer mode off clears the dealer name.
    pub async fn update(&self, token: &str, mut patch: UserPatch) -> Result<User, ProfileError> {
        if patch.is_empty() {
            return Err(ProfileError::EmptyPatch);
        }
        if patch.is_dealer == Some(false) {
            patch.dealer_name = Some(String::new());
        }
        let user = self.auth.update_me(token, &patch).await?;
        tracing::info!(user = %user.email, "Profile updated");
        Ok(user)
    }

    pub async fn upload_picture(&self, token: &str, file: UploadFile) -> Result<User, ProfileError> {
        let is_image = file
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"));
        if !is_image {
            return Err(ProfileError::NotAnImage);
        }
        let url = self.integrations.upload_file(file).await?;
        let patch = UserPatch {
            profile_picture_url: Some(url),
            ..Default::default()
        };
        Ok(self.auth.update_me(token, &patch).await?)
    }

    /// Generates a picture from `prompt` and makes it the profile picture.
    pub async fn generate_picture(&self, token: &str, prompt: &str) -> Result<User, ProfileError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ProfileError::EmptyPrompt);
        }
        let url = self.integrations.generate_image(prompt).await?;
        let patch = UserPatch {
            profile_picture_url: Some(url),
            ..Default::default()
        };
        let user = self.auth.update_me(token, &patch).await?;
        tracing::info!(user = %user.email, "Profile picture generated");
        Ok(user)
    }
}
