use std::path::Path;
use tracing::debug;

use super::service::{load_photo, ProfileService};
use crate::api::{ApiError, ApiResult, PhotoUpload, ProfileUpdate, User};
use crate::auth::FormErrors;
use crate::constants::PHOTO_FORM_FIELD;

/// Editable copy of the signed-in user's profile
#[derive(Debug, Clone)]
pub struct ProfileDraft {
    pub display_name: String,
    pub bio: String,
    photo: Option<PhotoUpload>,
    has_photo: bool,
    errors: FormErrors,
    submitting: bool,
}

impl ProfileDraft {
    const DETAIL_FIELDS: [&'static str; 2] = ["displayName", "bio"];

    pub fn from_user(user: &User) -> Self {
        Self {
            display_name: user.display_name.clone().unwrap_or_default(),
            bio: user.bio.clone().unwrap_or_default(),
            photo: None,
            has_photo: user.has_photo(),
            errors: FormErrors::new(),
            submitting: false,
        }
    }

    pub fn errors(&self) -> &FormErrors {
        &self.errors
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn selected_photo(&self) -> Option<&PhotoUpload> {
        self.photo.as_ref()
    }

    /// Update a text field, dismissing its error
    pub fn set_field(&mut self, field: &str, value: &str) {
        match field {
            "displayName" => self.display_name = value.to_string(),
            "bio" => self.bio = value.to_string(),
            _ => return,
        }
        self.errors.set_field(field, None);
    }

    /// Pick a new photo. An invalid file leaves the previous selection and
    /// reports beside `photo`.
    pub async fn select_photo(&mut self, path: impl AsRef<Path>) -> bool {
        match load_photo(path).await {
            Ok(upload) => {
                self.photo = Some(upload);
                self.errors.set_field(PHOTO_FORM_FIELD, None);
                true
            }
            Err(err) => {
                self.errors.set_field(PHOTO_FORM_FIELD, Some(&err.message));
                false
            }
        }
    }

    pub fn can_delete_photo(&self) -> bool {
        self.has_photo || self.photo.is_some()
    }

    fn update(&self) -> ProfileUpdate {
        ProfileUpdate {
            display_name: Some(self.display_name.clone()),
            bio: Some(self.bio.clone()),
        }
    }

    fn begin(&mut self) -> ApiResult<()> {
        if self.submitting {
            return Err(ApiError::validation("A save is already in progress", None));
        }
        self.submitting = true;
        Ok(())
    }

    /// Upload the selected photo, then save the details
    ///
    /// A failed upload stops before the details are sent. On success the
    /// server's copy of the user is returned so the caller can refresh.
    pub async fn submit(&mut self, service: &ProfileService) -> ApiResult<User> {
        self.begin()?;
        self.errors.clear();
        let result = self.save(service).await;
        self.submitting = false;
        result
    }

    async fn save(&mut self, service: &ProfileService) -> ApiResult<User> {
        if let Some(photo) = self.photo.clone() {
            if let Err(err) = service.upload_photo(photo).await {
                self.errors.set_field(PHOTO_FORM_FIELD, Some(&err.message));
                return Err(err);
            }
            debug!("Photo uploaded ahead of profile details");
            self.photo = None;
            self.has_photo = true;
        }

        match service.update_profile(self.update()).await {
            Ok(user) => {
                self.has_photo = user.has_photo();
                Ok(user)
            }
            Err(err) => {
                self.errors.apply_api_error(&err, &Self::DETAIL_FIELDS);
                Err(err)
            }
        }
    }

    /// Remove the current profile photo
    pub async fn delete_photo(&mut self, service: &ProfileService) -> ApiResult<()> {
        if !self.can_delete_photo() {
            return Err(ApiError::validation("No photo to delete", Some(PHOTO_FORM_FIELD)));
        }
        self.begin()?;
        self.errors.set_field(PHOTO_FORM_FIELD, None);

        let result = service.delete_profile_photo().await;
        self.submitting = false;
        match result {
            Ok(()) => {
                self.photo = None;
                self.has_photo = false;
                Ok(())
            }
            Err(err) => {
                self.errors.set_field(PHOTO_FORM_FIELD, Some(&err.message));
                Err(err)
            }
        }
    }
}
