use mime_guess::mime;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::{ApiError, ApiResult, Gateway, PhotoUpload, ProfileUpdate, User};
use crate::auth::SessionManager;
use crate::constants::{MAX_PHOTO_BYTES, PHOTO_FORM_FIELD};

/// Reject anything that is not an image or is too large to upload
pub fn check_photo(mime_type: &str, size: u64) -> ApiResult<()> {
    let is_image = mime_type
        .parse::<mime::Mime>()
        .map(|m| m.type_() == mime::IMAGE)
        .unwrap_or(false);
    if !is_image {
        return Err(ApiError::validation(
            "Please select an image file",
            Some(PHOTO_FORM_FIELD),
        ));
    }

    if size > MAX_PHOTO_BYTES {
        return Err(ApiError::validation(
            "Image size must be less than 5MB",
            Some(PHOTO_FORM_FIELD),
        ));
    }

    Ok(())
}

/// Read a photo from disk, checking type and size before loading it
pub async fn load_photo(path: impl AsRef<Path>) -> ApiResult<PhotoUpload> {
    let path = path.as_ref();
    let mime_type = mime_guess::from_path(path).first_or_octet_stream();

    let unreadable = |e: std::io::Error| {
        ApiError::validation(
            format!("Could not read {}: {}", path.display(), e),
            Some(PHOTO_FORM_FIELD),
        )
    };
    let metadata = tokio::fs::metadata(path).await.map_err(unreadable)?;
    check_photo(mime_type.essence_str(), metadata.len())?;
    let bytes = tokio::fs::read(path).await.map_err(unreadable)?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| PHOTO_FORM_FIELD.to_string());

    Ok(PhotoUpload {
        file_name,
        mime: mime_type.essence_str().to_string(),
        bytes,
    })
}

/// Profile reads and edits for the signed-in user
#[derive(Clone)]
pub struct ProfileService {
    gateway: Arc<dyn Gateway>,
    session: Arc<SessionManager>,
}

impl ProfileService {
    pub fn new(gateway: Arc<dyn Gateway>, session: Arc<SessionManager>) -> Self {
        Self { gateway, session }
    }

    fn fail(&self, err: ApiError, fallback: &str) -> ApiError {
        self.session.observe_error(&err);
        err.or_message(fallback)
    }

    pub async fn get_me(&self) -> ApiResult<User> {
        self.gateway
            .get_me()
            .await
            .map_err(|e| self.fail(e, "Failed to fetch profile"))
    }

    pub async fn get_user_by_username(&self, username: &str) -> ApiResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ApiError::validation("Username is required", Some("username")));
        }
        self.gateway
            .get_user(username)
            .await
            .map_err(|e| self.fail(e, "Failed to fetch user"))
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> ApiResult<User> {
        let user = self
            .gateway
            .update_me(update)
            .await
            .map_err(|e| self.fail(e, "Profile update failed"))?;
        info!(username = %user.username, "Profile updated");
        Ok(user)
    }

    /// Upload the image at `path` as the new profile photo; returns its URL
    pub async fn upload_profile_photo(&self, path: impl AsRef<Path>) -> ApiResult<String> {
        let upload = load_photo(path).await?;
        self.upload_photo(upload).await
    }

    /// Upload an already loaded photo; returns its URL
    pub async fn upload_photo(&self, upload: PhotoUpload) -> ApiResult<String> {
        check_photo(&upload.mime, upload.bytes.len() as u64)?;
        debug!(file = %upload.file_name, bytes = upload.bytes.len(), "Uploading photo");
        let uploaded = self
            .gateway
            .upload_photo(upload)
            .await
            .map_err(|e| self.fail(e, "Photo upload failed"))?;
        Ok(uploaded.url)
    }

    pub async fn delete_profile_photo(&self) -> ApiResult<()> {
        self.gateway
            .delete_photo()
            .await
            .map_err(|e| self.fail(e, "Photo deletion failed"))
    }
}
