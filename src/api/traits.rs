use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::error::ApiResult;
use super::types::{
    FollowStats, LoginResponse, PhotoUpload, PhotoUploaded, ProfileUpdate, SignupResponse, User,
    UserId,
};

/// Boundary to the remote service
///
/// Implementations attach the stored bearer token to every request and
/// normalize every failure into an [`ApiError`](super::ApiError); they never
/// panic and never return transport errors directly.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    /// `POST /auth/signup`
    async fn signup(&self, username: &str, password: &str) -> ApiResult<SignupResponse>;

    /// `POST /auth/login`
    async fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse>;

    /// `GET /users/me`
    async fn get_me(&self) -> ApiResult<User>;

    /// `PUT /users/me`
    async fn update_me(&self, update: ProfileUpdate) -> ApiResult<User>;

    /// `POST /users/me/photo`
    async fn upload_photo(&self, upload: PhotoUpload) -> ApiResult<PhotoUploaded>;

    /// `DELETE /users/me/photo`
    async fn delete_photo(&self) -> ApiResult<()>;

    /// `GET /users/{username}`
    async fn get_user(&self, username: &str) -> ApiResult<User>;

    /// `POST /follow/{userId}`
    async fn follow(&self, user_id: UserId) -> ApiResult<()>;

    /// `DELETE /follow/{userId}`
    async fn unfollow(&self, user_id: UserId) -> ApiResult<()>;

    /// `GET /follow/stats/{userId}`
    async fn follow_stats(&self, user_id: UserId) -> ApiResult<FollowStats>;
}
