use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side user identifier
pub type UserId = i64;

/// Identity snapshot as returned by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub profile_photo_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Name to show in headings: display name when set, username otherwise
    pub fn display_label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }

    pub fn has_photo(&self) -> bool {
        self.profile_photo_url.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SignupResponse {
    #[serde(default)]
    pub message: String,
}

/// Partial profile update; absent fields are left untouched by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.bio.is_none()
    }
}

/// An image ready to be sent as the `photo` multipart field
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhotoUploaded {
    pub url: String,
}

/// Follow relationship between the viewer and one target user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowStats {
    pub followers_count: u64,
    pub following_count: u64,
    pub is_following: bool,
}
