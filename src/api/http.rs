use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::error::{ApiError, ApiResult};
use super::traits::Gateway;
use super::types::{
    Credentials, FollowStats, LoginResponse, PhotoUpload, PhotoUploaded, ProfileUpdate,
    SignupResponse, User, UserId,
};
use crate::auth::SessionStore;
use crate::constants::{PHOTO_FORM_FIELD, STORE_TOKEN_KEY};

/// Gateway implementation over HTTP+JSON
///
/// The bearer token is read from the session store on every request, so a
/// login or logout is picked up without rebuilding the gateway. The server
/// is authoritative for rejecting expired tokens.
pub struct HttpGateway {
    client: Client,
    base_url: Url,
    store: Arc<dyn SessionStore>,
}

impl HttpGateway {
    /// Create a new gateway for the API rooted at `base_url`
    pub fn new(base_url: &str, timeout: Duration, store: Arc<dyn SessionStore>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, base_url, store)
    }

    /// Create a gateway around an already configured client
    pub fn with_client(client: Client, base_url: &str, store: Arc<dyn SessionStore>) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid API base URL '{}': {}", base_url, e))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Invalid API base URL '{}'", base_url);
        }

        Ok(Self {
            client,
            base_url,
            store,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join path segments onto the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::unexpected("API base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.store.get(STORE_TOKEN_KEY) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and read the raw body of a 2xx response
    async fn dispatch(&self, request: RequestBuilder) -> ApiResult<Vec<u8>> {
        let response = self.authorize(request).send().await.map_err(|e| {
            debug!(error = %e, "Request failed before a response arrived");
            ApiError::network()
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            debug!(error = %e, "Response body could not be read");
            ApiError::network()
        })?;

        if !status.is_success() {
            let err = ApiError::from_response(status.as_u16(), &body);
            debug!(status = status.as_u16(), kind = ?err.kind, "Request rejected");
            return Err(err);
        }

        Ok(body.to_vec())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let body = self.dispatch(request).await?;
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::unexpected(format!("Unreadable server response: {}", e)))
    }

    async fn send_empty(&self, request: RequestBuilder) -> ApiResult<()> {
        self.dispatch(request).await.map(|_| ())
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn signup(&self, username: &str, password: &str) -> ApiResult<SignupResponse> {
        let url = self.endpoint(&["auth", "signup"])?;
        self.send_json(self.client.post(url).json(&Credentials { username, password }))
            .await
    }

    async fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse> {
        let url = self.endpoint(&["auth", "login"])?;
        self.send_json(self.client.post(url).json(&Credentials { username, password }))
            .await
    }

    async fn get_me(&self) -> ApiResult<User> {
        let url = self.endpoint(&["users", "me"])?;
        self.send_json(self.client.get(url)).await
    }

    async fn update_me(&self, update: ProfileUpdate) -> ApiResult<User> {
        let url = self.endpoint(&["users", "me"])?;
        self.send_json(self.client.put(url).json(&update)).await
    }

    async fn upload_photo(&self, upload: PhotoUpload) -> ApiResult<PhotoUploaded> {
        let url = self.endpoint(&["users", "me", "photo"])?;
        let part = multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.mime)
            .map_err(|_| ApiError::validation("Please select an image file", Some(PHOTO_FORM_FIELD)))?;
        let form = multipart::Form::new().part(PHOTO_FORM_FIELD, part);

        self.send_json(self.client.post(url).multipart(form)).await
    }

    async fn delete_photo(&self) -> ApiResult<()> {
        let url = self.endpoint(&["users", "me", "photo"])?;
        self.send_empty(self.client.delete(url)).await
    }

    async fn get_user(&self, username: &str) -> ApiResult<User> {
        let url = self.endpoint(&["users", username])?;
        self.send_json(self.client.get(url)).await
    }

    async fn follow(&self, user_id: UserId) -> ApiResult<()> {
        let id = user_id.to_string();
        let url = self.endpoint(&["follow", &id])?;
        self.send_empty(self.client.post(url)).await
    }

    async fn unfollow(&self, user_id: UserId) -> ApiResult<()> {
        let id = user_id.to_string();
        let url = self.endpoint(&["follow", &id])?;
        self.send_empty(self.client.delete(url)).await
    }

    async fn follow_stats(&self, user_id: UserId) -> ApiResult<FollowStats> {
        let id = user_id.to_string();
        let url = self.endpoint(&["follow", "stats", &id])?;
        self.send_json(self.client.get(url)).await
    }
}
