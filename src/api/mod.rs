// Gateway module for api - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod error;
mod http;
mod traits;
mod types;

// Public re-exports - the ONLY way to access api functionality
pub use error::{ApiError, ApiResult, ErrorKind};
pub use http::HttpGateway;
pub use traits::Gateway;
#[cfg(test)]
pub use traits::MockGateway;
pub use types::{
    FollowStats, LoginResponse, PhotoUpload, PhotoUploaded, ProfileUpdate, SignupResponse, User,
    UserId,
};
