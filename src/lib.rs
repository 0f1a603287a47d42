pub mod api;
pub mod app;
pub mod auth;
pub mod cli;
pub mod constants;
pub mod follow;
pub mod profile;
pub mod routing;
pub mod runtime;
pub mod utils;

pub use api::{ApiError, ApiResult, ErrorKind, Gateway, HttpGateway, User};
pub use app::{load_config, AppState, Config};
pub use auth::{SessionManager, SessionPhase};
pub use follow::RelationshipController;
pub use utils::PlazaError;
