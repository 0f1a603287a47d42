// Gateway module for auth - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod forms;
mod manager;
mod store;
mod token;
mod validation;

// Public re-exports - the ONLY way to access auth functionality
pub use forms::{CredentialsForm, CredentialsMode, FormErrors};
pub use manager::{Session, SessionManager, SessionPhase};
pub use store::{clear_session, FileSessionStore, MemorySessionStore, SessionStore};
pub use token::{decode_claims, expires_at, is_token_expired, is_token_expired_at, Clock, SystemClock, TokenClaims};
pub use validation::{
    validate_login_form, validate_password, validate_required, validate_signup_form,
    validate_username, CredentialCheck,
};

#[cfg(test)]
pub(crate) use token::{token_expiring_at, ManualClock};
