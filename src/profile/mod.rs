// Gateway module for profile - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod draft;
mod service;

// Public re-exports - the ONLY way to access profile functionality
pub use draft::ProfileDraft;
pub use service::{check_photo, load_photo, ProfileService};
