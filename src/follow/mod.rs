// Gateway module for follow - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod controller;

// Public re-exports - the ONLY way to access follow functionality
pub use controller::RelationshipController;
