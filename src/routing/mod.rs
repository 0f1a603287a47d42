// Gateway module for routing - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod flash;
mod guard;

// Public re-exports - the ONLY way to access routing functionality
pub use flash::FlashSlot;
pub use guard::{RouteGuard, ViewAccess};
