/// Constants module to avoid magic numbers in the codebase

// Network Configuration
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";

// Timeouts
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

// Persisted session slots
pub const STORE_TOKEN_KEY: &str = "token";
pub const STORE_USER_KEY: &str = "user";
pub const SESSION_STORE_FILE: &str = "session.json";

// Credential rules
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;
pub const PASSWORD_MIN_LEN: usize = 5;

// Profile photos
pub const MAX_PHOTO_BYTES: u64 = 5 * 1024 * 1024; // 5MB
pub const PHOTO_FORM_FIELD: &str = "photo";

// Routing
pub const LOGIN_ROUTE: &str = "/login";
pub const HOME_ROUTE: &str = "/";

// User-facing messages
pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Please check your connection.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please login again.";
pub const SESSION_EXPIRED_FORM_MESSAGE: &str = "Your session has expired. Please login again.";
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again.";
pub const SIGNUP_SUCCESS_MESSAGE: &str = "Account created successfully! Please log in.";
