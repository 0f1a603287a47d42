use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{PASSWORD_MIN_LEN, USERNAME_MAX_LEN, USERNAME_MIN_LEN};

static USERNAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());
static HAS_LOWERCASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]").unwrap());
static HAS_UPPERCASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]").unwrap());
static HAS_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]").unwrap());

/// Check a username against the signup rules
pub fn validate_username(username: &str) -> Option<&'static str> {
    if username.is_empty() {
        return Some("Username is required");
    }

    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Some("Username must be 3-20 characters long");
    }

    if !USERNAME_CHARS.is_match(username) {
        return Some("Username must contain only letters, numbers, and underscores");
    }

    None
}

/// Check a password against the signup rules; the first violation wins
pub fn validate_password(password: &str) -> Option<&'static str> {
    if password.is_empty() {
        return Some("Password is required");
    }

    if password.chars().count() < PASSWORD_MIN_LEN {
        return Some("Password must be at least 5 characters long");
    }

    if !HAS_LOWERCASE.is_match(password) {
        return Some("Password must contain at least one lowercase letter");
    }

    if !HAS_UPPERCASE.is_match(password) {
        return Some("Password must contain at least one uppercase letter");
    }

    if !HAS_DIGIT.is_match(password) {
        return Some("Password must contain at least one number");
    }

    None
}

/// Login only checks presence; the server decides whether credentials are right
pub fn validate_required(field: &str, value: &str) -> Option<&'static str> {
    if !value.is_empty() {
        return None;
    }
    match field {
        "username" => Some("Username is required"),
        "password" => Some("Password is required"),
        _ => Some("This field is required"),
    }
}

/// Result of validating a username/password pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CredentialCheck {
    pub username: Option<&'static str>,
    pub password: Option<&'static str>,
}

impl CredentialCheck {
    pub fn is_valid(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

pub fn validate_signup_form(username: &str, password: &str) -> CredentialCheck {
    CredentialCheck {
        username: validate_username(username),
        password: validate_password(password),
    }
}

pub fn validate_login_form(username: &str, password: &str) -> CredentialCheck {
    CredentialCheck {
        username: validate_required("username", username),
        password: validate_required("password", password),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert_eq!(validate_username(""), Some("Username is required"));
        assert_eq!(validate_username("ab"), Some("Username must be 3-20 characters long"));
        assert_eq!(
            validate_username("a".repeat(21).as_str()),
            Some("Username must be 3-20 characters long")
        );
        assert_eq!(
            validate_username("bad-name"),
            Some("Username must contain only letters, numbers, and underscores")
        );
        assert_eq!(
            validate_username("héllo"),
            Some("Username must contain only letters, numbers, and underscores")
        );

        assert_eq!(validate_username("valid_user1"), None);
        assert_eq!(validate_username("abc"), None);
        assert_eq!(validate_username("a".repeat(20).as_str()), None);
    }

    #[test]
    fn test_password_rules_in_order() {
        assert_eq!(validate_password(""), Some("Password is required"));
        assert_eq!(validate_password("Ab1"), Some("Password must be at least 5 characters long"));
        assert_eq!(
            validate_password("ABC12"),
            Some("Password must contain at least one lowercase letter")
        );
        assert_eq!(
            validate_password("abc12"),
            Some("Password must contain at least one uppercase letter")
        );
        assert_eq!(
            validate_password("Abcde"),
            Some("Password must contain at least one number")
        );
        assert_eq!(validate_password("Abc12"), None);
    }

    #[test]
    fn test_first_violation_wins() {
        // Short and missing every class: length is reported first
        assert_eq!(validate_password("!!"), Some("Password must be at least 5 characters long"));
        // Missing lowercase and uppercase: lowercase is reported first
        assert_eq!(
            validate_password("12345"),
            Some("Password must contain at least one lowercase letter")
        );
    }

    #[test]
    fn test_login_form_checks_presence_only() {
        let check = validate_login_form("x", "y");
        assert!(check.is_valid());

        let check = validate_login_form("", "");
        assert_eq!(check.username, Some("Username is required"));
        assert_eq!(check.password, Some("Password is required"));
        assert!(!check.is_valid());
    }

    #[test]
    fn test_signup_form() {
        assert!(validate_signup_form("valid_user1", "Abc12").is_valid());

        let check = validate_signup_form("x", "Abc12");
        assert_eq!(check.username, Some("Username must be 3-20 characters long"));
        assert_eq!(check.password, None);
    }
}
