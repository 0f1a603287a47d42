use std::collections::BTreeMap;

use super::validation::{validate_password, validate_required, validate_signup_form, validate_login_form, validate_username};
use crate::api::ApiError;
use crate::constants::SESSION_EXPIRED_FORM_MESSAGE;

/// Field-scoped and global error messages of one form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    fields: BTreeMap<String, String>,
    global: Option<String>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the error shown beside `field`
    pub fn set_field(&mut self, field: &str, message: Option<&str>) {
        match message {
            Some(message) => {
                self.fields.insert(field.to_string(), message.to_string());
            }
            None => {
                self.fields.remove(field);
            }
        }
    }

    pub fn field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn set_global(&mut self, message: Option<&str>) {
        self.global = message.map(str::to_string);
    }

    pub fn global(&self) -> Option<&str> {
        self.global.as_deref()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.global.is_none()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.global = None;
    }

    /// Place a remote error beside its field when the form has that field,
    /// otherwise show it as the global summary
    pub fn apply_api_error(&mut self, err: &ApiError, known_fields: &[&str]) {
        match err.field.as_deref() {
            Some(field) if known_fields.contains(&field) => {
                self.set_field(field, Some(&err.message));
            }
            _ => self.set_global(Some(&err.message)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsMode {
    Signup,
    Login,
}

/// Draft state of the signup or login form
#[derive(Debug, Clone)]
pub struct CredentialsForm {
    mode: CredentialsMode,
    pub username: String,
    pub password: String,
    errors: FormErrors,
    submitting: bool,
}

impl CredentialsForm {
    const FIELDS: [&'static str; 2] = ["username", "password"];

    pub fn signup() -> Self {
        Self::new(CredentialsMode::Signup)
    }

    pub fn login() -> Self {
        Self::new(CredentialsMode::Login)
    }

    fn new(mode: CredentialsMode) -> Self {
        Self {
            mode,
            username: String::new(),
            password: String::new(),
            errors: FormErrors::new(),
            submitting: false,
        }
    }

    pub fn mode(&self) -> CredentialsMode {
        self.mode
    }

    pub fn errors(&self) -> &FormErrors {
        &self.errors
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Update a field and re-validate it. Returns whether the field is valid.
    ///
    /// Typing also dismisses any server error from the last submit.
    pub fn set_field(&mut self, field: &str, value: &str) -> bool {
        match field {
            "username" => self.username = value.to_string(),
            "password" => self.password = value.to_string(),
            _ => return false,
        }
        self.errors.set_global(None);
        self.validate_field(field, value)
    }

    fn validate_field(&mut self, field: &str, value: &str) -> bool {
        let error = match (self.mode, field) {
            (CredentialsMode::Signup, "username") => validate_username(value),
            (CredentialsMode::Signup, _) => validate_password(value),
            (CredentialsMode::Login, _) => validate_required(field, value),
        };
        self.errors.set_field(field, error);
        error.is_none()
    }

    /// Validate the whole draft before submitting
    pub fn validate(&mut self) -> bool {
        let check = match self.mode {
            CredentialsMode::Signup => validate_signup_form(&self.username, &self.password),
            CredentialsMode::Login => validate_login_form(&self.username, &self.password),
        };
        self.errors.set_field("username", check.username);
        self.errors.set_field("password", check.password);
        check.is_valid()
    }

    /// Mark the form as submitting; false when a submit is already pending
    pub fn begin_submit(&mut self) -> bool {
        if self.submitting {
            return false;
        }
        self.submitting = true;
        self.errors.set_global(None);
        true
    }

    pub fn finish_submit(&mut self) {
        self.submitting = false;
    }

    /// Record the outcome of a failed submit
    pub fn apply_error(&mut self, err: &ApiError) {
        if err.is_session_expired() {
            self.errors.set_global(Some(SESSION_EXPIRED_FORM_MESSAGE));
        } else {
            self.errors.apply_api_error(err, &Self::FIELDS);
        }
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }
}
