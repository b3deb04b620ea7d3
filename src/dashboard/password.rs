//! Forgot-password request and the reset-password form

use tracing::info;

use crate::api::{ApiError, LabApi};
use crate::routes::Route;
use crate::wizard::validation::{is_valid_email, is_valid_password};

pub const MISSING_FIELDS_MESSAGE: &str = "Please enter both new password and confirmation";
pub const MISMATCH_MESSAGE: &str = "Passwords do not match";
pub const WEAK_PASSWORD_MESSAGE: &str = "Please ensure your password meets all requirements";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid reset token";
pub const INVALID_EMAIL_MESSAGE: &str = "Please enter a valid email address";

/// Ask the server to mail a reset link. Returns the server's message.
pub async fn request_reset(api: &dyn LabApi, email: &str) -> Result<String, String> {
    let email = email.trim();
    if !is_valid_email(email) {
        return Err(INVALID_EMAIL_MESSAGE.to_string());
    }
    let response = api
        .forgot_password(email)
        .await
        .map_err(|e| e.message().to_string())?;
    info!("Password reset requested");
    Ok(response.message)
}

#[derive(Debug, Clone, Default)]
pub struct PasswordResetForm {
    pub token: Option<String>,
    pub new_password: String,
    pub confirm_password: String,
    error: Option<String>,
    succeeded: bool,
}

impl PasswordResetForm {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            ..Default::default()
        }
    }

    /// Form for a `/reset-password?token=` route
    pub fn for_route(route: &Route) -> Option<Self> {
        match route {
            Route::ResetPassword { token } => Some(Self::new(token.clone())),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Local checks, in the order the user sees them
    pub fn validate(&self) -> Result<&str, &'static str> {
        if self.new_password.is_empty() || self.confirm_password.is_empty() {
            return Err(MISSING_FIELDS_MESSAGE);
        }
        if self.new_password != self.confirm_password {
            return Err(MISMATCH_MESSAGE);
        }
        if !is_valid_password(&self.new_password) {
            return Err(WEAK_PASSWORD_MESSAGE);
        }
        match self.token.as_deref() {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(INVALID_TOKEN_MESSAGE),
        }
    }

    /// Submit the new password. On success the caller navigates to the
    /// returned login route.
    pub async fn submit(&mut self, api: &dyn LabApi) -> Result<Route, String> {
        self.error = None;
        let token = match self.validate() {
            Ok(token) => token.to_string(),
            Err(message) => {
                self.error = Some(message.to_string());
                return Err(message.to_string());
            }
        };

        match api.reset_password(&token, &self.new_password).await {
            Ok(_) => {
                self.succeeded = true;
                self.new_password.clear();
                self.confirm_password.clear();
                info!("Password reset");
                Ok(Route::Login)
            }
            Err(e) => {
                let message = reset_failure_message(&e);
                self.error = Some(message.clone());
                Err(message)
            }
        }
    }
}

fn reset_failure_message(error: &ApiError) -> String {
    match error {
        ApiError::Network { .. } | ApiError::Parse { .. } => {
            "An error occurred. Please try again.".to_string()
        }
        other => other.message().to_string(),
    }
}
