//! Error taxonomy for the session core and the single normalization point for
//! backend error bodies. Every endpoint funnels its failures through
//! [`normalize_error_body`] so the UI always receives one display string.

use serde_json::Value;
use thiserror::Error;

/// Maximum number of error body characters surfaced to callers.
const MAX_ERROR_CHARS: usize = 200;
const GENERIC_MESSAGE: &str = "Request failed.";

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),
    #[error("{0}")]
    ValidationFailed(String),
    #[error("Unable to reach the server: {0}")]
    NetworkFailure(String),
    #[error("Sign-in provider returned an error: {0}")]
    OAuthProviderError(String),
    #[error("Sign-in callback is missing required parameters")]
    OAuthCallbackMalformed,
    #[error("Sign-in state did not match; please start again")]
    OAuthStateMismatch,
    #[error("OAuth provider {0} is not configured")]
    OAuthNotConfigured(String),
    #[error("Your session has expired; please sign in again")]
    SessionExpired,
    #[error("Sign-in was cancelled by a newer session change")]
    Superseded,
    #[error("Request failed ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Response error: {0}")]
    InvalidResponse(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Config error: {0}")]
    Config(String),
}

/// How a failure propagates once it reaches the UI boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Render inline next to the form; session state is unchanged.
    Inline,
    /// Show the message, then force a redirect to login after the configured delay.
    FatalRedirect,
    /// Teardown and redirect already happened.
    Teardown,
}

impl AuthError {
    #[must_use]
    pub const fn disposition(&self) -> ErrorDisposition {
        match self {
            Self::OAuthStateMismatch | Self::OAuthProviderError(_) => {
                ErrorDisposition::FatalRedirect
            }
            Self::SessionExpired => ErrorDisposition::Teardown,
            _ => ErrorDisposition::Inline,
        }
    }

    /// Maps a rejected public call to the error its form expects.
    pub(crate) fn into_credential_error(self) -> Self {
        match self {
            Self::Rejected { status, message } if (400..500).contains(&status) => {
                Self::InvalidCredentials(message)
            }
            other => other,
        }
    }

    pub(crate) fn into_validation_error(self) -> Self {
        match self {
            Self::Rejected { status, message } if (400..500).contains(&status) => {
                Self::ValidationFailed(message)
            }
            other => other,
        }
    }
}

/// Reduces any backend error body to a single non-empty display string.
///
/// Handles `{"detail": "x"}`, `{"detail": [{"msg": "y"}, ...]}`,
/// `{"message": "z"}`, OAuth-style `{"error_description"}`/`{"error"}`, and
/// plain text.
#[must_use]
pub fn normalize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return GENERIC_MESSAGE.to_string();
    }

    let message = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|json| message_from_json(&json))
        .unwrap_or_else(|| trimmed.to_string());

    truncate(&message)
}

fn message_from_json(json: &Value) -> Option<String> {
    if let Some(detail) = json.get("detail") {
        if let Some(message) = non_empty(detail.as_str()) {
            return Some(message);
        }
        if let Some(items) = detail.as_array() {
            let messages: Vec<String> = items
                .iter()
                .filter_map(|item| {
                    non_empty(item.get("msg").and_then(Value::as_str))
                        .or_else(|| non_empty(item.as_str()))
                })
                .collect();
            if !messages.is_empty() {
                return Some(messages.join("; "));
            }
        }
    }

    ["message", "error_description", "error"]
        .iter()
        .find_map(|key| non_empty(json.get(*key).and_then(Value::as_str)))
        .or_else(|| json.is_object().then(|| GENERIC_MESSAGE.to_string()))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn truncate(message: &str) -> String {
    message.chars().take(MAX_ERROR_CHARS).collect()
}
