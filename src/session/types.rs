//! Request and response types for the auth endpoints. Credentials and tokens are
//! held as `SecretString` so they never show up in `Debug` output or logs.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role carried by the backend profile. It is the only input to admin gating.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// Profile returned by `/auth/me` and embedded in login responses.
/// Contains no secrets and is cached next to the token.
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

const fn default_active() -> bool {
    true
}

impl UserProfile {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Username/password pair submitted from a login form. Never persisted.
pub struct Credential {
    pub identifier: String,
    pub secret: SecretString,
}

impl Credential {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: SecretString::from(secret.into()),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.identifier)
            .field("secret", &"***")
            .finish()
    }
}

#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl<'a> LoginRequest<'a> {
    pub(crate) fn from_credential(credential: &'a Credential) -> Self {
        Self {
            username: &credential.identifier,
            password: credential.secret.expose_secret(),
        }
    }
}

#[derive(Deserialize)]
/// Token grant returned by login and the OAuth profile relay.
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// A freshly issued token with the profile it belongs to, ready to commit.
pub struct SessionGrant {
    pub token: SecretString,
    pub profile: UserProfile,
}

impl fmt::Debug for SessionGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGrant")
            .field("token", &"***")
            .field("profile", &self.profile)
            .finish()
    }
}

/// Registration form contents, including the confirmation field that is only
/// checked client-side.
pub struct SignupDraft {
    pub username: String,
    pub email: String,
    pub password: SecretString,
    pub confirm_password: SecretString,
    pub role: Role,
}

impl SignupDraft {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        confirm_password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: SecretString::from(password.into()),
            confirm_password: SecretString::from(confirm_password.into()),
            role: Role::User,
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

impl fmt::Debug for SignupDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupDraft")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"***")
            .field("confirm_password", &"***")
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Serialize)]
pub(crate) struct SignupRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub role: Role,
}

/// Result of a registration. Signup never authenticates; callers log in next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignupOutcome {
    Created(UserProfile),
    PendingConfirmation(String),
}

/// Fields accepted by `PUT /auth/me`. Absent fields are left untouched.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none()
    }
}

#[derive(Deserialize)]
pub(crate) struct OAuthStartResponse {
    pub state: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Why an OAuth flow was started. Recorded in the tab-scoped store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OAuthPurpose {
    Login,
    Signup,
}

/// Pending OAuth flow persisted across the provider redirect.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthState {
    pub nonce: String,
    pub provider: String,
    pub purpose: OAuthPurpose,
}

impl OAuthState {
    /// Value sent as the `state` query parameter.
    #[must_use]
    pub fn state_param(&self) -> String {
        format!("{}:{}", self.provider, self.nonce)
    }
}

impl fmt::Debug for OAuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthState")
            .field("nonce", &"***")
            .field("provider", &self.provider)
            .field("purpose", &self.purpose)
            .finish()
    }
}

#[derive(Serialize)]
/// Provider profile relayed to `POST /auth/oauth/callback`.
pub(crate) struct OAuthRelayRequest<'a> {
    pub provider: &'a str,
    pub provider_account_id: &'a str,
    pub email: Option<&'a str>,
    pub name: Option<&'a str>,
    pub access_token: &'a str,
    pub refresh_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}
