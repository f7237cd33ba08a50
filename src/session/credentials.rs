//! Username/password flows. These helpers only talk to the backend and return
//! what it issued; committing a grant to the session is the manager's job, so a
//! flow never writes the token store on its own.

use super::{
    api::HttpClient,
    errors::AuthError,
    types::{
        Credential, LoginRequest, ProfileUpdate, SessionGrant, SignupDraft, SignupOutcome,
        SignupRequest, TokenResponse, UserProfile,
    },
};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, instrument};

pub const LOGIN_PATH: &str = "/auth/login";
pub const ADMIN_LOGIN_PATH: &str = "/auth/admin-login";
pub const SIGNUP_PATH: &str = "/auth/signup";
pub const PROFILE_PATH: &str = "/auth/me";
pub const LOGOUT_PATH: &str = "/auth/logout";

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 50;
const PASSWORD_MIN: usize = 6;

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

pub fn valid_username(username: &str) -> bool {
    (USERNAME_MIN..=USERNAME_MAX).contains(&username.chars().count())
}

/// Checks a signup draft before anything is sent. The confirmation mismatch is
/// reported first since it is the most common form mistake.
///
/// # Errors
/// Returns `AuthError::ValidationFailed` with a display message.
pub fn validate_signup(draft: &SignupDraft) -> Result<(), AuthError> {
    if draft.password.expose_secret() != draft.confirm_password.expose_secret() {
        return Err(AuthError::ValidationFailed(
            "Passwords do not match".to_string(),
        ));
    }
    if !valid_username(draft.username.trim()) {
        return Err(AuthError::ValidationFailed(format!(
            "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        )));
    }
    if !valid_email(draft.email.trim()) {
        return Err(AuthError::ValidationFailed(
            "Please enter a valid email address".to_string(),
        ));
    }
    if draft.password.expose_secret().chars().count() < PASSWORD_MIN {
        return Err(AuthError::ValidationFailed(format!(
            "Password must be at least {PASSWORD_MIN} characters"
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SignupResponse {
    Profile(UserProfile),
    Message { message: String },
}

#[derive(Clone)]
pub struct CredentialAuthFlow {
    client: HttpClient,
}

impl CredentialAuthFlow {
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Exchanges credentials for a token and the profile it belongs to.
    ///
    /// # Errors
    /// Returns `InvalidCredentials` with the backend message for any 4xx,
    /// otherwise `NetworkFailure`, `Rejected`, or `InvalidResponse`.
    #[instrument(skip(self, credential), fields(username = %credential.identifier))]
    pub async fn login(&self, credential: &Credential) -> Result<SessionGrant, AuthError> {
        self.authenticate(LOGIN_PATH, credential).await
    }

    /// Same contract as [`CredentialAuthFlow::login`] against the admin
    /// endpoint. The backend decides whether the account may use it.
    ///
    /// # Errors
    /// See [`CredentialAuthFlow::login`].
    #[instrument(skip(self, credential), fields(username = %credential.identifier))]
    pub async fn admin_login(&self, credential: &Credential) -> Result<SessionGrant, AuthError> {
        self.authenticate(ADMIN_LOGIN_PATH, credential).await
    }

    async fn authenticate(
        &self,
        path: &str,
        credential: &Credential,
    ) -> Result<SessionGrant, AuthError> {
        let response: TokenResponse = self
            .client
            .post_public(path, &LoginRequest::from_credential(credential))
            .await
            .map_err(AuthError::into_credential_error)?;

        self.complete_grant(response)
            .await
            .map_err(AuthError::into_credential_error)
    }

    /// Turns a token response into a grant, fetching the profile with the
    /// staged token when the backend did not embed one. A backend that refuses
    /// its own fresh token yields `Rejected`, never `SessionExpired`.
    pub(crate) async fn complete_grant(
        &self,
        response: TokenResponse,
    ) -> Result<SessionGrant, AuthError> {
        let token = SecretString::from(response.access_token);
        let profile = match response.user {
            Some(profile) => profile,
            None => {
                debug!("token response carried no profile, fetching it");
                self.client.get_with_token(PROFILE_PATH, &token).await?
            }
        };
        Ok(SessionGrant { token, profile })
    }

    /// Registers an account. Validation runs before any request and a
    /// successful signup never authenticates.
    ///
    /// # Errors
    /// Returns `ValidationFailed` for local checks and backend 4xx, otherwise
    /// `NetworkFailure`, `Rejected`, or `InvalidResponse`.
    #[instrument(skip(self, draft), fields(username = %draft.username))]
    pub async fn signup(&self, draft: &SignupDraft) -> Result<SignupOutcome, AuthError> {
        validate_signup(draft)?;

        let request = SignupRequest {
            username: draft.username.trim(),
            email: draft.email.trim(),
            password: draft.password.expose_secret(),
            role: draft.role,
        };
        let response: SignupResponse = self
            .client
            .post_public(SIGNUP_PATH, &request)
            .await
            .map_err(AuthError::into_validation_error)?;

        let outcome = match response {
            SignupResponse::Profile(profile) => {
                info!("account {} created", profile.username);
                SignupOutcome::Created(profile)
            }
            SignupResponse::Message { message } => SignupOutcome::PendingConfirmation(message),
        };
        Ok(outcome)
    }

    /// # Errors
    /// Returns `SessionExpired` after a teardown, otherwise any request error.
    pub async fn fetch_profile(&self) -> Result<UserProfile, AuthError> {
        self.client.get_json(PROFILE_PATH).await
    }

    /// # Errors
    /// Returns `ValidationFailed` for an empty update or a backend 4xx other
    /// than `401`, `SessionExpired` after a teardown.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, AuthError> {
        if update.is_empty() {
            return Err(AuthError::ValidationFailed(
                "Nothing to update".to_string(),
            ));
        }
        if let Some(email) = update.email.as_deref() {
            if !valid_email(email) {
                return Err(AuthError::ValidationFailed(
                    "Please enter a valid email address".to_string(),
                ));
            }
        }
        if let Some(username) = update.username.as_deref() {
            if !valid_username(username) {
                return Err(AuthError::ValidationFailed(format!(
                    "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
                )));
            }
        }

        self.client
            .put_json(PROFILE_PATH, update)
            .await
            .map_err(AuthError::into_validation_error)
    }

    /// Tells the backend the session bound to `token` is ending.
    ///
    /// # Errors
    /// Returns whatever the request failed with; callers treat it as advisory.
    pub async fn notify_logout(&self, token: &SecretString) -> Result<(), AuthError> {
        self.client.post_with_token(LOGOUT_PATH, token).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::{config::SessionConfig, state::SessionContext, storage::TokenStore};
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn flow_for(server: &MockServer) -> CredentialAuthFlow {
        let config = SessionConfig::new(&server.uri()).unwrap();
        let (context, _rx) = SessionContext::new(TokenStore::in_memory());
        CredentialAuthFlow::new(HttpClient::new(&config, context).unwrap())
    }

    fn alice() -> serde_json::Value {
        json!({
            "id": 1,
            "username": "alice",
            "email": "alice@example.com",
            "role": "user",
            "is_active": true
        })
    }

    #[test]
    fn email_validation() {
        assert!(valid_email("alice@example.com"));
        assert!(!valid_email("alice@example"));
        assert!(!valid_email("alice example@x.io"));
        assert!(!valid_email(""));
    }

    #[test]
    fn signup_mismatch_is_reported_first() {
        let draft = SignupDraft::new("a", "not-an-email", "abc", "abd");
        assert_eq!(
            validate_signup(&draft),
            Err(AuthError::ValidationFailed(
                "Passwords do not match".to_string()
            ))
        );
    }

    #[test]
    fn signup_field_rules() {
        let short_name = SignupDraft::new("al", "alice@example.com", "secret1", "secret1");
        assert!(matches!(
            validate_signup(&short_name),
            Err(AuthError::ValidationFailed(_))
        ));

        let short_password = SignupDraft::new("alice", "alice@example.com", "abc", "abc");
        assert!(matches!(
            validate_signup(&short_password),
            Err(AuthError::ValidationFailed(_))
        ));

        let ok = SignupDraft::new("alice", "alice@example.com", "secret1", "secret1");
        assert!(validate_signup(&ok).is_ok());
    }

    #[tokio::test]
    async fn login_uses_embedded_profile() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"username": "alice", "password": "correct-pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-1",
                "token_type": "bearer",
                "user": alice()
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let grant = flow_for(&server)
            .login(&Credential::new("alice", "correct-pw"))
            .await
            .unwrap();
        assert_eq!(grant.token.expose_secret(), "tok-1");
        assert_eq!(grant.profile.username, "alice");
    }

    #[tokio::test]
    async fn login_fetches_profile_with_staged_token() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/admin-login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-2",
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .and(header("Authorization", "Bearer tok-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(alice()))
            .expect(1)
            .mount(&server)
            .await;

        let grant = flow_for(&server)
            .admin_login(&Credential::new("alice", "correct-pw"))
            .await
            .unwrap();
        assert_eq!(grant.profile.id, 1);
    }

    #[tokio::test]
    async fn bad_credentials_surface_backend_message() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "detail": "Incorrect username or password"
            })))
            .mount(&server)
            .await;

        let result = flow_for(&server)
            .login(&Credential::new("alice", "wrong"))
            .await;
        assert_eq!(
            result.unwrap_err(),
            AuthError::InvalidCredentials("Incorrect username or password".to_string())
        );
    }

    #[tokio::test]
    async fn signup_does_not_call_backend_on_mismatch() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/signup"))
            .respond_with(ResponseTemplate::new(201).set_body_json(alice()))
            .expect(0)
            .mount(&server)
            .await;

        let draft = SignupDraft::new("alice", "alice@example.com", "abc", "abd");
        let result = flow_for(&server).signup(&draft).await;
        assert!(matches!(result, Err(AuthError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn signup_outcomes() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/signup"))
            .and(body_json(json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "secret1",
                "role": "user"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(alice()))
            .mount(&server)
            .await;

        let draft = SignupDraft::new(" alice ", "alice@example.com", "secret1", "secret1");
        let outcome = flow_for(&server).signup(&draft).await.unwrap();
        assert!(matches!(outcome, SignupOutcome::Created(ref p) if p.username == "alice"));

        let pending = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/signup"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "message": "Check your inbox"
            })))
            .mount(&pending)
            .await;
        let outcome = flow_for(&pending).signup(&draft).await.unwrap();
        assert_eq!(
            outcome,
            SignupOutcome::PendingConfirmation("Check your inbox".to_string())
        );
    }

    #[tokio::test]
    async fn duplicate_signup_is_a_validation_error() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/signup"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "detail": "Username already registered"
            })))
            .mount(&server)
            .await;

        let draft = SignupDraft::new("alice", "alice@example.com", "secret1", "secret1");
        assert_eq!(
            flow_for(&server).signup(&draft).await,
            Err(AuthError::ValidationFailed(
                "Username already registered".to_string()
            ))
        );
    }
}
