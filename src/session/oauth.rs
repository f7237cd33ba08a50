//! OAuth federation across the provider redirect.
//!
//! Flow summary:
//! - `start` asks the backend for a nonce and the provider client id, persists
//!   an [`OAuthState`] in the tab-scoped store, and returns the provider URL.
//! - The provider sends the browser back to the callback route. The query is
//!   parsed into [`CallbackParams`] and classified by [`classify`] before any
//!   side effect happens.
//! - `finalize` consumes the pending record, verifies `state` for code
//!   callbacks, and either yields a grant to commit or the backend URL that
//!   finishes the code exchange.

use super::{
    api::HttpClient,
    credentials::CredentialAuthFlow,
    errors::AuthError,
    storage::OAuthStateStore,
    types::{
        OAuthPurpose, OAuthRelayRequest, OAuthStartResponse, OAuthState, SessionGrant,
        TokenResponse,
    },
};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const OAUTH_START_PATH: &str = "/auth/oauth/start";
pub const OAUTH_RELAY_PATH: &str = "/auth/oauth/callback";

/// Which callback shape a provider is expected to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CallbackMode {
    /// Accept either a direct token or a code exchange.
    #[default]
    Auto,
    /// The backend finishes the exchange and returns `?token=`.
    DirectToken,
    /// The provider returns `?code=&state=` and the backend exchanges it.
    CodeExchange,
}

impl CallbackMode {
    const fn accepts(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Auto, _)
                | (Self::DirectToken, Self::DirectToken)
                | (Self::CodeExchange, Self::CodeExchange)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
    pub auth_url: String,
    pub scope: String,
    pub response_type: String,
    pub access_type: Option<String>,
    pub prompt: Option<String>,
    pub response_mode: Option<String>,
    pub callback: CallbackMode,
}

impl ProviderConfig {
    pub fn new(
        auth_url: impl Into<String>,
        scope: impl Into<String>,
        response_type: impl Into<String>,
    ) -> Self {
        Self {
            auth_url: auth_url.into(),
            scope: scope.into(),
            response_type: response_type.into(),
            access_type: None,
            prompt: None,
            response_mode: None,
            callback: CallbackMode::Auto,
        }
    }

    #[must_use]
    pub fn with_access_type(mut self, access_type: impl Into<String>) -> Self {
        self.access_type = Some(access_type.into());
        self
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_response_mode(mut self, response_mode: impl Into<String>) -> Self {
        self.response_mode = Some(response_mode.into());
        self
    }

    #[must_use]
    pub fn with_callback(mut self, callback: CallbackMode) -> Self {
        self.callback = callback;
        self
    }
}

/// Known identity providers keyed by lowercase name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, config: ProviderConfig) {
        self.providers.insert(normalize_provider(name), config);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(&normalize_provider(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.insert(
            "google",
            ProviderConfig::new(
                "https://accounts.google.com/o/oauth2/v2/auth",
                "openid email profile",
                "code",
            )
            .with_access_type("offline")
            .with_prompt("consent"),
        );
        registry.insert(
            "microsoft",
            ProviderConfig::new(
                "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
                "openid email profile",
                "code",
            )
            .with_prompt("select_account"),
        );
        registry.insert(
            "apple",
            ProviderConfig::new(
                "https://appleid.apple.com/auth/authorize",
                "name email",
                "code id_token",
            )
            .with_response_mode("form_post"),
        );
        registry
    }
}

fn normalize_provider(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Builds the provider authorization URL for a pending flow.
///
/// # Errors
/// Returns `AuthError::Config` if the provider `auth_url` is not a valid URL.
pub fn build_authorization_url(
    provider: &ProviderConfig,
    client_id: &str,
    redirect_uri: &Url,
    state: &OAuthState,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(&provider.auth_url).map_err(|err| {
        AuthError::Config(format!("Invalid authorization URL {}: {err}", provider.auth_url))
    })?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("response_type", &provider.response_type)
            .append_pair("scope", &provider.scope)
            .append_pair("state", &state.state_param());
        if let Some(access_type) = &provider.access_type {
            query.append_pair("access_type", access_type);
        }
        if let Some(prompt) = &provider.prompt {
            query.append_pair("prompt", prompt);
        }
        if let Some(response_mode) = &provider.response_mode {
            query.append_pair("response_mode", response_mode);
        }
    }

    Ok(url)
}

/// Query parameters a callback may carry. Empty values count as absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub token: Option<String>,
    pub code: Option<String>,
    pub state: Option<String>,
    pub provider: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub account_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub expires_in: Option<u64>,
}

impl CallbackParams {
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();
        let mut id = None;
        for (key, value) in pairs {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            let value = Some(value.to_string());
            match key.as_ref() {
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                "token" => params.token = value,
                "code" => params.code = value,
                "state" => params.state = value,
                "provider" => params.provider = value,
                "access_token" => params.access_token = value,
                "refresh_token" => params.refresh_token = value,
                "sub" => params.account_id = value,
                "id" => id = value,
                "email" => params.email = value,
                "name" => params.name = value,
                "expires_in" => {
                    params.expires_in = value.and_then(|raw| raw.parse().ok());
                }
                _ => {}
            }
        }
        if params.account_id.is_none() {
            params.account_id = id;
        }
        params
    }

    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self::from_pairs(url.query_pairs())
    }
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParams")
            .field("error", &self.error)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("code", &self.code.as_ref().map(|_| "***"))
            .field("state", &self.state.is_some())
            .field("provider", &self.provider)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

/// Provider profile relayed to the backend when the callback already carries
/// the provider's token and identity.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider: String,
    pub account_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for ProviderProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderProfile")
            .field("provider", &self.provider)
            .field("account_id", &self.account_id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackKind {
    ProviderError(String),
    DirectToken {
        token: String,
        provider: Option<String>,
    },
    CodeExchange {
        code: String,
        state: String,
    },
    ProfileRelay(ProviderProfile),
    Malformed,
}

/// Decides what a callback is. Order matters: a provider error wins over any
/// other parameter, and a code without its state is malformed.
#[must_use]
pub fn classify(params: &CallbackParams) -> CallbackKind {
    if let Some(error) = &params.error {
        let description = params.error_description.as_ref().unwrap_or(error);
        return CallbackKind::ProviderError(description.clone());
    }

    if let Some(token) = &params.token {
        return CallbackKind::DirectToken {
            token: token.clone(),
            provider: params.provider.clone(),
        };
    }

    if let Some(code) = &params.code {
        return match &params.state {
            Some(state) => CallbackKind::CodeExchange {
                code: code.clone(),
                state: state.clone(),
            },
            None => CallbackKind::Malformed,
        };
    }

    match (&params.provider, &params.access_token, &params.account_id) {
        (Some(provider), Some(access_token), Some(account_id)) => {
            CallbackKind::ProfileRelay(ProviderProfile {
                provider: normalize_provider(provider),
                account_id: account_id.clone(),
                email: params.email.clone(),
                name: params.name.clone(),
                access_token: access_token.clone(),
                refresh_token: params.refresh_token.clone(),
                expires_in: params.expires_in,
            })
        }
        _ => CallbackKind::Malformed,
    }
}

/// Checks a returned `state` against the pending record.
///
/// # Errors
/// Returns `AuthError::OAuthStateMismatch` when nothing is pending or the value
/// differs from `<provider>:<nonce>`. Matching is exact: a state that carries
/// the right nonce under a different provider is rejected.
pub fn verify_state(stored: Option<OAuthState>, received: &str) -> Result<OAuthState, AuthError> {
    match stored {
        Some(stored) if stored.state_param() == received => Ok(stored),
        Some(_) => Err(AuthError::OAuthStateMismatch),
        None => {
            debug!("callback state received with no pending flow");
            Err(AuthError::OAuthStateMismatch)
        }
    }
}

/// What a finalized callback asks the caller to do next.
#[derive(Debug)]
pub enum FinalizeStep {
    /// Commit this grant and route by role.
    Grant {
        grant: SessionGrant,
        purpose: Option<OAuthPurpose>,
    },
    /// Hand the browser to the backend to finish the code exchange.
    Redirect(Url),
}

#[derive(Clone)]
pub struct OAuthFlowController {
    client: HttpClient,
    flow: CredentialAuthFlow,
    pending: OAuthStateStore,
    providers: ProviderRegistry,
    callback_url: Url,
}

impl OAuthFlowController {
    #[must_use]
    pub fn new(
        client: HttpClient,
        pending: OAuthStateStore,
        providers: ProviderRegistry,
        callback_url: Url,
    ) -> Self {
        Self {
            flow: CredentialAuthFlow::new(client.clone()),
            client,
            pending,
            providers,
            callback_url,
        }
    }

    #[must_use]
    pub fn pending(&self) -> Option<OAuthState> {
        self.pending.peek()
    }

    /// Starts a provider flow and returns the URL to send the browser to.
    ///
    /// # Errors
    /// Returns `OAuthNotConfigured` for an unknown provider or a missing client
    /// id (nothing is stored in either case), otherwise request or storage
    /// errors.
    #[instrument(skip(self))]
    pub async fn start(&self, provider: &str, purpose: OAuthPurpose) -> Result<Url, AuthError> {
        let name = normalize_provider(provider);
        let Some(config) = self.providers.get(&name) else {
            warn!("sign-in requested for unknown provider {}", name);
            return Err(AuthError::OAuthNotConfigured(name));
        };

        let response: OAuthStartResponse = self
            .client
            .get_public(OAUTH_START_PATH, &[("provider", name.as_str())])
            .await?;

        let client_id = response
            .client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::OAuthNotConfigured(name.clone()))?;
        let nonce = response.state.trim();
        if nonce.is_empty() {
            return Err(AuthError::InvalidResponse(
                "OAuth start returned an empty state".to_string(),
            ));
        }

        let state = OAuthState {
            nonce: nonce.to_string(),
            provider: name,
            purpose,
        };
        let url = build_authorization_url(config, client_id, &self.callback_url, &state)?;
        self.pending.save(&state)?;

        info!(?purpose, "redirecting to {}", state.provider);
        Ok(url)
    }

    /// Finishes a callback. The pending record is consumed whatever the
    /// outcome, so a state value can never be replayed.
    ///
    /// # Errors
    /// Returns `OAuthProviderError`, `OAuthStateMismatch`,
    /// `OAuthCallbackMalformed`, or the error of the backend call it made.
    #[instrument(skip(self, params))]
    pub async fn finalize(&self, params: &CallbackParams) -> Result<FinalizeStep, AuthError> {
        let kind = classify(params);
        let pending = self.pending.take()?;

        match kind {
            CallbackKind::ProviderError(description) => {
                warn!("provider returned an error");
                Err(AuthError::OAuthProviderError(description))
            }
            CallbackKind::DirectToken { token, provider } => {
                let provider = provider.or_else(|| pending.as_ref().map(|p| p.provider.clone()));
                self.ensure_mode(provider.as_deref(), CallbackMode::DirectToken)?;

                let grant = self
                    .flow
                    .complete_grant(TokenResponse {
                        access_token: token,
                        user: None,
                    })
                    .await?;
                Ok(FinalizeStep::Grant {
                    grant,
                    purpose: pending.map(|p| p.purpose),
                })
            }
            CallbackKind::CodeExchange { code, state } => {
                let stored = verify_state(pending, &state)?;
                self.ensure_mode(Some(&stored.provider), CallbackMode::CodeExchange)?;

                let mut url = self
                    .client
                    .endpoint(&format!("/auth/oauth/{}/callback", stored.provider))?;
                url.query_pairs_mut()
                    .append_pair("code", &code)
                    .append_pair("state", &state);
                debug!("handing code exchange to the backend");
                Ok(FinalizeStep::Redirect(url))
            }
            CallbackKind::ProfileRelay(profile) => {
                let request = OAuthRelayRequest {
                    provider: &profile.provider,
                    provider_account_id: &profile.account_id,
                    email: profile.email.as_deref(),
                    name: profile.name.as_deref(),
                    access_token: &profile.access_token,
                    refresh_token: profile.refresh_token.as_deref(),
                    expires_in: profile.expires_in,
                };
                let response: TokenResponse =
                    self.client.post_public(OAUTH_RELAY_PATH, &request).await?;
                let grant = self.flow.complete_grant(response).await?;
                Ok(FinalizeStep::Grant {
                    grant,
                    purpose: pending.map(|p| p.purpose),
                })
            }
            CallbackKind::Malformed => Err(AuthError::OAuthCallbackMalformed),
        }
    }

    fn ensure_mode(&self, provider: Option<&str>, received: CallbackMode) -> Result<(), AuthError> {
        let expected = provider
            .and_then(|name| self.providers.get(name))
            .map_or(CallbackMode::Auto, |config| config.callback);
        if expected.accepts(received) {
            Ok(())
        } else {
            warn!(?expected, ?received, "callback shape not allowed for provider");
            Err(AuthError::OAuthCallbackMalformed)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> CallbackParams {
        CallbackParams::from_pairs(pairs.iter().copied())
    }

    fn pending(provider: &str, nonce: &str) -> OAuthState {
        OAuthState {
            nonce: nonce.to_string(),
            provider: provider.to_string(),
            purpose: OAuthPurpose::Login,
        }
    }

    #[test]
    fn classification_table() {
        assert_eq!(
            classify(&params(&[("error", "access_denied"), ("code", "c"), ("state", "s")])),
            CallbackKind::ProviderError("access_denied".to_string())
        );
        assert_eq!(
            classify(&params(&[
                ("error", "access_denied"),
                ("error_description", "User cancelled")
            ])),
            CallbackKind::ProviderError("User cancelled".to_string())
        );
        assert_eq!(
            classify(&params(&[("token", "t"), ("code", "c"), ("state", "s")])),
            CallbackKind::DirectToken {
                token: "t".to_string(),
                provider: None
            }
        );
        assert_eq!(
            classify(&params(&[("code", "c"), ("state", "google:n")])),
            CallbackKind::CodeExchange {
                code: "c".to_string(),
                state: "google:n".to_string()
            }
        );
        assert_eq!(
            classify(&params(&[("code", "c")])),
            CallbackKind::Malformed
        );
        assert_eq!(classify(&params(&[])), CallbackKind::Malformed);
        assert_eq!(
            classify(&params(&[("code", "c"), ("state", "")])),
            CallbackKind::Malformed
        );
    }

    #[test]
    fn classifies_profile_relay() {
        let kind = classify(&params(&[
            ("provider", "Google"),
            ("access_token", "ya29"),
            ("id", "1234"),
            ("email", "alice@example.com"),
            ("expires_in", "3599"),
        ]));
        let CallbackKind::ProfileRelay(profile) = kind else {
            panic!("expected a profile relay");
        };
        assert_eq!(profile.provider, "google");
        assert_eq!(profile.account_id, "1234");
        assert_eq!(profile.expires_in, Some(3599));

        assert_eq!(
            classify(&params(&[("provider", "google"), ("access_token", "ya29")])),
            CallbackKind::Malformed
        );
    }

    #[test]
    fn verify_state_requires_exact_match() {
        let stored = pending("google", "abc");
        assert!(verify_state(Some(stored.clone()), "google:abc").is_ok());
        assert_eq!(
            verify_state(Some(stored.clone()), "google:abd"),
            Err(AuthError::OAuthStateMismatch)
        );
        assert_eq!(
            verify_state(Some(stored), "microsoft:abc"),
            Err(AuthError::OAuthStateMismatch)
        );
        assert_eq!(
            verify_state(None, "google:abc"),
            Err(AuthError::OAuthStateMismatch)
        );
    }

    #[test]
    fn authorization_url_carries_provider_settings() {
        let registry = ProviderRegistry::default();
        let redirect = Url::parse("http://localhost:3000/oauth-callback").unwrap();

        let google = build_authorization_url(
            registry.get("google").unwrap(),
            "cid",
            &redirect,
            &pending("google", "n1"),
        )
        .unwrap();
        let query: BTreeMap<String, String> = google.query_pairs().into_owned().collect();
        assert_eq!(google.host_str(), Some("accounts.google.com"));
        assert_eq!(query["client_id"], "cid");
        assert_eq!(query["redirect_uri"], "http://localhost:3000/oauth-callback");
        assert_eq!(query["scope"], "openid email profile");
        assert_eq!(query["state"], "google:n1");
        assert_eq!(query["access_type"], "offline");
        assert_eq!(query["prompt"], "consent");

        let apple = build_authorization_url(
            registry.get("Apple").unwrap(),
            "cid",
            &redirect,
            &pending("apple", "n2"),
        )
        .unwrap();
        let query: BTreeMap<String, String> = apple.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "code id_token");
        assert_eq!(query["response_mode"], "form_post");
        assert!(!query.contains_key("prompt"));
    }

    #[test]
    fn callback_mode_acceptance() {
        assert!(CallbackMode::Auto.accepts(CallbackMode::DirectToken));
        assert!(CallbackMode::CodeExchange.accepts(CallbackMode::CodeExchange));
        assert!(!CallbackMode::CodeExchange.accepts(CallbackMode::DirectToken));
    }

    #[test]
    fn registry_lists_default_providers() {
        let registry = ProviderRegistry::default();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["apple", "google", "microsoft"]
        );
        assert!(registry.get("github").is_none());
    }
}
