//! Runtime configuration for the session core. Values are public endpoints and
//! timings; nothing secret belongs here.

use super::{errors::AuthError, oauth::ProviderRegistry};
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CALLBACK_URL: &str = "http://localhost:3000/oauth-callback";
/// Default request timeout applied to every backend call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause between a fatal OAuth error and the forced login redirect.
pub const DEFAULT_FATAL_REDIRECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub api_base_url: Url,
    pub callback_url: Url,
    pub request_timeout: Duration,
    pub fatal_redirect_delay: Duration,
    pub providers: ProviderRegistry,
}

impl SessionConfig {
    /// Builds a config with defaults for everything but the backend URL.
    ///
    /// # Errors
    /// Returns `AuthError::Config` if `api_base_url` is not an absolute http(s) URL.
    pub fn new(api_base_url: &str) -> Result<Self, AuthError> {
        Ok(Self {
            api_base_url: parse_base_url(api_base_url)?,
            callback_url: parse_http_url(DEFAULT_CALLBACK_URL)?,
            request_timeout: DEFAULT_TIMEOUT,
            fatal_redirect_delay: DEFAULT_FATAL_REDIRECT_DELAY,
            providers: ProviderRegistry::default(),
        })
    }

    /// # Errors
    /// Returns `AuthError::Config` if `callback_url` is not an absolute http(s) URL.
    pub fn with_callback_url(mut self, callback_url: &str) -> Result<Self, AuthError> {
        self.callback_url = parse_http_url(callback_url)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_fatal_redirect_delay(mut self, delay: Duration) -> Self {
        self.fatal_redirect_delay = delay;
        self
    }

    #[must_use]
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }
}

fn parse_http_url(value: &str) -> Result<Url, AuthError> {
    let url = Url::parse(value.trim())
        .map_err(|err| AuthError::Config(format!("Invalid URL {value}: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(AuthError::Config(format!(
            "Unsupported scheme {scheme} in {value}"
        ))),
    }
}

/// Parses the API base and forces a trailing slash so relative joins keep any
/// path prefix (`https://host/api` + `auth/me` -> `https://host/api/auth/me`).
fn parse_base_url(value: &str) -> Result<Url, AuthError> {
    let mut url = parse_http_url(value)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
