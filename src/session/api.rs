//! HTTP helpers for the dashboard backend with consistent timeouts and error
//! handling. Authenticated helpers attach the bearer token from the session
//! context and turn a `401` into a single teardown; public helpers never touch
//! the session. Tokens only travel in the `Authorization` header.

use super::{
    config::SessionConfig,
    errors::{normalize_error_body, AuthError},
    state::{SessionContext, TeardownReason},
};
use crate::APP_USER_AGENT;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};
use url::Url;

/// Request client shared by the auth flows and every feature client.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    context: Arc<SessionContext>,
}

impl HttpClient {
    /// # Errors
    /// Returns `AuthError::Config` if the underlying client cannot be built.
    pub fn new(config: &SessionConfig, context: Arc<SessionContext>) -> Result<Self, AuthError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| AuthError::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            context,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a backend path against the configured API base.
    ///
    /// # Errors
    /// Returns `AuthError::Config` if the path cannot be joined.
    pub fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base_url
            .join(path.trim().trim_start_matches('/'))
            .map_err(|err| AuthError::Config(format!("Invalid endpoint {path}: {err}")))
    }

    /// Fetches JSON from a public endpoint.
    ///
    /// # Errors
    /// Returns `NetworkFailure`, `Rejected` with the normalized body, or
    /// `InvalidResponse` if the body does not decode.
    pub async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AuthError> {
        let request = self.client.get(self.endpoint(path)?).query(query);
        let response = send(request, Method::GET, path).await?;
        handle_json_response(response).await
    }

    /// Posts JSON to a public endpoint. A `401` here is an ordinary endpoint
    /// error, not a session failure.
    ///
    /// # Errors
    /// Returns `NetworkFailure`, `Rejected`, or `InvalidResponse`.
    pub async fn post_public<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        let request = self.client.post(self.endpoint(path)?).json(body);
        let response = send(request, Method::POST, path).await?;
        handle_json_response(response).await
    }

    /// Fetches JSON with a token that has not been committed yet. A `401` means
    /// the token was never valid; it comes back as `Rejected` and leaves the
    /// current session alone.
    ///
    /// # Errors
    /// As [`HttpClient::get_public`].
    pub async fn get_with_token<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &SecretString,
    ) -> Result<T, AuthError> {
        let request = self
            .client
            .get(self.endpoint(path)?)
            .bearer_auth(token.expose_secret());
        let response = send(request, Method::GET, path).await?;
        handle_json_response(response).await
    }

    /// Fetches JSON with the session token.
    ///
    /// # Errors
    /// Returns `SessionExpired` after a teardown, otherwise as
    /// [`HttpClient::get_public`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthError> {
        let response = self
            .send_authorized(Method::GET, path, None::<&()>)
            .await?;
        handle_json_response(response).await
    }

    /// Posts JSON with the session token.
    ///
    /// # Errors
    /// Returns `SessionExpired` after a teardown, otherwise as
    /// [`HttpClient::get_public`].
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        let response = self.send_authorized(Method::POST, path, Some(body)).await?;
        handle_json_response(response).await
    }

    /// Replaces a resource with the session token.
    ///
    /// # Errors
    /// Returns `SessionExpired` after a teardown, otherwise as
    /// [`HttpClient::get_public`].
    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        let response = self.send_authorized(Method::PUT, path, Some(body)).await?;
        handle_json_response(response).await
    }

    /// Deletes a resource with the session token, ignoring any response body.
    ///
    /// # Errors
    /// Returns `SessionExpired` after a teardown, `NetworkFailure`, or `Rejected`.
    pub async fn delete(&self, path: &str) -> Result<(), AuthError> {
        let response = self
            .send_authorized(Method::DELETE, path, None::<&()>)
            .await?;
        handle_empty_response(response).await
    }

    /// Posts an empty body with a token captured by the caller. Used to end a
    /// session that is already being torn down, so a `401` is just `Rejected`.
    ///
    /// # Errors
    /// Returns `NetworkFailure` or `Rejected`.
    pub async fn post_with_token(
        &self,
        path: &str,
        token: &SecretString,
    ) -> Result<(), AuthError> {
        let request = self
            .client
            .post(self.endpoint(path)?)
            .bearer_auth(token.expose_secret());
        let response = send(request, Method::POST, path).await?;
        handle_empty_response(response).await
    }

    async fn send_authorized<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, AuthError> {
        let url = self.endpoint(path)?;
        let (generation, token) = self.context.snapshot();
        let Some(token) = token else {
            debug!("no stored token for {}", path);
            return Err(AuthError::SessionExpired);
        };

        let mut request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = send(request, method, path).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            if self
                .context
                .teardown(Some(generation), TeardownReason::Unauthorized)
            {
                warn!("{} rejected the session token, session cleared", path);
            }
            return Err(AuthError::SessionExpired);
        }

        Ok(response)
    }
}

async fn send(request: RequestBuilder, method: Method, path: &str) -> Result<Response, AuthError> {
    let span = info_span!(
        "session.request",
        http.method = %method,
        path = %path
    );
    request
        .send()
        .instrument(span)
        .await
        .map_err(map_request_error)
}

/// Maps transport errors into `NetworkFailure` with timeout detection.
fn map_request_error(err: reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::NetworkFailure("Request timed out. Please try again.".to_string())
    } else {
        AuthError::NetworkFailure(err.without_url().to_string())
    }
}

/// Parses JSON responses and surfaces HTTP errors with normalized bodies.
async fn handle_json_response<T: DeserializeOwned>(response: Response) -> Result<T, AuthError> {
    if response.status().is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| AuthError::InvalidResponse(format!("Failed to decode response: {err}")))
    } else {
        Err(rejected(response).await)
    }
}

async fn handle_empty_response(response: Response) -> Result<(), AuthError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(rejected(response).await)
    }
}

async fn rejected(response: Response) -> AuthError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    AuthError::Rejected {
        status,
        message: normalize_error_body(&body),
    }
}
