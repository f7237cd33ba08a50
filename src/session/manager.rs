//! Session state machine and the single entry point the UI layer talks to.
//!
//! Every operation that ends in a commit captures the session generation
//! before its first await. If a logout or a `401` teardown happens while the
//! request is in flight, the commit is rejected with `Superseded` and the
//! cleared session stays cleared.

use super::{
    api::HttpClient,
    config::SessionConfig,
    credentials::CredentialAuthFlow,
    errors::{AuthError, ErrorDisposition},
    guard::{evaluate, Capability, GuardDecision},
    oauth::{CallbackParams, FinalizeStep, OAuthFlowController},
    state::{landing_route, paths, Navigation, SessionContext, SessionState, TeardownReason},
    storage::{OAuthStateStore, TokenStore},
    types::{
        Credential, OAuthPurpose, OAuthState, ProfileUpdate, SessionGrant, SignupDraft,
        SignupOutcome, UserProfile,
    },
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Result of a successfully handled OAuth callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OAuthOutcome {
    Authenticated(UserProfile),
    /// The backend finishes the code exchange; the browser was sent there.
    Redirected(Url),
}

pub struct SessionManager {
    config: SessionConfig,
    context: Arc<SessionContext>,
    client: HttpClient,
    credentials: CredentialAuthFlow,
    oauth: OAuthFlowController,
}

impl SessionManager {
    /// Wires the stores into a manager. A stored token leaves the session in
    /// `Initializing` until [`SessionManager::initialize`] runs.
    ///
    /// # Errors
    /// Returns `AuthError::Config` if the HTTP client cannot be built.
    pub fn new(
        config: SessionConfig,
        store: TokenStore,
        pending: OAuthStateStore,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Navigation>), AuthError> {
        let (context, navigation) = SessionContext::new(store);
        let client = HttpClient::new(&config, context.clone())?;
        let credentials = CredentialAuthFlow::new(client.clone());
        let oauth = OAuthFlowController::new(
            client.clone(),
            pending,
            config.providers.clone(),
            config.callback_url.clone(),
        );

        Ok((
            Self {
                config,
                context,
                client,
                credentials,
                oauth,
            },
            navigation,
        ))
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.context.state()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.context.subscribe()
    }

    /// Authenticated client for feature requests (search, pipeline, ...).
    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn pending_oauth(&self) -> Option<OAuthState> {
        self.oauth.pending()
    }

    #[must_use]
    pub fn guard(&self, required: Capability) -> GuardDecision {
        evaluate(&self.state(), required)
    }

    /// Confirms a stored session against the backend.
    ///
    /// A valid token rewrites the cached profile; a `401` tears the session
    /// down through the client, and any other failure clears it as well.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> SessionState {
        let (generation, token) = self.context.snapshot();
        if token.is_none() {
            return self.state();
        }

        match self.credentials.fetch_profile().await {
            Ok(profile) => match self.context.confirm_profile(generation, profile) {
                Ok(()) => debug!("stored session confirmed"),
                Err(AuthError::Superseded) => debug!("session changed during refresh"),
                Err(err) => {
                    warn!("Failed to confirm stored session: {}", err);
                    self.context
                        .teardown(Some(generation), TeardownReason::RefreshFailed);
                }
            },
            Err(AuthError::SessionExpired) => debug!("stored token rejected"),
            Err(err) => {
                warn!("Failed to refresh stored session: {}", err);
                self.context
                    .teardown(Some(generation), TeardownReason::RefreshFailed);
            }
        }

        self.state()
    }

    /// # Errors
    /// Returns `InvalidCredentials`, `NetworkFailure`, or `Superseded` when the
    /// session changed while the request was in flight.
    pub async fn login(&self, credential: &Credential) -> Result<UserProfile, AuthError> {
        let generation = self.context.generation();
        let grant = self.credentials.login(credential).await?;
        self.establish(generation, grant)
    }

    /// # Errors
    /// See [`SessionManager::login`].
    pub async fn admin_login(&self, credential: &Credential) -> Result<UserProfile, AuthError> {
        let generation = self.context.generation();
        let grant = self.credentials.admin_login(credential).await?;
        self.establish(generation, grant)
    }

    fn establish(&self, generation: u64, grant: SessionGrant) -> Result<UserProfile, AuthError> {
        self.context.commit(generation, &grant)?;
        self.context
            .navigate(Navigation::To(landing_route(&grant.profile)));
        Ok(grant.profile)
    }

    /// Registers an account without signing in.
    ///
    /// # Errors
    /// Returns `ValidationFailed` or a request error.
    pub async fn signup(&self, draft: &SignupDraft) -> Result<SignupOutcome, AuthError> {
        self.credentials.signup(draft).await
    }

    /// Ends the session. Sign-ins still in flight are discarded from the moment
    /// this is called. The backend is notified when a token exists, but the
    /// local session is cleared whatever that call returns.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let ticket = self.context.begin_logout();
        if let Some(token) = ticket.token() {
            if let Err(err) = self.credentials.notify_logout(token).await {
                debug!("logout notification failed: {}", err);
            }
        }
        drop(ticket);
    }

    /// # Errors
    /// Returns `ValidationFailed`, `SessionExpired` after a teardown, or
    /// `Superseded` if the session changed meanwhile.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, AuthError> {
        let generation = self.context.generation();
        let profile = self.credentials.update_profile(update).await?;
        self.context.confirm_profile(generation, profile.clone())?;
        info!("profile updated for {}", profile.username);
        Ok(profile)
    }

    /// Starts a provider flow and asks the UI to leave for the provider.
    ///
    /// # Errors
    /// Returns `OAuthNotConfigured` or a request error; nothing is stored then.
    pub async fn start_oauth(&self, provider: &str, purpose: OAuthPurpose) -> Result<Url, AuthError> {
        let url = self.oauth.start(provider, purpose).await?;
        self.context.navigate(Navigation::External(url.clone()));
        Ok(url)
    }

    /// Handles the provider callback.
    ///
    /// Fatal errors (state mismatch, provider error) schedule a redirect to
    /// login after the configured delay so the message can be shown first.
    ///
    /// # Errors
    /// Returns the callback error, or `Superseded` for a stale grant.
    pub async fn finalize_oauth(&self, params: &CallbackParams) -> Result<OAuthOutcome, AuthError> {
        let generation = self.context.generation();

        match self.oauth.finalize(params).await {
            Ok(FinalizeStep::Grant { grant, purpose }) => {
                debug!(?purpose, "provider sign-in completed");
                self.establish(generation, grant)
                    .map(OAuthOutcome::Authenticated)
            }
            Ok(FinalizeStep::Redirect(url)) => {
                self.context.navigate(Navigation::External(url.clone()));
                Ok(OAuthOutcome::Redirected(url))
            }
            Err(err) => {
                if err.disposition() == ErrorDisposition::FatalRedirect {
                    self.schedule_login_redirect();
                }
                Err(err)
            }
        }
    }

    fn schedule_login_redirect(&self) {
        let context = self.context.clone();
        let delay = self.config.fatal_redirect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            context.navigate(Navigation::To(paths::LOGIN));
        });
    }
}
