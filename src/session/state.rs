//! Shared session state. The context owns the state machine value, the token
//! store, and a generation counter that changes whenever the stored token does.
//! Commit and teardown both run under the generation lock, which is what makes
//! stale sign-ins detectable and concurrent teardowns collapse into one. While a
//! logout is in progress no grant can be committed.

use super::{
    errors::AuthError,
    storage::TokenStore,
    types::{SessionGrant, UserProfile},
};
use secrecy::SecretString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use url::Url;

/// Route paths the session core navigates to.
pub mod paths {
    pub const LOGIN: &str = "/login";
    pub const SIGNUP: &str = "/signup";
    pub const DASHBOARD: &str = "/dashboard";
    pub const ADMIN_PANEL: &str = "/admin-panel";
    pub const OAUTH_CALLBACK: &str = "/oauth-callback";
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    /// A stored token is being confirmed; the cached profile, if any, is
    /// available for rendering while the refresh runs.
    Initializing { cached: Option<UserProfile> },
    Authenticated(UserProfile),
}

impl SessionState {
    #[must_use]
    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            Self::Authenticated(profile) => Some(profile),
            Self::Initializing { cached } => cached.as_ref(),
            Self::Anonymous => None,
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Redirect requested by the session core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Navigation {
    To(&'static str),
    External(Url),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownReason {
    Logout,
    Unauthorized,
    RefreshFailed,
}

/// Landing route for a freshly authenticated profile.
#[must_use]
pub fn landing_route(profile: &UserProfile) -> &'static str {
    if profile.is_admin() {
        paths::ADMIN_PANEL
    } else {
        paths::DASHBOARD
    }
}

#[derive(Default)]
struct Generation {
    value: u64,
    logouts: usize,
}

pub struct SessionContext {
    store: TokenStore,
    generation: Mutex<Generation>,
    state: watch::Sender<SessionState>,
    navigation: mpsc::UnboundedSender<Navigation>,
}

impl SessionContext {
    /// Builds the context from whatever the store holds. A stored token starts
    /// the session in `Initializing`.
    pub fn new(store: TokenStore) -> (Arc<Self>, mpsc::UnboundedReceiver<Navigation>) {
        let (token, cached) = store.get();
        let initial = if token.is_some() {
            debug!("found stored session, awaiting profile refresh");
            SessionState::Initializing { cached }
        } else {
            SessionState::Anonymous
        };

        let (state, _) = watch::channel(initial);
        let (navigation, receiver) = mpsc::unbounded_channel();

        (
            Arc::new(Self {
                store,
                generation: Mutex::new(Generation::default()),
                state,
                navigation,
            }),
            receiver,
        )
    }

    fn lock(&self) -> MutexGuard<'_, Generation> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().value
    }

    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Reads the generation and the token it belongs to in one step.
    pub(crate) fn snapshot(&self) -> (u64, Option<SecretString>) {
        let generation = self.lock();
        (generation.value, self.store.token())
    }

    /// Commits a new token and profile if no session change happened since
    /// `expected` was read.
    ///
    /// # Errors
    /// Returns `AuthError::Superseded` for a stale grant or one landing during a
    /// logout, or `AuthError::Storage` if the pair cannot be persisted.
    pub fn commit(&self, expected: u64, grant: &SessionGrant) -> Result<(), AuthError> {
        let mut generation = self.lock();
        if generation.value != expected || generation.logouts > 0 {
            warn!(
                "discarding sign-in for {}: session changed while it was in flight",
                grant.profile.username
            );
            return Err(AuthError::Superseded);
        }

        self.store.set(&grant.token, &grant.profile)?;
        generation.value += 1;
        self.state
            .send_replace(SessionState::Authenticated(grant.profile.clone()));

        info!("session established for {}", grant.profile.username);
        Ok(())
    }

    /// Rewrites the cached profile for the current token without changing the
    /// generation.
    ///
    /// # Errors
    /// Returns `AuthError::Superseded` if the session changed since `expected`,
    /// `AuthError::SessionExpired` if no token is stored, or `AuthError::Storage`.
    pub fn confirm_profile(&self, expected: u64, profile: UserProfile) -> Result<(), AuthError> {
        let generation = self.lock();
        if generation.value != expected || generation.logouts > 0 {
            return Err(AuthError::Superseded);
        }
        let token = self.store.token().ok_or(AuthError::SessionExpired)?;

        self.store.set(&token, &profile)?;
        self.state.send_replace(SessionState::Authenticated(profile));
        Ok(())
    }

    /// Clears the session and redirects to login.
    ///
    /// With `expected` set, teardown only happens if the session is still the one
    /// that generation refers to; a failure reported against an older session is
    /// ignored. Returns `true` only for the call that actually cleared state.
    pub fn teardown(&self, expected: Option<u64>, reason: TeardownReason) -> bool {
        let mut generation = self.lock();
        if let Some(expected) = expected {
            if generation.value != expected {
                debug!(?reason, "teardown skipped, session already changed");
                return false;
            }
        }

        self.clear(&mut generation, reason)
    }

    /// Starts a logout: invalidates every sign-in already in flight and blocks
    /// new commits until the returned ticket is dropped, which clears the
    /// session. The ticket carries the token to notify the backend with.
    pub fn begin_logout(self: &Arc<Self>) -> LogoutTicket {
        let mut generation = self.lock();
        generation.value += 1;
        generation.logouts += 1;
        let token = self.store.token();
        drop(generation);

        debug!("logout started");
        LogoutTicket {
            context: Arc::clone(self),
            token,
        }
    }

    fn finish_logout(&self) {
        let mut generation = self.lock();
        generation.logouts = generation.logouts.saturating_sub(1);
        self.clear(&mut generation, TeardownReason::Logout);
    }

    fn clear(&self, generation: &mut Generation, reason: TeardownReason) -> bool {
        generation.value += 1;

        let active =
            !self.store.is_empty() || !matches!(*self.state.borrow(), SessionState::Anonymous);
        if !active {
            debug!(?reason, "teardown skipped, session already cleared");
            return false;
        }

        if let Err(err) = self.store.clear() {
            error!("Failed to clear stored session: {}", err);
        }
        self.state.send_replace(SessionState::Anonymous);
        self.navigate(Navigation::To(paths::LOGIN));

        info!(?reason, "session cleared");
        true
    }

    pub fn navigate(&self, navigation: Navigation) {
        debug!(?navigation, "navigation requested");
        if self.navigation.send(navigation).is_err() {
            debug!("navigation receiver dropped");
        }
    }
}

/// An in-progress logout. Dropping it, even when the logout future is
/// cancelled, clears the session.
pub struct LogoutTicket {
    context: Arc<SessionContext>,
    token: Option<SecretString>,
}

impl LogoutTicket {
    #[must_use]
    pub fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }
}

impl Drop for LogoutTicket {
    fn drop(&mut self) {
        self.context.finish_logout();
    }
}
