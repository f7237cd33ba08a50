//! Client-side session core.
//!
//! Flow Overview:
//! 1) On startup the manager reads the durable store. A stored token leaves the
//!    session `Initializing` with the cached profile visible; `initialize`
//!    confirms it against `/auth/me` or clears it.
//! 2) Credential sign-in posts to `/auth/login` (or `/auth/admin-login`), resolves
//!    the profile, and commits token and profile together.
//! 3) Provider sign-in stores a pending `OAuthState`, leaves for the provider,
//!    and finishes on the callback route after the state is verified.
//! 4) Any `401` on an authenticated request clears the session once and sends
//!    the UI to `/login`.
//!
//! Security boundaries:
//! - Tokens and passwords are `SecretString` and never logged.
//! - Route guards are UX only; the backend authorizes every request.

pub mod api;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod guard;
pub mod manager;
pub mod oauth;
pub mod state;
pub mod storage;
pub mod types;

pub use api::HttpClient;
pub use config::SessionConfig;
pub use credentials::CredentialAuthFlow;
pub use errors::{normalize_error_body, AuthError, ErrorDisposition};
pub use guard::{evaluate, Capability, GuardDecision};
pub use manager::{OAuthOutcome, SessionManager};
pub use oauth::{
    classify, verify_state, CallbackKind, CallbackMode, CallbackParams, OAuthFlowController,
    ProviderConfig, ProviderRegistry,
};
pub use state::{landing_route, paths, Navigation, SessionState};
pub use storage::{FileStore, KeyValueStore, MemoryStore, OAuthStateStore, TokenStore};
pub use types::{
    Credential, OAuthPurpose, OAuthState, ProfileUpdate, Role, SignupDraft, SignupOutcome,
    UserProfile,
};
