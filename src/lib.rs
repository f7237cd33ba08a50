//! # dashboard-session (Client Session & OAuth Federation)
//!
//! `dashboard-session` is the client-side authentication core shared by the
//! regulation search, pipeline control, and analysis dashboards. Every other
//! dashboard feature is an ordinary HTTP client that consumes the bearer token
//! this crate produces.
//!
//! ## Session Lifecycle
//!
//! A session is a bearer token paired with the user profile it belongs to. The
//! pair is committed and cleared as one unit by the [`session::TokenStore`] and
//! survives restarts. On startup a stored pair is exposed immediately and then
//! confirmed against `GET /auth/me`.
//!
//! ## Teardown
//!
//! A `401` on any authenticated request is the only global teardown trigger. The
//! [`session::HttpClient`] tags each request with the session generation it was
//! sent under, so concurrent failures tear the session down once.
//!
//! ## OAuth Federation
//!
//! Third-party sign-in spans a redirect, so the pending flow is persisted as an
//! `OAuthState` record (single-use CSRF nonce) and rebuilt from the callback query
//! by [`session::OAuthFlowController`].

pub mod cli;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Commit hash recorded at build time, or `unknown` outside a git checkout.
#[must_use]
pub fn git_commit_hash() -> &'static str {
    built_info::GIT_COMMIT_HASH.unwrap_or("unknown")
}
