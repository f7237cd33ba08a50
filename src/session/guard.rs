//! Route gating. UX-only: the backend still enforces access on every request.

use super::state::{landing_route, paths, SessionState};

/// What a route requires before it renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    None,
    Authenticated,
    Admin,
    /// Login and signup pages; signed-in users are sent to their landing route.
    Guest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    /// The session is still being confirmed; show a loading state.
    Defer,
    Redirect(&'static str),
}

#[must_use]
pub fn evaluate(state: &SessionState, required: Capability) -> GuardDecision {
    match (state, required) {
        (_, Capability::None) => GuardDecision::Render,
        (SessionState::Initializing { .. }, _) => GuardDecision::Defer,
        (SessionState::Anonymous, Capability::Guest) => GuardDecision::Render,
        (SessionState::Anonymous, _) => GuardDecision::Redirect(paths::LOGIN),
        (SessionState::Authenticated(profile), Capability::Guest) => {
            GuardDecision::Redirect(landing_route(profile))
        }
        (SessionState::Authenticated(profile), Capability::Admin) if !profile.is_admin() => {
            GuardDecision::Redirect(paths::DASHBOARD)
        }
        (SessionState::Authenticated(_), _) => GuardDecision::Render,
    }
}
