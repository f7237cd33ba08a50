use crate::cli::actions::{auth, oauth, Action};
use anyhow::Result;

/// Execute the provided action.
// This is the single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Login(args) => auth::login(args).await,
        Action::Signup(args) => auth::signup(args).await,
        Action::Logout(globals) => auth::logout(globals).await,
        Action::Whoami(globals) => auth::whoami(globals).await,
        Action::UpdateProfile(args) => auth::update_profile(args).await,
        Action::Guard(args) => auth::guard(args).await,
        Action::OAuthStart(args) => oauth::start(args).await,
        Action::OAuthFinalize(args) => oauth::finalize(args).await,
    }
}
