pub mod auth;
pub mod oauth;

// Internal "interpreter" for `Action`.
mod run;

use crate::cli::globals::GlobalArgs;
use crate::session::{Navigation, UserProfile};
use anyhow::Result;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug)]
pub enum Action {
    Login(auth::LoginArgs),
    Signup(auth::SignupArgs),
    Logout(GlobalArgs),
    Whoami(GlobalArgs),
    UpdateProfile(auth::UpdateArgs),
    Guard(auth::GuardArgs),
    OAuthStart(oauth::StartArgs),
    OAuthFinalize(oauth::FinalizeArgs),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        run::execute(self).await
    }
}

fn print_profile(profile: &UserProfile) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(profile)?);
    Ok(())
}

fn print_navigation(navigation: &Navigation) {
    match navigation {
        Navigation::To(path) => println!("redirect: {path}"),
        Navigation::External(url) => println!("open: {url}"),
    }
}

/// Prints every redirect the session core requested so far.
fn drain_navigation(receiver: &mut UnboundedReceiver<Navigation>) {
    while let Ok(navigation) = receiver.try_recv() {
        print_navigation(&navigation);
    }
}
