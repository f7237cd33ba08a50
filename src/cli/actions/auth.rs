use super::{drain_navigation, print_profile};
use crate::cli::globals::GlobalArgs;
use crate::session::{
    Capability, Credential, GuardDecision, ProfileUpdate, SessionState, SignupDraft,
    SignupOutcome,
};
use anyhow::{bail, Result};
use tracing::{debug, info};

#[derive(Debug)]
pub struct LoginArgs {
    pub globals: GlobalArgs,
    pub credential: Credential,
    pub admin: bool,
}

#[derive(Debug)]
pub struct SignupArgs {
    pub globals: GlobalArgs,
    pub draft: SignupDraft,
}

#[derive(Debug)]
pub struct UpdateArgs {
    pub globals: GlobalArgs,
    pub update: ProfileUpdate,
}

#[derive(Debug)]
pub struct GuardArgs {
    pub globals: GlobalArgs,
    pub capability: Capability,
}

/// # Errors
/// Returns an error if the credentials are rejected or the backend is unreachable.
pub async fn login(args: LoginArgs) -> Result<()> {
    let (manager, mut navigation) = args.globals.manager()?;

    let profile = if args.admin {
        manager.admin_login(&args.credential).await?
    } else {
        manager.login(&args.credential).await?
    };

    info!("signed in as {}", profile.username);
    print_profile(&profile)?;
    drain_navigation(&mut navigation);
    Ok(())
}

/// # Errors
/// Returns an error if validation fails or the backend rejects the account.
pub async fn signup(args: SignupArgs) -> Result<()> {
    let (manager, _navigation) = args.globals.manager()?;

    match manager.signup(&args.draft).await? {
        SignupOutcome::Created(profile) => {
            print_profile(&profile)?;
            println!("Account created, sign in with `login`.");
        }
        SignupOutcome::PendingConfirmation(message) => println!("{message}"),
    }
    Ok(())
}

/// # Errors
/// Returns an error if the stores cannot be opened.
pub async fn logout(globals: GlobalArgs) -> Result<()> {
    let (manager, mut navigation) = globals.manager()?;
    manager.logout().await;
    drain_navigation(&mut navigation);
    Ok(())
}

/// # Errors
/// Returns an error if no session is stored or it could not be confirmed.
pub async fn whoami(globals: GlobalArgs) -> Result<()> {
    let (manager, mut navigation) = globals.manager()?;

    let state = manager.initialize().await;
    drain_navigation(&mut navigation);

    match state {
        SessionState::Authenticated(profile) => print_profile(&profile),
        SessionState::Initializing { .. } | SessionState::Anonymous => bail!("not signed in"),
    }
}

/// # Errors
/// Returns an error if the update is rejected or the session expired.
pub async fn update_profile(args: UpdateArgs) -> Result<()> {
    let (manager, mut navigation) = args.globals.manager()?;

    let result = manager.update_profile(&args.update).await;
    drain_navigation(&mut navigation);

    print_profile(&result?)
}

/// # Errors
/// Returns an error if the stores cannot be opened.
pub async fn guard(args: GuardArgs) -> Result<()> {
    let (manager, mut navigation) = args.globals.manager()?;

    manager.initialize().await;
    drain_navigation(&mut navigation);

    let decision = manager.guard(args.capability);
    debug!(?decision, capability = ?args.capability, "guard evaluated");
    match decision {
        GuardDecision::Render => println!("render"),
        GuardDecision::Defer => println!("defer"),
        GuardDecision::Redirect(path) => println!("redirect: {path}"),
    }
    Ok(())
}
