use super::{drain_navigation, print_navigation, print_profile};
use crate::cli::globals::GlobalArgs;
use crate::session::{CallbackParams, ErrorDisposition, OAuthOutcome, OAuthPurpose};
use anyhow::Result;
use std::time::Duration;
use url::Url;

#[derive(Debug)]
pub struct StartArgs {
    pub globals: GlobalArgs,
    pub provider: String,
    pub purpose: OAuthPurpose,
}

#[derive(Debug)]
pub struct FinalizeArgs {
    pub globals: GlobalArgs,
    pub callback: Url,
}

/// Prints the provider URL to open. The pending flow is kept in the state
/// directory until `oauth-finalize` consumes it.
///
/// # Errors
/// Returns an error if the provider is not configured or the backend fails.
pub async fn start(args: StartArgs) -> Result<()> {
    let (manager, _navigation) = args.globals.manager()?;
    let url = manager.start_oauth(&args.provider, args.purpose).await?;
    println!("{url}");
    Ok(())
}

/// # Errors
/// Returns the callback error after printing any forced redirect.
pub async fn finalize(args: FinalizeArgs) -> Result<()> {
    let (manager, mut navigation) = args.globals.manager()?;
    let params = CallbackParams::from_url(&args.callback);

    match manager.finalize_oauth(&params).await {
        Ok(OAuthOutcome::Authenticated(profile)) => {
            print_profile(&profile)?;
            drain_navigation(&mut navigation);
            Ok(())
        }
        Ok(OAuthOutcome::Redirected(_)) => {
            drain_navigation(&mut navigation);
            Ok(())
        }
        Err(err) => {
            if err.disposition() == ErrorDisposition::FatalRedirect {
                let wait = manager.config().fatal_redirect_delay + Duration::from_secs(1);
                if let Ok(Some(redirect)) = tokio::time::timeout(wait, navigation.recv()).await {
                    print_navigation(&redirect);
                }
            }
            Err(err.into())
        }
    }
}
