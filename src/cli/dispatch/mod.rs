//! Maps parsed CLI arguments to an [`Action`].

use crate::cli::actions::{
    auth::{GuardArgs, LoginArgs, SignupArgs, UpdateArgs},
    oauth::{FinalizeArgs, StartArgs},
    Action,
};
use crate::cli::commands::{auth, oauth, session};
use crate::cli::globals::GlobalArgs;
use crate::session::{Capability, Credential, OAuthPurpose, ProfileUpdate, Role, SignupDraft};
use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use url::Url;

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("missing required argument: {name}"))
}

fn credential(matches: &ArgMatches) -> Result<Credential> {
    Ok(Credential::new(
        required(matches, auth::ARG_USERNAME)?,
        required(matches, auth::ARG_PASSWORD)?,
    ))
}

fn signup_draft(matches: &ArgMatches) -> Result<SignupDraft> {
    let password = required(matches, auth::ARG_PASSWORD)?;
    let confirm = matches
        .get_one::<String>(auth::ARG_CONFIRM_PASSWORD)
        .map_or(password, String::as_str);
    let role = match matches.get_one::<String>(auth::ARG_ROLE).map(String::as_str) {
        Some("admin") => Role::Admin,
        _ => Role::User,
    };

    Ok(SignupDraft::new(
        required(matches, auth::ARG_USERNAME)?,
        required(matches, auth::ARG_EMAIL)?,
        password,
        confirm,
    )
    .with_role(role))
}

fn capability(matches: &ArgMatches) -> Result<Capability> {
    match required(matches, auth::ARG_CAPABILITY)? {
        "none" => Ok(Capability::None),
        "authenticated" => Ok(Capability::Authenticated),
        "admin" => Ok(Capability::Admin),
        "guest" => Ok(Capability::Guest),
        other => Err(anyhow!("unknown capability: {other}")),
    }
}

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let globals = GlobalArgs::new(session::Options::parse(matches)?);

    let action = match matches.subcommand() {
        Some((auth::CMD_LOGIN, sub)) => Action::Login(LoginArgs {
            globals,
            credential: credential(sub)?,
            admin: false,
        }),
        Some((auth::CMD_ADMIN_LOGIN, sub)) => Action::Login(LoginArgs {
            globals,
            credential: credential(sub)?,
            admin: true,
        }),
        Some((auth::CMD_SIGNUP, sub)) => Action::Signup(SignupArgs {
            globals,
            draft: signup_draft(sub)?,
        }),
        Some((auth::CMD_LOGOUT, _)) => Action::Logout(globals),
        Some((auth::CMD_WHOAMI, _)) => Action::Whoami(globals),
        Some((auth::CMD_UPDATE_PROFILE, sub)) => Action::UpdateProfile(UpdateArgs {
            globals,
            update: ProfileUpdate {
                username: sub.get_one::<String>(auth::ARG_USERNAME).cloned(),
                email: sub.get_one::<String>(auth::ARG_EMAIL).cloned(),
            },
        }),
        Some((auth::CMD_GUARD, sub)) => Action::Guard(GuardArgs {
            globals,
            capability: capability(sub)?,
        }),
        Some((oauth::CMD_OAUTH_START, sub)) => Action::OAuthStart(StartArgs {
            globals,
            provider: required(sub, oauth::ARG_PROVIDER)?.to_string(),
            purpose: if sub.get_flag(oauth::ARG_SIGNUP) {
                OAuthPurpose::Signup
            } else {
                OAuthPurpose::Login
            },
        }),
        Some((oauth::CMD_OAUTH_FINALIZE, sub)) => {
            let raw = required(sub, oauth::ARG_CALLBACK)?;
            Action::OAuthFinalize(FinalizeArgs {
                globals,
                callback: Url::parse(raw).context("invalid callback URL")?,
            })
        }
        Some((name, _)) => return Err(anyhow!("unknown command: {name}")),
        None => return Err(anyhow!("missing command")),
    };

    Ok(action)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    fn dispatch(args: &[&str]) -> Result<Action> {
        let vars = [
            ("DASHBOARD_PASSWORD", None::<&str>),
            ("DASHBOARD_CONFIRM_PASSWORD", None),
            ("DASHBOARD_USERNAME", None),
            ("DASHBOARD_STATE_DIR", None),
        ];
        temp_env::with_vars(vars, || {
            let mut argv = vec!["dashboard-session"];
            argv.extend_from_slice(args);
            handler(&commands::new().get_matches_from(argv))
        })
    }

    #[test]
    fn login_and_admin_login() {
        let action = dispatch(&["login", "alice", "--password", "correct-pw"]).unwrap();
        let Action::Login(args) = action else {
            panic!("expected login action");
        };
        assert!(!args.admin);
        assert_eq!(args.credential.identifier, "alice");
        assert_eq!(args.credential.secret.expose_secret(), "correct-pw");

        let action = dispatch(&["admin-login", "root", "--password", "pw"]).unwrap();
        assert!(matches!(action, Action::Login(LoginArgs { admin: true, .. })));
    }

    #[test]
    fn signup_confirmation_defaults_to_password() {
        let action = dispatch(&[
            "signup",
            "alice",
            "--email",
            "alice@example.com",
            "--password",
            "secret1",
        ])
        .unwrap();
        let Action::Signup(args) = action else {
            panic!("expected signup action");
        };
        assert_eq!(args.draft.confirm_password.expose_secret(), "secret1");
        assert_eq!(args.draft.role, Role::User);
    }

    #[test]
    fn oauth_commands() {
        let action = dispatch(&["oauth-start", "google", "--signup"]).unwrap();
        assert!(matches!(
            action,
            Action::OAuthStart(StartArgs {
                purpose: OAuthPurpose::Signup,
                ..
            })
        ));

        let action = dispatch(&[
            "oauth-finalize",
            "http://localhost:3000/oauth-callback?code=c&state=google:n",
        ])
        .unwrap();
        let Action::OAuthFinalize(args) = action else {
            panic!("expected finalize action");
        };
        assert_eq!(args.callback.path(), "/oauth-callback");

        assert!(dispatch(&["oauth-finalize", "not a url"]).is_err());
    }

    #[test]
    fn guard_capability() {
        let action = dispatch(&["guard", "admin"]).unwrap();
        assert!(matches!(
            action,
            Action::Guard(GuardArgs {
                capability: Capability::Admin,
                ..
            })
        ));
    }
}
