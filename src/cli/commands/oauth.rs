use clap::{Arg, ArgAction, Command};

pub const CMD_OAUTH_START: &str = "oauth-start";
pub const CMD_OAUTH_FINALIZE: &str = "oauth-finalize";

pub const ARG_PROVIDER: &str = "provider";
pub const ARG_SIGNUP: &str = "signup";
pub const ARG_CALLBACK: &str = "callback";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .subcommand(
            Command::new(CMD_OAUTH_START)
                .about("Start a provider sign-in and print the authorization URL")
                .arg(
                    Arg::new(ARG_PROVIDER)
                        .help("Identity provider, e.g. google, microsoft, apple")
                        .required(true),
                )
                .arg(
                    Arg::new(ARG_SIGNUP)
                        .long("signup")
                        .help("Mark the flow as a registration")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new(CMD_OAUTH_FINALIZE)
                .about("Finish a provider sign-in from the callback URL")
                .arg(
                    Arg::new(ARG_CALLBACK)
                        .help("Full callback URL the provider redirected to")
                        .required(true),
                ),
        )
}
