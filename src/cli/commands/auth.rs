use clap::{Arg, ArgAction, Command};

pub const CMD_LOGIN: &str = "login";
pub const CMD_ADMIN_LOGIN: &str = "admin-login";
pub const CMD_SIGNUP: &str = "signup";
pub const CMD_LOGOUT: &str = "logout";
pub const CMD_WHOAMI: &str = "whoami";
pub const CMD_UPDATE_PROFILE: &str = "update-profile";
pub const CMD_GUARD: &str = "guard";

pub const ARG_USERNAME: &str = "username";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_CONFIRM_PASSWORD: &str = "confirm-password";
pub const ARG_EMAIL: &str = "email";
pub const ARG_ROLE: &str = "role";
pub const ARG_CAPABILITY: &str = "capability";

fn username() -> Arg {
    Arg::new(ARG_USERNAME)
        .help("Account username")
        .env("DASHBOARD_USERNAME")
        .required(true)
}

fn password() -> Arg {
    Arg::new(ARG_PASSWORD)
        .long("password")
        .help("Account password")
        .env("DASHBOARD_PASSWORD")
        .hide_env_values(true)
        .required(true)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .subcommand(
            Command::new(CMD_LOGIN)
                .about("Sign in with username and password")
                .arg(username())
                .arg(password()),
        )
        .subcommand(
            Command::new(CMD_ADMIN_LOGIN)
                .about("Sign in through the admin endpoint")
                .arg(username())
                .arg(password()),
        )
        .subcommand(
            Command::new(CMD_SIGNUP)
                .about("Register a new account (does not sign in)")
                .arg(username())
                .arg(
                    Arg::new(ARG_EMAIL)
                        .long("email")
                        .help("Account email")
                        .required(true),
                )
                .arg(password())
                .arg(
                    Arg::new(ARG_CONFIRM_PASSWORD)
                        .long("confirm-password")
                        .help("Password confirmation (defaults to --password)")
                        .env("DASHBOARD_CONFIRM_PASSWORD")
                        .hide_env_values(true),
                )
                .arg(
                    Arg::new(ARG_ROLE)
                        .long("role")
                        .help("Requested role")
                        .value_parser(["user", "admin"])
                        .default_value("user"),
                ),
        )
        .subcommand(Command::new(CMD_LOGOUT).about("End the stored session"))
        .subcommand(Command::new(CMD_WHOAMI).about("Confirm and print the stored session"))
        .subcommand(
            Command::new(CMD_UPDATE_PROFILE)
                .about("Update the signed-in profile")
                .arg(
                    Arg::new(ARG_USERNAME)
                        .long("username")
                        .help("New username"),
                )
                .arg(Arg::new(ARG_EMAIL).long("email").help("New email"))
                .arg_required_else_help(true),
        )
        .subcommand(
            Command::new(CMD_GUARD)
                .about("Evaluate route access for the stored session")
                .arg(
                    Arg::new(ARG_CAPABILITY)
                        .help("Capability the route requires")
                        .value_parser(["none", "authenticated", "admin", "guest"])
                        .required(true)
                        .action(ArgAction::Set),
                ),
        )
}
