//! Maps validated CLI matches to the action the binary executes.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{relay, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if relay arguments are invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let relay_opts = relay::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        protection_key: relay_opts.protection_key,
        users_file: relay_opts.users_file,
        response_ttl_seconds: relay_opts.response_ttl_seconds,
        lockout_max_attempts: relay_opts.lockout_max_attempts,
        lockout_seconds: relay_opts.lockout_seconds,
    }))
}
