use crate::{identity::memory::MAX_LOCKOUT_SECONDS, payloads::MAX_TTL_SECONDS};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_PROTECTION_KEY: &str = "protection-key";
pub const ARG_USERS_FILE: &str = "users-file";
pub const ARG_RESPONSE_TTL_SECONDS: &str = "response-ttl-seconds";
pub const ARG_LOCKOUT_MAX_ATTEMPTS: &str = "lockout-max-attempts";
pub const ARG_LOCKOUT_SECONDS: &str = "lockout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub protection_key: Option<SecretString>,
    pub users_file: Option<String>,
    pub response_ttl_seconds: i64,
    pub lockout_max_attempts: u32,
    pub lockout_seconds: i64,
}

impl Options {
    /// Parse relay arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a TTL or lockout value is not positive or exceeds
    /// its upper bound (one day for the TTL, one year for the lockout).
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // Helper to filter empty strings which clap might pass through if env vars are set to ""
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let response_ttl_seconds = matches
            .get_one::<i64>(ARG_RESPONSE_TTL_SECONDS)
            .copied()
            .unwrap_or(60);
        if !(1..=MAX_TTL_SECONDS).contains(&response_ttl_seconds) {
            anyhow::bail!("--{ARG_RESPONSE_TTL_SECONDS} must be between 1 and {MAX_TTL_SECONDS}");
        }

        let lockout_max_attempts = matches
            .get_one::<u32>(ARG_LOCKOUT_MAX_ATTEMPTS)
            .copied()
            .unwrap_or(5);
        if lockout_max_attempts == 0 {
            anyhow::bail!("--{ARG_LOCKOUT_MAX_ATTEMPTS} must be greater than zero");
        }

        let lockout_seconds = matches
            .get_one::<i64>(ARG_LOCKOUT_SECONDS)
            .copied()
            .unwrap_or(300);
        if !(1..=MAX_LOCKOUT_SECONDS).contains(&lockout_seconds) {
            anyhow::bail!("--{ARG_LOCKOUT_SECONDS} must be between 1 and {MAX_LOCKOUT_SECONDS}");
        }

        Ok(Self {
            protection_key: get_non_empty(ARG_PROTECTION_KEY).map(SecretString::from),
            users_file: get_non_empty(ARG_USERS_FILE),
            response_ttl_seconds,
            lockout_max_attempts,
            lockout_seconds,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROTECTION_KEY)
                .long(ARG_PROTECTION_KEY)
                .help("Envelope protection key, 32 bytes base64url")
                .long_help(
                    "Envelope protection key: 32 random bytes, base64url encoded without padding.\n\nThe dispatching app must use the same key. When omitted an ephemeral key is generated and every envelope sealed elsewhere is rejected.",
                )
                .env("SIGNIN_RELAY_PROTECTION_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_USERS_FILE)
                .long(ARG_USERS_FILE)
                .help("JSON file with the users of the in-memory identity store")
                .env("SIGNIN_RELAY_USERS_FILE"),
        )
        .arg(
            Arg::new(ARG_RESPONSE_TTL_SECONDS)
                .long(ARG_RESPONSE_TTL_SECONDS)
                .help("Lifetime of sealed login responses in seconds")
                .env("SIGNIN_RELAY_RESPONSE_TTL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_MAX_ATTEMPTS)
                .long(ARG_LOCKOUT_MAX_ATTEMPTS)
                .help("Failed password attempts before an account is locked out")
                .env("SIGNIN_RELAY_LOCKOUT_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_SECONDS)
                .long(ARG_LOCKOUT_SECONDS)
                .help("Account lockout duration in seconds")
                .env("SIGNIN_RELAY_LOCKOUT_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn command() -> Command {
        with_args(Command::new("signin-relay"))
    }

    #[test]
    fn defaults() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("SIGNIN_RELAY_PROTECTION_KEY", None::<&str>),
                ("SIGNIN_RELAY_USERS_FILE", None::<&str>),
                ("SIGNIN_RELAY_RESPONSE_TTL_SECONDS", None::<&str>),
                ("SIGNIN_RELAY_LOCKOUT_MAX_ATTEMPTS", None::<&str>),
                ("SIGNIN_RELAY_LOCKOUT_SECONDS", None::<&str>),
            ],
            || {
                let matches = command().get_matches_from(vec!["signin-relay"]);
                let options = Options::parse(&matches)?;
                assert!(options.protection_key.is_none());
                assert!(options.users_file.is_none());
                assert_eq!(options.response_ttl_seconds, 60);
                assert_eq!(options.lockout_max_attempts, 5);
                assert_eq!(options.lockout_seconds, 300);
                Ok(())
            },
        )
    }

    #[test]
    fn env_fallbacks() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("SIGNIN_RELAY_PROTECTION_KEY", Some("c2VjcmV0")),
                ("SIGNIN_RELAY_USERS_FILE", Some("/etc/signin-relay/users.json")),
                ("SIGNIN_RELAY_RESPONSE_TTL_SECONDS", Some("15")),
                ("SIGNIN_RELAY_LOCKOUT_MAX_ATTEMPTS", Some("3")),
                ("SIGNIN_RELAY_LOCKOUT_SECONDS", Some("90")),
            ],
            || {
                let matches = command().get_matches_from(vec!["signin-relay"]);
                let options = Options::parse(&matches)?;
                assert_eq!(
                    options
                        .protection_key
                        .as_ref()
                        .map(|key| key.expose_secret().to_string()),
                    Some("c2VjcmV0".to_string())
                );
                assert_eq!(
                    options.users_file.as_deref(),
                    Some("/etc/signin-relay/users.json")
                );
                assert_eq!(options.response_ttl_seconds, 15);
                assert_eq!(options.lockout_max_attempts, 3);
                assert_eq!(options.lockout_seconds, 90);
                Ok(())
            },
        )
    }

    #[test]
    fn empty_key_is_treated_as_missing() -> anyhow::Result<()> {
        temp_env::with_vars([("SIGNIN_RELAY_PROTECTION_KEY", Some(" "))], || {
            let matches = command().get_matches_from(vec!["signin-relay"]);
            assert!(Options::parse(&matches)?.protection_key.is_none());
            Ok(())
        })
    }

    #[test]
    fn non_positive_values_are_rejected() {
        for args in [
            vec!["signin-relay", "--response-ttl-seconds", "0"],
            vec!["signin-relay", "--lockout-max-attempts", "0"],
            vec!["signin-relay", "--lockout-seconds", "0"],
        ] {
            temp_env::with_vars(
                [
                    ("SIGNIN_RELAY_RESPONSE_TTL_SECONDS", None::<&str>),
                    ("SIGNIN_RELAY_LOCKOUT_MAX_ATTEMPTS", None::<&str>),
                    ("SIGNIN_RELAY_LOCKOUT_SECONDS", None::<&str>),
                ],
                || {
                    let matches = command().get_matches_from(args.clone());
                    assert!(Options::parse(&matches).is_err(), "{args:?}");
                },
            );
        }
    }

    #[test]
    fn oversized_values_are_rejected() {
        for (args, flag) in [
            (
                vec!["signin-relay", "--response-ttl-seconds", "100000000000000"],
                ARG_RESPONSE_TTL_SECONDS,
            ),
            (
                vec!["signin-relay", "--response-ttl-seconds", "86401"],
                ARG_RESPONSE_TTL_SECONDS,
            ),
            (
                vec!["signin-relay", "--lockout-seconds", "100000000000000"],
                ARG_LOCKOUT_SECONDS,
            ),
        ] {
            temp_env::with_vars(
                [
                    ("SIGNIN_RELAY_RESPONSE_TTL_SECONDS", None::<&str>),
                    ("SIGNIN_RELAY_LOCKOUT_SECONDS", None::<&str>),
                ],
                || {
                    let matches = command().get_matches_from(args.clone());
                    let result = Options::parse(&matches);
                    assert!(
                        result
                            .as_ref()
                            .is_err_and(|err| err.to_string().contains(flag)),
                        "{args:?}"
                    );
                },
            );
        }
    }

    #[test]
    fn upper_bounds_are_accepted() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("SIGNIN_RELAY_RESPONSE_TTL_SECONDS", Some("86400")),
                ("SIGNIN_RELAY_LOCKOUT_SECONDS", Some("31536000")),
            ],
            || {
                let matches = command().get_matches_from(vec!["signin-relay"]);
                let options = Options::parse(&matches)?;
                assert_eq!(options.response_ttl_seconds, MAX_TTL_SECONDS);
                assert_eq!(options.lockout_seconds, MAX_LOCKOUT_SECONDS);
                Ok(())
            },
        )
    }
}
