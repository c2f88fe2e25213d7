use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_TOTP_SEAL_KEY: &str = "totp-seal-key";
pub const ARG_TOTP_ISSUER: &str = "totp-issuer";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOTP_ISSUER)
                .long(ARG_TOTP_ISSUER)
                .help("Issuer label embedded in otpauth:// provisioning URIs")
                .env("ENROLLA_TOTP_ISSUER")
                .default_value("Enrolla"),
        )
        .arg(
            Arg::new(ARG_TOTP_SEAL_KEY)
                .long(ARG_TOTP_SEAL_KEY)
                .help("32-byte hex key used to seal TOTP seeds at rest")
                .long_help(
                    "32-byte key, hex encoded (64 characters), used to seal TOTP seeds at rest. All instances must share this key; rotating it invalidates stored seeds.",
                )
                .env("ENROLLA_TOTP_SEAL_KEY")
                .required(true),
        )
}

#[derive(Debug, Clone)]
pub struct Options {
    pub issuer: String,
    pub seal_key: SecretString,
}

impl Options {
    /// Extract TOTP options from parsed CLI matches.
    ///
    /// # Errors
    /// Returns an error if the required seal key argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            issuer: matches
                .get_one::<String>(ARG_TOTP_ISSUER)
                .cloned()
                .context("missing totp-issuer")?,
            seal_key: matches
                .get_one::<String>(ARG_TOTP_SEAL_KEY)
                .map(|key| SecretString::from(key.clone()))
                .context("missing required argument: --totp-seal-key")?,
        })
    }
}
