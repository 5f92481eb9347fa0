use crate::api::handlers::auth::session::MAX_SESSION_TTL;
use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_PUBLIC_URL: &str = "public-url";
pub const ARG_SESSION_COOKIE_NAME: &str = "session-cookie-name";
pub const ARG_SESSION_COOKIE_SECURE: &str = "session-cookie-secure";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_ADMIN_EMAIL: &str = "admin-email";

#[derive(Debug, Clone)]
pub struct Options {
    pub public_url: String,
    pub session_cookie_name: String,
    pub session_cookie_secure: bool,
    pub session_ttl_seconds: u64,
    pub admin_email: Option<String>,
}

impl Options {
    /// Parse session and admin arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the public URL is not http(s), the cookie name is
    /// blank or the session TTL is zero or longer than a year.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let public_url = matches
            .get_one::<String>(ARG_PUBLIC_URL)
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or_default();
        let parsed = url::Url::parse(&public_url)
            .map_err(|e| anyhow::anyhow!("invalid --{ARG_PUBLIC_URL} '{public_url}': {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("--{ARG_PUBLIC_URL} must be an http or https URL");
        }

        let session_cookie_name = matches
            .get_one::<String>(ARG_SESSION_COOKIE_NAME)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_SESSION_COOKIE_NAME}"))?;

        let session_ttl_seconds = matches
            .get_one::<u64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .unwrap_or(86_400);
        if session_ttl_seconds == 0 || session_ttl_seconds > MAX_SESSION_TTL.as_secs() {
            anyhow::bail!(
                "--{ARG_SESSION_TTL_SECONDS} must be between 1 and {}",
                MAX_SESSION_TTL.as_secs()
            );
        }

        Ok(Self {
            public_url,
            session_cookie_name,
            session_cookie_secure: matches.get_flag(ARG_SESSION_COOKIE_SECURE),
            session_ttl_seconds,
            admin_email: matches.get_one::<String>(ARG_ADMIN_EMAIL).cloned(),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PUBLIC_URL)
                .long(ARG_PUBLIC_URL)
                .help("Public base URL of the storefront")
                .long_help(
                    "Public base URL of the storefront. Session cookies are marked Secure when it uses https.",
                )
                .env("ZEEK_PUBLIC_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE_NAME)
                .long(ARG_SESSION_COOKIE_NAME)
                .help("Name of the session cookie")
                .env("ZEEK_SESSION_COOKIE_NAME")
                .default_value("zeek-session"),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE_SECURE)
                .long(ARG_SESSION_COOKIE_SECURE)
                .help("Always mark the session cookie Secure")
                .env("ZEEK_SESSION_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds, counted from creation")
                .env("ZEEK_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ADMIN_EMAIL)
                .long(ARG_ADMIN_EMAIL)
                .help("Email of the account allowed into /admin")
                .env("ZEEK_ADMIN_EMAIL"),
        )
}
