//! Maps validated CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, rate_limit, server};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let server_opts = server::Options::parse(matches)?;
    let auth_opts = auth::Options::parse(matches)?;
    let rate_limit_opts = rate_limit::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port: server_opts.port,
        public_dir: server_opts.public_dir,
        protected_dir: server_opts.protected_dir,
        data_dir: server_opts.data_dir,
        public_url: auth_opts.public_url,
        session_cookie_name: auth_opts.session_cookie_name,
        session_cookie_secure: auth_opts.session_cookie_secure,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        admin_email: auth_opts.admin_email,
        rate_limit_window_seconds: rate_limit_opts.window_seconds,
        rate_limit_max_requests: rate_limit_opts.max_requests,
        trust_proxy_headers: rate_limit_opts.trust_proxy_headers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn builds_server_action() {
        temp_env::with_vars(
            [
                ("ZEEK_PORT", Some("8443")),
                ("ZEEK_ADMIN_EMAIL", Some("admin@zeek.shop")),
                ("ZEEK_RATE_LIMIT_MAX_REQUESTS", Some("10")),
                ("ZEEK_PUBLIC_URL", None::<&str>),
            ],
            || {
                let matches = commands::new().get_matches_from(vec!["zeek"]);
                let action = handler(&matches);
                assert!(action.is_ok());
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.port, 8443);
                    assert_eq!(args.admin_email.as_deref(), Some("admin@zeek.shop"));
                    assert_eq!(args.rate_limit_max_requests, 10);
                    assert_eq!(args.public_url, "http://localhost:3000");
                }
            },
        );
    }

    #[test]
    fn rejects_invalid_public_url() {
        temp_env::with_vars([("ZEEK_PUBLIC_URL", Some("zeek.shop"))], || {
            let matches = commands::new().get_matches_from(vec!["zeek"]);
            assert!(handler(&matches).is_err());
        });
    }
}
