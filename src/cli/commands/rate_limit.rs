use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_RATE_LIMIT_WINDOW_SECONDS: &str = "rate-limit-window-seconds";
pub const ARG_RATE_LIMIT_MAX_REQUESTS: &str = "rate-limit-max-requests";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";

#[derive(Debug, Clone)]
pub struct Options {
    pub window_seconds: u64,
    pub max_requests: u32,
    pub trust_proxy_headers: bool,
}

impl Options {
    /// Parse rate limit arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the window is zero while limiting is enabled.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let window_seconds = matches
            .get_one::<u64>(ARG_RATE_LIMIT_WINDOW_SECONDS)
            .copied()
            .unwrap_or(900);
        let max_requests = matches
            .get_one::<u32>(ARG_RATE_LIMIT_MAX_REQUESTS)
            .copied()
            .unwrap_or(100);

        if window_seconds == 0 && max_requests > 0 {
            anyhow::bail!("--{ARG_RATE_LIMIT_WINDOW_SECONDS} must be greater than zero");
        }

        Ok(Self {
            window_seconds,
            max_requests,
            trust_proxy_headers: matches.get_flag(ARG_TRUST_PROXY_HEADERS),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .long(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .help("Rate limit window in seconds")
                .env("ZEEK_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_MAX_REQUESTS)
                .long(ARG_RATE_LIMIT_MAX_REQUESTS)
                .help("Requests allowed per client and window (0 disables limiting)")
                .env("ZEEK_RATE_LIMIT_MAX_REQUESTS")
                .default_value("100")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Key the rate limiter on x-forwarded-for / x-real-ip")
                .env("ZEEK_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
}
