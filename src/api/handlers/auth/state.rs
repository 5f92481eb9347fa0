//! Auth configuration and shared guard state.

use std::sync::Arc;
use std::time::Duration;

use super::{
    rate_limit::{FixedWindowRateLimiter, NoopRateLimiter, RateLimiter},
    session::{MemorySessionStore, SessionStore, MAX_SESSION_TTL},
};
use crate::records::UserStore;

const DEFAULT_SESSION_TTL_SECONDS: u64 = 24 * 60 * 60;
const DEFAULT_SESSION_COOKIE_NAME: &str = "zeek-session";
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 15 * 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    public_url: String,
    session_cookie_name: String,
    session_ttl_seconds: u64,
    force_secure_cookie: bool,
    admin_email: Option<String>,
    rate_limit_window_seconds: u64,
    rate_limit_max_requests: u32,
    trust_proxy_headers: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(public_url: String) -> Self {
        Self {
            public_url,
            session_cookie_name: DEFAULT_SESSION_COOKIE_NAME.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            force_secure_cookie: false,
            admin_email: None,
            rate_limit_window_seconds: DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            trust_proxy_headers: false,
        }
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: String) -> Self {
        self.session_cookie_name = name;
        self
    }

    /// Capped at `MAX_SESSION_TTL`.
    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds.min(MAX_SESSION_TTL.as_secs());
        self
    }

    #[must_use]
    pub fn with_secure_cookie(mut self, force: bool) -> Self {
        self.force_secure_cookie = force;
        self
    }

    /// Admin identity, compared against the normalized session email.
    #[must_use]
    pub fn with_admin_email(mut self, email: Option<String>) -> Self {
        self.admin_email = email
            .map(|email| email.trim().to_lowercase())
            .filter(|email| !email.is_empty());
        self
    }

    #[must_use]
    pub fn with_rate_limit_window_seconds(mut self, seconds: u64) -> Self {
        self.rate_limit_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rate_limit_max_requests(mut self, max_requests: u32) -> Self {
        self.rate_limit_max_requests = max_requests;
        self
    }

    #[must_use]
    pub fn with_trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    #[must_use]
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    #[must_use]
    pub fn session_cookie_name(&self) -> &str {
        &self.session_cookie_name
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> u64 {
        self.session_ttl_seconds
    }

    /// Cookies are `Secure` when the site is served over HTTPS or when forced.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.force_secure_cookie || self.public_url.starts_with("https://")
    }

    #[must_use]
    pub fn admin_email(&self) -> Option<&str> {
        self.admin_email.as_deref()
    }

    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds)
    }

    #[must_use]
    pub fn rate_limit_max_requests(&self) -> u32 {
        self.rate_limit_max_requests
    }

    #[must_use]
    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }
}

pub struct AuthState {
    config: AuthConfig,
    sessions: Arc<dyn SessionStore>,
    rate_limiter: Arc<dyn RateLimiter>,
    users: Arc<dyn UserStore>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        sessions: Arc<dyn SessionStore>,
        rate_limiter: Arc<dyn RateLimiter>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            config,
            sessions,
            rate_limiter,
            users,
        }
    }

    /// Single-process state: in-memory sessions and rate-limit windows.
    /// A ceiling of zero requests disables rate limiting.
    pub fn in_memory(config: AuthConfig, users: Arc<dyn UserStore>) -> Self {
        let rate_limiter: Arc<dyn RateLimiter> = if config.rate_limit_max_requests() == 0 {
            Arc::new(NoopRateLimiter)
        } else {
            Arc::new(FixedWindowRateLimiter::new(
                config.rate_limit_window(),
                config.rate_limit_max_requests(),
            ))
        };
        Self::new(
            config,
            Arc::new(MemorySessionStore::new()),
            rate_limiter,
            users,
        )
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    /// Shared handle, so blocking lookups can move it onto the blocking pool.
    #[must_use]
    pub fn users(&self) -> Arc<dyn UserStore> {
        Arc::clone(&self.users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("http://localhost:3000".to_string());

        assert_eq!(config.session_cookie_name(), DEFAULT_SESSION_COOKIE_NAME);
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(
            config.rate_limit_window(),
            Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECONDS)
        );
        assert_eq!(
            config.rate_limit_max_requests(),
            DEFAULT_RATE_LIMIT_MAX_REQUESTS
        );
        assert!(!config.session_cookie_secure());
        assert!(config.admin_email().is_none());
        assert!(!config.trust_proxy_headers());

        let config = config
            .with_session_cookie_name("sid".to_string())
            .with_session_ttl_seconds(60)
            .with_admin_email(Some(" Admin@Zeek.Shop ".to_string()))
            .with_rate_limit_window_seconds(10)
            .with_rate_limit_max_requests(5)
            .with_trust_proxy_headers(true);

        assert_eq!(config.session_cookie_name(), "sid");
        assert_eq!(config.session_ttl(), Duration::from_secs(60));
        assert_eq!(config.admin_email(), Some("admin@zeek.shop"));
        assert_eq!(config.rate_limit_window(), Duration::from_secs(10));
        assert_eq!(config.rate_limit_max_requests(), 5);
        assert!(config.trust_proxy_headers());
    }

    #[test]
    fn secure_cookie_follows_https_or_override() {
        assert!(AuthConfig::new("https://zeek.shop".to_string()).session_cookie_secure());
        assert!(AuthConfig::new("http://localhost:3000".to_string())
            .with_secure_cookie(true)
            .session_cookie_secure());
    }

    #[test]
    fn session_ttl_is_capped() {
        let config =
            AuthConfig::new("http://localhost".to_string()).with_session_ttl_seconds(u64::MAX);
        assert_eq!(config.session_ttl(), MAX_SESSION_TTL);
    }

    #[test]
    fn blank_admin_email_means_no_admin() {
        let config =
            AuthConfig::new("http://localhost".to_string()).with_admin_email(Some("  ".into()));
        assert!(config.admin_email().is_none());
    }
}
