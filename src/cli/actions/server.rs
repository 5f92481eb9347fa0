use crate::{
    api::{
        self,
        email::LogMailer,
        handlers::auth::{AuthConfig, AuthState},
        AppState,
    },
    cli::telemetry,
    records::{FileSubscriberStore, FileUserStore},
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub public_dir: PathBuf,
    pub protected_dir: PathBuf,
    pub data_dir: PathBuf,
    pub public_url: String,
    pub session_cookie_name: String,
    pub session_cookie_secure: bool,
    pub session_ttl_seconds: u64,
    pub admin_email: Option<String>,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_max_requests: u32,
    pub trust_proxy_headers: bool,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.public_url.clone())
            .with_session_cookie_name(self.session_cookie_name.clone())
            .with_secure_cookie(self.session_cookie_secure)
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_admin_email(self.admin_email.clone())
            .with_rate_limit_window_seconds(self.rate_limit_window_seconds)
            .with_rate_limit_max_requests(self.rate_limit_max_requests)
            .with_trust_proxy_headers(self.trust_proxy_headers)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the data directory cannot be created or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    tokio::fs::create_dir_all(&args.data_dir)
        .await
        .with_context(|| format!("Failed to create data dir {}", args.data_dir.display()))?;

    let config = args.auth_config();

    if config.admin_email().is_none() {
        warn!("No admin email configured, /admin is closed to everyone");
    }
    if !config.session_cookie_secure() {
        warn!("Session cookies are not marked Secure, serve over https in production");
    }
    if config.rate_limit_max_requests() == 0 {
        warn!("Rate limiting disabled");
    }

    debug!(
        public_url = config.public_url(),
        session_ttl_seconds = config.session_ttl_seconds(),
        "auth configuration"
    );

    let users = Arc::new(FileUserStore::new(&args.data_dir));
    let state = AppState {
        auth: Arc::new(AuthState::in_memory(config, users)),
        subscribers: Arc::new(FileSubscriberStore::new(&args.data_dir)),
        mailer: Arc::new(LogMailer),
        public_dir: args.public_dir,
        protected_dir: args.protected_dir,
    };

    let result = api::new(args.port, state).await;

    telemetry::shutdown_tracer();

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_from_args() {
        let args = Args {
            port: 3000,
            public_dir: PathBuf::from("public"),
            protected_dir: PathBuf::from("protected"),
            data_dir: PathBuf::from("data"),
            public_url: "http://localhost:3000".to_string(),
            session_cookie_name: "sid".to_string(),
            session_cookie_secure: true,
            session_ttl_seconds: 120,
            admin_email: Some("Admin@Zeek.Shop".to_string()),
            rate_limit_window_seconds: 60,
            rate_limit_max_requests: 5,
            trust_proxy_headers: true,
        };

        let config = args.auth_config();
        assert_eq!(config.session_cookie_name(), "sid");
        assert!(config.session_cookie_secure());
        assert_eq!(config.session_ttl_seconds(), 120);
        assert_eq!(config.admin_email(), Some("admin@zeek.shop"));
        assert_eq!(config.rate_limit_max_requests(), 5);
        assert!(config.trust_proxy_headers());
    }
}
