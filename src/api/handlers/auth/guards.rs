//! Route guards over the resolved session.

use super::{session::SessionContext, state::AuthConfig, types::Identity};
use crate::api::error::ApiError;

/// Any logged-in user.
///
/// # Errors
/// `ApiError::Unauthenticated` when the session holds no user.
pub fn require_auth(session: &SessionContext) -> Result<&Identity, ApiError> {
    session.user().ok_or(ApiError::Unauthenticated)
}

/// Only the configured admin identity. A known but different user is
/// `Forbidden`, never `Unauthenticated`.
///
/// # Errors
/// `ApiError::Unauthenticated` without a user, `ApiError::Forbidden` otherwise.
pub fn require_admin<'a>(
    session: &'a SessionContext,
    config: &AuthConfig,
) -> Result<&'a Identity, ApiError> {
    let user = require_auth(session)?;
    if is_admin(user, config) {
        Ok(user)
    } else {
        Err(ApiError::Forbidden)
    }
}

#[must_use]
pub fn is_admin(user: &Identity, config: &AuthConfig) -> bool {
    config
        .admin_email()
        .is_some_and(|admin| admin == user.email.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::super::session::{MemorySessionStore, Session, SessionStore};
    use super::super::state::AuthState;
    use super::*;
    use crate::records::{CreateUserOutcome, UserRecord, UserStore};
    use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
    use std::{sync::Arc, time::Duration};

    struct NoUsers;

    impl UserStore for NoUsers {
        fn find_user(&self, _email: &str) -> anyhow::Result<Option<UserRecord>> {
            Ok(None)
        }

        fn create_user(&self, _user: &UserRecord) -> anyhow::Result<CreateUserOutcome> {
            Ok(CreateUserOutcome::Created)
        }
    }

    fn config() -> AuthConfig {
        AuthConfig::new("http://localhost:3000".to_string())
            .with_admin_email(Some("admin@zeek.shop".to_string()))
    }

    fn context_for(user: Option<&str>) -> anyhow::Result<SessionContext> {
        let sessions = Arc::new(MemorySessionStore::new());
        let state = AuthState::new(
            config(),
            sessions.clone(),
            Arc::new(super::super::rate_limit::NoopRateLimiter),
            Arc::new(NoUsers),
        );
        let token = "guard-test-token";
        let mut session = Session::new(Duration::from_secs(60));
        session.user = user.map(|email| Identity {
            email: email.to_string(),
        });
        sessions.insert(super::super::utils::hash_session_token(token), session)?;

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("zeek-session={token}"))?);
        Ok(super::super::session::load_session(&state, &headers))
    }

    #[test]
    fn anonymous_is_unauthenticated() {
        let session = SessionContext::anonymous();
        assert!(matches!(require_auth(&session), Err(ApiError::Unauthenticated)));
        assert!(matches!(
            require_admin(&session, &config()),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn logged_in_user_passes_auth_but_not_admin() -> anyhow::Result<()> {
        let session = context_for(Some("user@zeek.shop"))?;
        assert_eq!(require_auth(&session)?.email, "user@zeek.shop");
        assert!(matches!(
            require_admin(&session, &config()),
            Err(ApiError::Forbidden)
        ));
        Ok(())
    }

    #[test]
    fn admin_passes_both() -> anyhow::Result<()> {
        let session = context_for(Some("admin@zeek.shop"))?;
        assert!(require_auth(&session).is_ok());
        assert!(require_admin(&session, &config()).is_ok());
        Ok(())
    }

    #[test]
    fn no_configured_admin_means_nobody_is_admin() -> anyhow::Result<()> {
        let session = context_for(Some("admin@zeek.shop"))?;
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert!(matches!(
            require_admin(&session, &config),
            Err(ApiError::Forbidden)
        ));
        Ok(())
    }

    #[test]
    fn session_without_user_is_unauthenticated() -> anyhow::Result<()> {
        let session = context_for(None)?;
        assert!(session.key().is_some());
        assert!(matches!(require_auth(&session), Err(ApiError::Unauthenticated)));
        Ok(())
    }
}
