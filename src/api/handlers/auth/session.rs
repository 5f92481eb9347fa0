//! Session store, cookie handling and session endpoints.
//!
//! Flow Overview:
//! 1) `resolve_session` runs on every request, turning the session cookie into
//!    a `SessionContext` request extension (anonymous when absent, unknown,
//!    expired, or when the store fails).
//! 2) Handlers that need a session (`/api/csrf-token`, login, signup) call
//!    `start_session`, which creates one and returns the `Set-Cookie` value.
//! 3) Expiry is a fixed TTL from creation, checked on access. The memory
//!    store also sweeps expired sessions once it grows past a threshold.

use axum::{
    extract::{Request, State},
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::{debug, error, warn};

use super::{
    state::{AuthConfig, AuthState},
    types::{Identity, MeResponse},
    utils::{generate_token, hash_session_token},
};
use crate::api::{error::ApiError, handlers::MessageResponse};

/// SHA-256 of the cookie credential.
pub type SessionKey = Vec<u8>;

/// Longest lifetime a session can get, whatever the configured TTL.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Expired sessions are swept once the memory store holds this many.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Clone, Debug)]
pub struct Session {
    pub user: Option<Identity>,
    pub csrf_token: Option<String>,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl Session {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::created_at(Instant::now(), ttl)
    }

    /// TTLs above `MAX_SESSION_TTL` are capped.
    #[must_use]
    pub fn created_at(created_at: Instant, ttl: Duration) -> Self {
        let expires_at = created_at
            .checked_add(ttl.min(MAX_SESSION_TTL))
            .unwrap_or(created_at);
        Self {
            user: None,
            csrf_token: None,
            created_at,
            expires_at,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Upstream(anyhow::Error::new(err))
    }
}

/// Session persistence. Implementations must apply `update` atomically per
/// key; the CSRF guard relies on it for validate-and-rotate.
pub trait SessionStore: Send + Sync {
    /// Fetch an unexpired session.
    ///
    /// # Errors
    /// Returns `StoreError` when the backing store is unreachable.
    fn get(&self, key: &[u8]) -> Result<Option<Session>, StoreError>;

    /// Store a freshly created session.
    ///
    /// # Errors
    /// Returns `StoreError` when the backing store is unreachable.
    fn insert(&self, key: SessionKey, session: Session) -> Result<(), StoreError>;

    /// Mutate an unexpired session in place. Returns `false` when the session
    /// does not exist (or just expired).
    ///
    /// # Errors
    /// Returns `StoreError` when the backing store is unreachable.
    fn update(&self, key: &[u8], apply: &mut dyn FnMut(&mut Session)) -> Result<bool, StoreError>;

    /// Destroy a session. Missing sessions are not an error.
    ///
    /// # Errors
    /// Returns `StoreError` when the backing store is unreachable.
    fn remove(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Confirm the session is still alive. TTLs are fixed, so nothing is extended.
    ///
    /// # Errors
    /// Returns `StoreError` when the backing store is unreachable.
    fn touch(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionKey, Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<SessionKey, Session>>, StoreError> {
        self.sessions
            .lock()
            .map_err(|_| StoreError::Unavailable("session map lock poisoned".to_string()))
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &[u8]) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.lock()?;
        match sessions.get(key) {
            Some(session) if session.is_expired_at(Instant::now()) => {
                sessions.remove(key);
                Ok(None)
            }
            Some(session) => Ok(Some(session.clone())),
            None => Ok(None),
        }
    }

    fn insert(&self, key: SessionKey, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.lock()?;
        if sessions.len() >= PRUNE_THRESHOLD {
            let now = Instant::now();
            let before = sessions.len();
            sessions.retain(|_, session| !session.is_expired_at(now));
            debug!(pruned = before - sessions.len(), "Swept expired sessions");
        }
        sessions.insert(key, session);
        Ok(())
    }

    fn update(&self, key: &[u8], apply: &mut dyn FnMut(&mut Session)) -> Result<bool, StoreError> {
        let mut sessions = self.lock()?;
        let expired = match sessions.get_mut(key) {
            Some(session) if !session.is_expired_at(Instant::now()) => {
                apply(session);
                return Ok(true);
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            sessions.remove(key);
        }
        Ok(false)
    }

    fn remove(&self, key: &[u8]) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// The caller's session as resolved for this request.
#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    key: Option<SessionKey>,
    session: Option<Session>,
}

impl SessionContext {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    #[must_use]
    pub fn user(&self) -> Option<&Identity> {
        self.session.as_ref().and_then(|session| session.user.as_ref())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }
}

/// Resolve the session cookie into a `SessionContext` extension.
pub async fn resolve_session(
    State(auth): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = load_session(&auth, request.headers());
    request.extensions_mut().insert(context);
    next.run(request).await
}

/// Never fails: unknown credentials and store outages both yield anonymous.
pub(crate) fn load_session(auth: &AuthState, headers: &HeaderMap) -> SessionContext {
    let Some(token) = extract_session_token(headers, auth.config().session_cookie_name()) else {
        return SessionContext::anonymous();
    };
    // Only the hash is stored; never look up raw tokens.
    let key = hash_session_token(&token);
    match auth.sessions().get(&key) {
        Ok(Some(session)) => SessionContext {
            key: Some(key),
            session: Some(session),
        },
        Ok(None) => {
            debug!("Unknown or expired session cookie");
            SessionContext::anonymous()
        }
        Err(err) => {
            warn!("Continuing anonymously: {err}");
            SessionContext::anonymous()
        }
    }
}

/// Reuse the caller's live session or create a new one.
///
/// Returns the `Set-Cookie` value when a session was created.
pub(crate) fn start_session(
    auth: &AuthState,
    context: &SessionContext,
) -> Result<(SessionKey, Option<HeaderValue>), ApiError> {
    if let Some(key) = context.key() {
        if auth.sessions().touch(key)? {
            return Ok((key.to_vec(), None));
        }
    }
    create_session(auth)
}

fn create_session(auth: &AuthState) -> Result<(SessionKey, Option<HeaderValue>), ApiError> {
    let token = generate_token().map_err(ApiError::Upstream)?;
    let key = hash_session_token(&token);
    auth.sessions()
        .insert(key.clone(), Session::new(auth.config().session_ttl()))?;
    let cookie = session_cookie(auth.config(), &token)
        .map_err(|err| ApiError::Upstream(anyhow::Error::new(err)))?;
    debug!("Session created");
    Ok((key, Some(cookie)))
}

/// Mark the caller's session as authenticated as `identity`.
pub(crate) fn establish_user(
    auth: &AuthState,
    context: &SessionContext,
    identity: &Identity,
) -> Result<Option<HeaderValue>, ApiError> {
    let (key, cookie) = start_session(auth, context)?;
    if auth
        .sessions()
        .update(&key, &mut |session| session.user = Some(identity.clone()))?
    {
        return Ok(cookie);
    }

    // Expired between resolution and now; start over with a fresh session.
    let (key, cookie) = create_session(auth)?;
    if auth
        .sessions()
        .update(&key, &mut |session| session.user = Some(identity.clone()))?
    {
        Ok(cookie)
    } else {
        Err(ApiError::Upstream(anyhow::anyhow!(
            "session vanished right after creation"
        )))
    }
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Session is authenticated", body = MeResponse),
        (status = 401, description = "No authenticated session", body = MeResponse)
    ),
    tag = "auth"
)]
pub async fn me(Extension(session): Extension<SessionContext>) -> impl IntoResponse {
    match session.user() {
        Some(user) => (
            StatusCode::OK,
            Json(MeResponse {
                authenticated: true,
                user: Some(user.clone()),
            }),
        ),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(MeResponse {
                authenticated: false,
                user: None,
            }),
        ),
    }
}

#[utoipa::path(
    post,
    path = "/api/logout",
    responses(
        (status = 200, description = "Session destroyed and cookie cleared", body = MessageResponse),
        (status = 403, description = "Missing or invalid CSRF token", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(auth): Extension<Arc<AuthState>>,
    Extension(session): Extension<SessionContext>,
) -> impl IntoResponse {
    if let Some(key) = session.key() {
        if let Err(err) = auth.sessions().remove(key) {
            error!("Failed to destroy session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth.config()) {
        headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        headers,
        Json(MessageResponse::new("You have been logged out.")),
    )
}

/// Build an `HttpOnly` cookie for the session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.session_cookie_name();
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie =
        format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.session_cookie_name();
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == cookie_name && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn memory_store_round_trip() -> Result<()> {
        let store = MemorySessionStore::new();
        store.insert(vec![1], Session::new(Duration::from_secs(60)))?;

        assert!(store.get(&[1])?.is_some());
        assert!(store.update(&[1], &mut |session| {
            session.user = Some(Identity {
                email: "a@example.com".to_string(),
            });
        })?);
        let session = store.get(&[1])?;
        assert_eq!(
            session.and_then(|s| s.user).map(|user| user.email),
            Some("a@example.com".to_string())
        );

        store.remove(&[1])?;
        assert!(store.get(&[1])?.is_none());
        Ok(())
    }

    #[test]
    fn expired_sessions_are_dropped_on_access() -> Result<()> {
        let store = MemorySessionStore::new();
        store.insert(vec![2], Session::new(Duration::ZERO))?;

        assert!(!store.touch(&[2])?);
        assert!(!store.update(&[2], &mut |_| {})?);
        assert!(store.lock()?.is_empty());
        Ok(())
    }

    #[test]
    fn oversized_ttl_is_capped() {
        let now = Instant::now();
        let session = Session::created_at(now, Duration::from_secs(u64::MAX));
        assert!(!session.is_expired_at(now));
        assert_eq!(session.expires_at.duration_since(now), MAX_SESSION_TTL);

        let session = Session::created_at(now, Duration::from_secs(60));
        assert_eq!(session.expires_at.duration_since(now), Duration::from_secs(60));
    }

    #[test]
    fn insert_sweeps_expired_sessions_past_threshold() -> Result<()> {
        let store = MemorySessionStore::new();
        {
            let mut sessions = store.lock()?;
            for index in 0..PRUNE_THRESHOLD {
                let key = u32::try_from(index)?.to_be_bytes().to_vec();
                sessions.insert(key, Session::new(Duration::ZERO));
            }
            sessions.insert(b"live".to_vec(), Session::new(Duration::from_secs(60)));
        }

        store.insert(b"fresh".to_vec(), Session::new(Duration::from_secs(60)))?;

        let sessions = store.lock()?;
        assert_eq!(sessions.len(), 2);
        assert!(sessions.contains_key(b"live".as_slice()));
        assert!(sessions.contains_key(b"fresh".as_slice()));
        Ok(())
    }

    #[test]
    fn update_on_missing_session_is_false() -> Result<()> {
        let store = MemorySessionStore::new();
        let mut called = false;
        assert!(!store.update(&[3], &mut |_| called = true)?);
        assert!(!called);
        Ok(())
    }

    #[test]
    fn extract_session_token_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; zeek-session=abc123; other=1"),
        );
        assert_eq!(
            extract_session_token(&headers, "zeek-session"),
            Some("abc123".to_string())
        );
        assert_eq!(extract_session_token(&headers, "missing"), None);
    }

    #[test]
    fn extract_session_token_ignores_empty_value() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("zeek-session="));
        assert_eq!(extract_session_token(&headers, "zeek-session"), None);
    }

    #[test]
    fn session_cookie_attributes() -> Result<()> {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        let cookie = session_cookie(&config, "tok")?;
        let cookie = cookie.to_str()?;
        assert!(cookie.starts_with("zeek-session=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=86400"));
        assert!(!cookie.contains("Secure"));

        let config = AuthConfig::new("https://zeek.shop".to_string());
        assert!(session_cookie(&config, "tok")?.to_str()?.ends_with("; Secure"));
        Ok(())
    }

    #[test]
    fn clear_cookie_expires_immediately() -> Result<()> {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        let cookie = clear_session_cookie(&config)?;
        assert!(cookie.to_str()?.contains("Max-Age=0"));
        Ok(())
    }
}
