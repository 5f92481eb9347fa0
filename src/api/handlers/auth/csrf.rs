//! Per-session anti-forgery tokens.
//!
//! A session holds at most one token. State-changing requests must present it
//! (body field `_csrf` first, then the `x-csrf-token` header); a match rotates
//! the token before the handler runs, a mismatch leaves it untouched. When the
//! handler then refuses the request for bad input, the rotation is undone.

use axum::{
    http::{header::SET_COOKIE, HeaderMap, HeaderName, Method, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{
    session::{start_session, SessionContext, SessionStore, StoreError},
    state::AuthState,
    types::CsrfTokenResponse,
    utils::{constant_time_eq, generate_token},
};
use crate::api::{
    error::ApiError,
    handlers::{is_form_body, is_json_body},
};

pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");
pub const CSRF_FIELD: &str = "_csrf";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CsrfOutcome {
    /// Safe method; nothing was checked and nothing rotated.
    Exempt,
    /// Token matched and was replaced by `next`.
    Rotated { previous: String, next: String },
}

/// Everything except the safe methods must carry a token.
#[must_use]
pub fn requires_token(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Return the session's token, creating it on first use.
///
/// `Ok(None)` means the session no longer exists.
///
/// # Errors
/// Returns `ApiError::Upstream` when the store fails or no randomness is available.
pub fn ensure_token(store: &dyn SessionStore, key: &[u8]) -> Result<Option<String>, ApiError> {
    let fresh = generate_token().map_err(ApiError::Upstream)?;
    let mut current = None;
    let found = store.update(key, &mut |session| {
        let token = session.csrf_token.get_or_insert_with(|| fresh.clone());
        current = Some(token.clone());
    })?;
    Ok(if found { current } else { None })
}

/// Check `supplied` against the session token and rotate on success.
///
/// Match and rotation happen inside one store update, so of two requests
/// racing with the same token exactly one is accepted.
///
/// # Errors
/// Returns `ApiError::CsrfInvalid` for a missing session, missing token or
/// mismatch. Store failures also fail closed as `CsrfInvalid`.
pub fn validate(
    store: &dyn SessionStore,
    key: Option<&[u8]>,
    method: &Method,
    supplied: Option<&str>,
) -> Result<CsrfOutcome, ApiError> {
    if !requires_token(method) {
        return Ok(CsrfOutcome::Exempt);
    }
    let (Some(key), Some(supplied)) = (key, supplied) else {
        return Err(ApiError::CsrfInvalid);
    };

    let next = generate_token().map_err(ApiError::Upstream)?;
    let mut rotated = false;
    let result = store.update(key, &mut |session| {
        let matches = session
            .csrf_token
            .as_deref()
            .is_some_and(|expected| constant_time_eq(expected.as_bytes(), supplied.as_bytes()));
        if matches {
            session.csrf_token = Some(next.clone());
            rotated = true;
        }
    });

    match result {
        Ok(true) if rotated => Ok(CsrfOutcome::Rotated {
            previous: supplied.to_string(),
            next,
        }),
        Ok(_) => Err(ApiError::CsrfInvalid),
        Err(StoreError::Unavailable(reason)) => {
            debug!("CSRF check failed closed: {reason}");
            Err(ApiError::CsrfInvalid)
        }
    }
}

/// Undo a rotation, but only if `next` is still the session's token.
///
/// Used when the handler refused the request before any side effect, so the
/// token the client holds stays valid. Returns whether anything was restored.
///
/// # Errors
/// Returns `StoreError` when the backing store is unreachable.
pub fn restore(
    store: &dyn SessionStore,
    key: &[u8],
    previous: &str,
    next: &str,
) -> Result<bool, StoreError> {
    let mut restored = false;
    store.update(key, &mut |session| {
        if session.csrf_token.as_deref() == Some(next) {
            session.csrf_token = Some(previous.to_string());
            restored = true;
        }
    })?;
    Ok(restored)
}

/// Token from the request body, if the body is JSON or a urlencoded form.
#[must_use]
pub fn body_token(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let token = if is_json_body(headers) {
        serde_json::from_slice::<Value>(body).ok().and_then(|value| {
            value
                .get(CSRF_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    } else if is_form_body(headers) {
        url::form_urlencoded::parse(body)
            .find(|(name, _)| name == CSRF_FIELD)
            .map(|(_, value)| value.into_owned())
    } else {
        None
    };
    token.filter(|token| !token.is_empty())
}

#[must_use]
pub fn header_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Body field wins over the header when both are present.
#[must_use]
pub fn supplied_token(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    body_token(headers, body).or_else(|| header_token(headers))
}

#[utoipa::path(
    get,
    path = "/api/csrf-token",
    responses(
        (status = 200, description = "Current CSRF token for the caller's session", body = CsrfTokenResponse)
    ),
    tag = "auth"
)]
pub async fn csrf_token(
    Extension(auth): Extension<Arc<AuthState>>,
    Extension(session): Extension<SessionContext>,
) -> Result<impl IntoResponse, ApiError> {
    let (key, mut cookie) = start_session(&auth, &session)?;
    let token = match ensure_token(auth.sessions(), &key)? {
        Some(token) => token,
        None => {
            // Expired between lookup and update; issue a fresh session.
            let (key, fresh_cookie) = start_session(&auth, &SessionContext::anonymous())?;
            cookie = fresh_cookie;
            ensure_token(auth.sessions(), &key)?.ok_or_else(|| {
                ApiError::Upstream(anyhow::anyhow!("session vanished right after creation"))
            })?
        }
    };

    let mut headers = HeaderMap::new();
    if let Some(cookie) = cookie {
        headers.insert(SET_COOKIE, cookie);
    }
    Ok((
        StatusCode::OK,
        headers,
        Json(CsrfTokenResponse { csrf_token: token }),
    ))
}
