//! Ordered guard stages run in front of route handlers.
//!
//! A `Pipeline` is a sorted list of `Stage`s evaluated with early exit: the
//! first stage that denies renders its error and nothing after it runs. The
//! order is fixed by `Stage`'s `Ord`, so `RateLimit` always precedes `Csrf`,
//! which precedes the auth guards, regardless of how a pipeline was declared.

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::warn;

use super::{
    error::{ApiError, RejectedBeforeSideEffects, ResponseFormat},
    handlers::auth::{
        csrf::{self, CsrfOutcome, CSRF_HEADER},
        guards::{require_admin, require_auth},
        utils::extract_client_ip,
        AuthConfig, AuthState, RateLimitDecision, SessionContext,
    },
};

/// Largest body buffered to look for a `_csrf` field.
pub const MAX_CSRF_BODY_BYTES: usize = 64 * 1024;

const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    RateLimit,
    Csrf,
    RequireAuth,
    RequireAdmin,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: impl IntoIterator<Item = Stage>) -> Self {
        let mut stages: Vec<Stage> = stages.into_iter().collect();
        stages.sort_unstable();
        stages.dedup();
        Self { stages }
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

/// Middleware state: which stages to run and the auth state they consult.
#[derive(Clone)]
pub struct Guarded {
    pipeline: Arc<Pipeline>,
    auth: Arc<AuthState>,
}

impl Guarded {
    pub fn new(auth: Arc<AuthState>, stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            pipeline: Arc::new(Pipeline::new(stages)),
            auth,
        }
    }
}

/// Run the configured stages, then the handler.
///
/// Expects `resolve_session` to have run already for every stage but
/// `RateLimit`; a missing `SessionContext` is treated as anonymous.
pub async fn enforce(State(guarded): State<Guarded>, request: Request, next: Next) -> Response {
    let format = ResponseFormat::from_headers(request.headers());
    let session = request
        .extensions()
        .get::<SessionContext>()
        .cloned()
        .unwrap_or_default();

    let mut request = request;
    let mut rotated = None;
    for stage in guarded.pipeline.stages() {
        match stage {
            Stage::RateLimit => {
                if let Err(err) = admit(&guarded.auth, &request) {
                    return err.negotiate(format);
                }
            }
            Stage::Csrf => match check_csrf(&guarded.auth, &session, request).await {
                Ok((rebuilt, outcome)) => {
                    request = rebuilt;
                    if let CsrfOutcome::Rotated { previous, next } = outcome {
                        rotated = Some((previous, next));
                    }
                }
                Err(err) => return err.negotiate(format),
            },
            Stage::RequireAuth => {
                if let Err(err) = require_auth(&session) {
                    return err.negotiate(format);
                }
            }
            Stage::RequireAdmin => {
                if let Err(err) = require_admin(&session, guarded.auth.config()) {
                    return err.negotiate(format);
                }
            }
        }
    }

    let mut response = next.run(request).await;
    if let Some((previous, next)) = rotated {
        if response
            .extensions()
            .get::<RejectedBeforeSideEffects>()
            .is_some()
        {
            // Nothing happened, so the client's token stays valid.
            if let Some(key) = session.key() {
                if let Err(err) = csrf::restore(guarded.auth.sessions(), key, &previous, &next) {
                    warn!("Failed to restore CSRF token: {err}");
                }
            }
        } else if let Ok(value) = HeaderValue::from_str(&next) {
            response.headers_mut().insert(CSRF_HEADER, value);
        }
    }
    response
}

fn admit(auth: &AuthState, request: &Request) -> Result<(), ApiError> {
    let key = client_key(auth.config(), request);
    match auth.rate_limiter().check(&key) {
        RateLimitDecision::Allowed => Ok(()),
        RateLimitDecision::Limited { retry_after } => {
            warn!(client = %key, "Rate limit exceeded");
            let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            Err(ApiError::RateLimited {
                retry_after_seconds: seconds.max(1),
            })
        }
    }
}

/// Peer address, or the proxy-reported client when proxies are trusted.
fn client_key(config: &AuthConfig, request: &Request) -> String {
    if config.trust_proxy_headers() {
        if let Some(ip) = extract_client_ip(request.headers()) {
            return ip;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| UNKNOWN_CLIENT.to_string(), |info| info.0.ip().to_string())
}

/// Buffer the body to find `_csrf`, validate, and hand back an equivalent request.
async fn check_csrf(
    auth: &AuthState,
    session: &SessionContext,
    request: Request,
) -> Result<(Request, CsrfOutcome), ApiError> {
    if !csrf::requires_token(request.method()) {
        return Ok((request, CsrfOutcome::Exempt));
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_CSRF_BODY_BYTES)
        .await
        .map_err(|_| ApiError::validation("body", "Request body too large"))?;
    let supplied = csrf::supplied_token(&parts.headers, &bytes);

    let outcome = csrf::validate(auth.sessions(), session.key(), &parts.method, supplied.as_deref())
        .inspect_err(|_| {
            warn!(
                method = %parts.method,
                path = parts.uri.path(),
                authenticated = session.is_authenticated(),
                token_supplied = supplied.is_some(),
                "CSRF validation failed"
            );
        })?;

    Ok((Request::from_parts(parts, Body::from(bytes)), outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_orders_and_dedups_stages() {
        let pipeline = Pipeline::new([
            Stage::RequireAdmin,
            Stage::Csrf,
            Stage::RateLimit,
            Stage::Csrf,
            Stage::RequireAuth,
        ]);
        assert_eq!(
            pipeline.stages(),
            &[
                Stage::RateLimit,
                Stage::Csrf,
                Stage::RequireAuth,
                Stage::RequireAdmin
            ]
        );
    }

    #[test]
    fn empty_pipeline_is_allowed() {
        assert!(Pipeline::new(Vec::<Stage>::new()).stages().is_empty());
    }
}
