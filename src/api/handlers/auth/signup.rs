//! Account creation. A successful signup also logs the new user in.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    session::{establish_user, SessionContext},
    state::AuthState,
    types::{Identity, SignupRequest},
    utils::{normalize_email, valid_email, valid_password, MIN_PASSWORD_LENGTH},
};
use crate::{
    api::{
        error::ApiError,
        handlers::{required_text, MessageResponse, Payload, MAX_NAME_LENGTH},
    },
    records::{offload, CreateUserOutcome, UserRecord},
};

const SIGNUP_MESSAGE: &str = "Signup successful! Use code ZEEK10 for 10% off your next purchase.";

#[utoipa::path(
    post,
    path = "/api/signup",
    request_body = SignupRequest,
    params(
        ("x-csrf-token" = Option<String>, Header, description = "CSRF token, unless sent as `_csrf` in the body")
    ),
    responses(
        (status = 201, description = "Account created and session authenticated", body = MessageResponse),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Missing or invalid CSRF token"),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn signup(
    Extension(auth): Extension<Arc<AuthState>>,
    Extension(session): Extension<SessionContext>,
    Payload(request): Payload<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = required_text("username", &request.username, MAX_NAME_LENGTH)?;
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::validation("email", "Invalid email"));
    }
    if !valid_password(request.password.expose_secret()) {
        return Err(ApiError::validation(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
        ));
    }

    let record = UserRecord {
        username: username.to_string(),
        email: email.clone(),
        password: request.password,
    };
    let outcome = offload(auth.users(), move |users| users.create_user(&record))
        .await
        .map_err(ApiError::Upstream)?;
    match outcome {
        CreateUserOutcome::Created => {}
        CreateUserOutcome::AlreadyExists => {
            return Err(ApiError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }
    }
    info!("User registered");

    let cookie = establish_user(&auth, &session, &Identity { email })?;

    let mut headers = HeaderMap::new();
    if let Some(cookie) = cookie {
        headers.insert(SET_COOKIE, cookie);
    }
    Ok((
        StatusCode::CREATED,
        headers,
        Json(MessageResponse::new(SIGNUP_MESSAGE)),
    ))
}
