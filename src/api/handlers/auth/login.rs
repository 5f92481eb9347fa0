//! Password login against the user record file.

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
    guards::is_admin,
    session::{establish_user, SessionContext},
    state::AuthState,
    types::{Identity, LoginRequest, LoginResponse, Role},
    utils::{constant_time_eq, normalize_email, valid_email, valid_password, MIN_PASSWORD_LENGTH},
};
use crate::{
    api::{error::ApiError, handlers::Payload},
    records::offload,
};

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    params(
        ("x-csrf-token" = Option<String>, Header, description = "CSRF token, unless sent as `_csrf` in the body")
    ),
    responses(
        (status = 200, description = "Session authenticated", body = LoginResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Missing or invalid CSRF token"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(auth): Extension<Arc<AuthState>>,
    Extension(session): Extension<SessionContext>,
    Payload(request): Payload<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validation first: nothing below runs for malformed input.
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

    let lookup = email.clone();
    let record = offload(auth.users(), move |users| users.find_user(&lookup))
        .await
        .map_err(ApiError::Upstream)?;
    let Some(record) = record else {
        return Err(ApiError::InvalidCredentials);
    };
    if !constant_time_eq(
        record.password.expose_secret().as_bytes(),
        request.password.expose_secret().as_bytes(),
    ) {
        return Err(ApiError::InvalidCredentials);
    }

    let identity = Identity { email };
    let cookie = establish_user(&auth, &session, &identity)?;

    let (role, message) = if is_admin(&identity, auth.config()) {
        (Role::Admin, "Admin login successful")
    } else {
        (Role::User, "User login successful")
    };
    info!(role = ?role, "Login succeeded");

    let mut headers = HeaderMap::new();
    if let Some(cookie) = cookie {
        headers.insert(SET_COOKIE, cookie);
    }
    Ok((
        StatusCode::OK,
        headers,
        Json(LoginResponse {
            success: true,
            role,
            message: message.to_string(),
        }),
    ))
}
