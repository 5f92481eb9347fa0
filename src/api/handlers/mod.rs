//! Route handlers and the validation helpers they share.

pub mod auth;
pub mod contact;
pub mod dashboard;
pub mod health;
pub mod newsletter;
pub mod products;

use axum::{
    extract::{FromRequest, Request},
    http::{header::CONTENT_TYPE, HeaderMap},
    Form, Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::ApiError;

pub(crate) const MAX_NAME_LENGTH: usize = 100;
pub(crate) const MAX_MESSAGE_LENGTH: usize = 5000;

/// `{ "message": string }`, the body of every plain acknowledgement.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

fn media_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub(crate) fn is_json_body(headers: &HeaderMap) -> bool {
    media_type(headers).starts_with("application/json")
}

pub(crate) fn is_form_body(headers: &HeaderMap) -> bool {
    media_type(headers).starts_with("application/x-www-form-urlencoded")
}

/// Form body, sent either as JSON or as a urlencoded HTML form.
///
/// Rejections become `ApiError::Validation` on `body`, so a malformed body
/// counts as bad input rather than a server fault.
#[derive(Debug)]
pub struct Payload<T>(pub T);

impl<T, S> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form_body(request.headers()) {
            let Form(payload) = Form::<T>::from_request(request, state)
                .await
                .map_err(|rejection| ApiError::validation("body", rejection.body_text()))?;
            Ok(Self(payload))
        } else {
            let Json(payload) = Json::<T>::from_request(request, state)
                .await
                .map_err(|rejection| ApiError::validation("body", rejection.body_text()))?;
            Ok(Self(payload))
        }
    }
}

/// Trimmed, non-empty text of at most `max` characters.
pub(crate) fn required_text<'a>(
    field: &'static str,
    value: &'a str,
    max: usize,
) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(field, format!("{field} is required")));
    }
    if trimmed.chars().count() > max {
        return Err(ApiError::validation(
            field,
            format!("{field} must be at most {max} characters"),
        ));
    }
    Ok(trimmed)
}
