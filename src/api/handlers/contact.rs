use axum::{extract::Extension, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::{
    auth::utils::{normalize_email, valid_email},
    required_text, MessageResponse, Payload, MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH,
};
use crate::api::{
    email::{ContactMessage, Mailer},
    error::ApiError,
};

const CONTACT_REPLY: &str = "Thank you for your message! We will get back to you soon.";

#[derive(ToSchema, Deserialize, Debug)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/api/contact",
    request_body = ContactRequest,
    params(
        ("x-csrf-token" = Option<String>, Header, description = "CSRF token, unless sent as `_csrf` in the body")
    ),
    responses(
        (status = 200, description = "Message accepted", body = MessageResponse),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Missing or invalid CSRF token"),
        (status = 500, description = "Mail delivery failed")
    ),
    tag = "shop"
)]
#[instrument(skip_all)]
pub async fn contact(
    Extension(mailer): Extension<Arc<dyn Mailer>>,
    Payload(request): Payload<ContactRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let name = required_text("name", &request.name, MAX_NAME_LENGTH)?;
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::validation("email", "Invalid email"));
    }
    let message = required_text("message", &request.message, MAX_MESSAGE_LENGTH)?;

    mailer
        .send_contact(&ContactMessage {
            name: name.to_string(),
            email,
            message: message.to_string(),
        })
        .map_err(ApiError::Upstream)?;

    Ok(Json(MessageResponse::new(CONTACT_REPLY)))
}
