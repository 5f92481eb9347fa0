use axum::{extract::Extension, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use super::{
    auth::utils::{normalize_email, valid_email},
    MessageResponse, Payload,
};
use crate::{
    api::error::ApiError,
    records::{offload, SubscribeOutcome, SubscriberStore},
};

#[derive(ToSchema, Deserialize, Debug)]
pub struct NewsletterRequest {
    pub email: String,
}

#[utoipa::path(
    post,
    path = "/api/newsletter",
    request_body = NewsletterRequest,
    params(
        ("x-csrf-token" = Option<String>, Header, description = "CSRF token, unless sent as `_csrf` in the body")
    ),
    responses(
        (status = 200, description = "Subscribed (repeat subscriptions are accepted)", body = MessageResponse),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Missing or invalid CSRF token")
    ),
    tag = "shop"
)]
#[instrument(skip_all)]
pub async fn newsletter(
    Extension(subscribers): Extension<Arc<dyn SubscriberStore>>,
    Payload(request): Payload<NewsletterRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::validation("email", "Invalid email"));
    }

    let outcome = offload(subscribers, move |subscribers| subscribers.add_subscriber(&email))
        .await
        .map_err(ApiError::Upstream)?;
    match outcome {
        SubscribeOutcome::Subscribed => debug!("New newsletter subscriber"),
        SubscribeOutcome::AlreadySubscribed => debug!("Repeat newsletter subscription"),
    }

    Ok(Json(MessageResponse::new(
        "Thank you for subscribing to our newsletter!",
    )))
}
