//! Error taxonomy and content-negotiated error rendering.
//!
//! API callers get `{ "message": string }` (validation errors add `"field"`),
//! browser callers get a small HTML page, or a redirect to `/login` when the
//! request is unauthenticated. Upstream failures are logged with their cause
//! but always rendered as the generic server error.

use axum::{
    http::{
        header::{ACCEPT, RETRY_AFTER},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;
use std::any::Any;
use tracing::error;

pub const LOGIN_PATH: &str = "/login";

const GENERIC_SERVER_ERROR: &str = "Internal server error";

/// Response extension set when a request was refused before any side effect
/// (bad input, bad credentials). The CSRF stage uses it to undo its rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RejectedBeforeSideEffects;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("{0}")]
    Conflict(String),
    #[error("Invalid CSRF token")]
    CsrfInvalid,
    #[error("Too many requests, please try again later.")]
    RateLimited { retry_after_seconds: u64 },
    #[error("Authentication required")]
    Unauthenticated,
    #[error("You do not have permission to access this resource")]
    Forbidden,
    #[error("Not found")]
    NotFound,
    #[error("upstream failure: {0:#}")]
    Upstream(anyhow::Error),
}

impl ApiError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::CsrfInvalid | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code, used in logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Conflict(_) => "CONFLICT",
            Self::CsrfInvalid => "CSRF_INVALID",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Upstream(_) => "UPSTREAM_FAILURE",
        }
    }

    /// Message safe to show to the client.
    fn public_message(&self) -> String {
        match self {
            Self::Upstream(_) => GENERIC_SERVER_ERROR.to_string(),
            other => other.to_string(),
        }
    }

    /// Render for the caller's declared response format.
    #[must_use]
    pub fn negotiate(self, format: ResponseFormat) -> Response {
        match format {
            ResponseFormat::Json => self.into_response(),
            ResponseFormat::Html => self.into_html_response(),
        }
    }

    /// Whether the handler refused the request before touching any state.
    #[must_use]
    pub fn before_side_effects(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::InvalidCredentials)
    }

    fn log_upstream(&self) {
        if let Self::Upstream(cause) = self {
            error!(code = self.code(), "{cause:#}");
        }
    }

    fn into_html_response(self) -> Response {
        self.log_upstream();
        if matches!(self, Self::Unauthenticated) {
            return Redirect::to(LOGIN_PATH).into_response();
        }
        let status = self.status();
        let page = html_page(status, &self.public_message());
        let mut response = (status, Html(page)).into_response();
        self.decorate(&mut response);
        response
    }

    fn decorate(&self, response: &mut Response) {
        if self.before_side_effects() {
            response.extensions_mut().insert(RejectedBeforeSideEffects);
        }
        let headers = response.headers_mut();
        if let Self::RateLimited {
            retry_after_seconds,
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                headers.insert(RETRY_AFTER, value);
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log_upstream();
        let status = self.status();
        let body = match &self {
            Self::Validation { field, message } => json!({ "message": message, "field": field }),
            other => json!({ "message": other.public_message() }),
        };
        let mut response = (status, Json(body)).into_response();
        self.decorate(&mut response);
        response
    }
}

/// Response shape the caller asked for through `Accept`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Html,
}

impl ResponseFormat {
    /// The first of `text/html` or `application/json` listed in `Accept`
    /// wins. Missing or wildcard-only `Accept` headers mean JSON.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(accept) = headers.get(ACCEPT).and_then(|value| value.to_str().ok()) else {
            return Self::Json;
        };

        for range in accept.split(',') {
            let media = range
                .split(';')
                .next()
                .map(str::trim)
                .unwrap_or_default()
                .to_ascii_lowercase();
            match media.as_str() {
                "text/html" | "application/xhtml+xml" => return Self::Html,
                "application/json" => return Self::Json,
                _ => {}
            }
        }

        Self::Json
    }
}

/// Fallback for unmatched routes.
pub async fn not_found(headers: HeaderMap) -> Response {
    ApiError::NotFound.negotiate(ResponseFormat::from_headers(&headers))
}

/// Render a caught panic as the generic server error; the payload is logged only.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    ApiError::Upstream(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

fn html_page(status: StatusCode, message: &str) -> String {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("Error");
    let message = escape_html(message);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{code} {reason} | Zeek</title></head>\n<body>\n<h1>{code} {reason}</h1>\n<p>{message}</p>\n<p><a href=\"/\">Back to the shop</a></p>\n</body>\n</html>\n"
    )
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::{body::to_bytes, http::header::LOCATION};

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn format_defaults_to_json() {
        assert_eq!(
            ResponseFormat::from_headers(&HeaderMap::new()),
            ResponseFormat::Json
        );
        assert_eq!(
            ResponseFormat::from_headers(&accept("*/*")),
            ResponseFormat::Json
        );
    }

    #[test]
    fn format_detects_browser_accept() {
        let browser = accept("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8");
        assert_eq!(ResponseFormat::from_headers(&browser), ResponseFormat::Html);
    }

    #[test]
    fn format_prefers_first_listed() {
        assert_eq!(
            ResponseFormat::from_headers(&accept("application/json, text/html")),
            ResponseFormat::Json
        );
    }

    #[tokio::test]
    async fn json_error_shape() -> Result<()> {
        let response = ApiError::CsrfInvalid.negotiate(ResponseFormat::Json);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let value: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(value["message"], "Invalid CSRF token");
        Ok(())
    }

    #[tokio::test]
    async fn validation_error_includes_field() -> Result<()> {
        let response = ApiError::validation("email", "Invalid email").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let value: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(value["field"], "email");
        assert_eq!(value["message"], "Invalid email");
        Ok(())
    }

    #[tokio::test]
    async fn upstream_error_hides_cause() -> Result<()> {
        let response =
            ApiError::Upstream(anyhow::anyhow!("disk full at /var/data")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let text = String::from_utf8(body.to_vec())?;
        assert!(!text.contains("disk full"));
        assert!(text.contains(GENERIC_SERVER_ERROR));
        Ok(())
    }

    #[test]
    fn unauthenticated_browser_is_redirected() {
        let response = ApiError::Unauthenticated.negotiate(ResponseFormat::Html);
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
            Some(LOGIN_PATH)
        );
    }

    #[test]
    fn forbidden_browser_gets_page_not_redirect() {
        let response = ApiError::Forbidden.negotiate(ResponseFormat::Html);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(LOCATION).is_none());
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited {
            retry_after_seconds: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("42")
        );
    }

    #[test]
    fn input_errors_are_marked_side_effect_free() {
        let response = ApiError::validation("email", "Invalid email").negotiate(ResponseFormat::Html);
        assert!(response.extensions().get::<RejectedBeforeSideEffects>().is_some());

        let response = ApiError::InvalidCredentials.into_response();
        assert!(response.extensions().get::<RejectedBeforeSideEffects>().is_some());

        let response = ApiError::Conflict("taken".to_string()).into_response();
        assert!(response.extensions().get::<RejectedBeforeSideEffects>().is_none());
    }

    #[test]
    fn escape_html_escapes_markup() {
        assert_eq!(escape_html("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }
}
