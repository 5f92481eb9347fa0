//! Request/response types for auth endpoints.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identity held by an authenticated session. No credential is kept.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub success: bool,
    pub role: Role,
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MeResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use secrecy::ExposeSecret;

    #[test]
    fn csrf_token_response_uses_camel_case() -> Result<()> {
        let value = serde_json::to_value(CsrfTokenResponse {
            csrf_token: "abc".to_string(),
        })?;
        assert_eq!(value["csrfToken"], "abc");
        Ok(())
    }

    #[test]
    fn login_request_ignores_csrf_field() -> Result<()> {
        let request: LoginRequest = serde_json::from_str(
            r#"{"email":"a@example.com","password":"secret-pass","_csrf":"token"}"#,
        )?;
        assert_eq!(request.email, "a@example.com");
        assert_eq!(request.password.expose_secret(), "secret-pass");
        assert!(!format!("{request:?}").contains("secret-pass"));
        Ok(())
    }

    #[test]
    fn anonymous_me_response_omits_user() -> Result<()> {
        let value = serde_json::to_value(MeResponse {
            authenticated: false,
            user: None,
        })?;
        assert_eq!(value, serde_json::json!({ "authenticated": false }));
        Ok(())
    }

    #[test]
    fn role_serializes_lowercase() -> Result<()> {
        assert_eq!(serde_json::to_value(Role::Admin)?, "admin");
        Ok(())
    }
}
