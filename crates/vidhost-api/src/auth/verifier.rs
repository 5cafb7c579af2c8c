use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use vidhost_core::AppError;

use crate::error::HttpAppError;

/// The caller behind a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub username: Option<String>,
}

impl AuthenticatedUser {
    /// Stand-in identity used when authentication is disabled for local development.
    pub fn anonymous() -> Self {
        Self {
            id: "anonymous".to_string(),
            username: None,
        }
    }
}

// Set by `auth_middleware`; Multipart handlers cannot use `Extension`, so the user is
// read straight from the request extensions.
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| HttpAppError(AppError::Unauthorized("Missing access token".to_string())))
    }
}

#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Resolve `token` to a user. Rejected tokens are `Unauthorized`; an unreachable
    /// auth service is `UpstreamUnavailable`.
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AppError>;
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    user: Option<AuthResponseUser>,
}

#[derive(Debug, Deserialize)]
struct AuthResponseUser {
    id: Value,
    #[serde(default)]
    username: Option<String>,
}

fn user_id(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Checks tokens against the auth service's `POST {"token": ...}` endpoint.
pub struct HttpAuthVerifier {
    client: reqwest::Client,
    url: String,
}

impl HttpAuthVerifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build auth client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AuthVerifier for HttpAuthVerifier {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, url = %self.url, "Auth service request failed");
                AppError::UpstreamUnavailable(format!("Auth service unreachable: {}", e))
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!(status = status.as_u16(), "Access token rejected");
            return Err(AppError::Unauthorized("Access token rejected".to_string()));
        }

        let body: AuthResponse = response.json().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Malformed auth service response: {}", e))
        })?;
        let user = body
            .user
            .ok_or_else(|| AppError::Unauthorized("Access token rejected".to_string()))?;
        let id = user_id(&user.id).ok_or_else(|| {
            AppError::UpstreamUnavailable("Auth service returned a user without an id".to_string())
        })?;
        Ok(AuthenticatedUser {
            id,
            username: user.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_id_accepts_numbers_and_strings() {
        assert_eq!(user_id(&json!(42)).as_deref(), Some("42"));
        assert_eq!(user_id(&json!("u-7")).as_deref(), Some("u-7"));
        assert_eq!(user_id(&json!("")), None);
        assert_eq!(user_id(&json!(null)), None);
    }

    #[test]
    fn parses_auth_service_payload() {
        let body: AuthResponse = serde_json::from_value(json!({
            "user": {
                "id": 7,
                "username": "alice",
                "email": "alice@example.com",
                "created_at": "2024-01-01T00:00:00",
                "avatar_path": null
            }
        }))
        .unwrap();
        let user = body.user.unwrap();
        assert_eq!(user_id(&user.id).as_deref(), Some("7"));
        assert_eq!(user.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn unreachable_service_is_upstream_unavailable() {
        // Port 9 (discard) is closed on test hosts; the connect fails fast.
        let verifier =
            HttpAuthVerifier::new("http://127.0.0.1:9/auth/token", Duration::from_secs(1)).unwrap();
        let err = verifier.verify("token").await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)), "{:?}", err);
    }
}
