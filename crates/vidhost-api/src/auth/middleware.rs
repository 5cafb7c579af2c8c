use crate::auth::AuthenticatedUser;
use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use vidhost_core::constants::ACCESS_TOKEN_COOKIE;
use vidhost_core::AppError;

/// The access token from the `access_token` cookie, falling back to a bearer token.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string());
    if from_cookie.is_some() {
        return from_cookie;
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.config.auth_disabled() {
        request
            .extensions_mut()
            .insert(AuthenticatedUser::anonymous());
        return next.run(request).await;
    }

    let Some(token) = extract_token(request.headers()) else {
        return HttpAppError(AppError::Unauthorized("Missing access token".to_string()))
            .into_response();
    };

    match state.auth.verify(&token).await {
        Ok(user) => {
            tracing::debug!(user_id = %user.id, "Request authenticated");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => HttpAppError(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn token_from_cookie() {
        let map = headers(&[(header::COOKIE, "theme=dark; access_token=abc.def; lang=en")]);
        assert_eq!(extract_token(&map).as_deref(), Some("abc.def"));
    }

    #[test]
    fn cookie_wins_over_bearer() {
        let map = headers(&[
            (header::COOKIE, "access_token=from-cookie"),
            (header::AUTHORIZATION, "Bearer from-header"),
        ]);
        assert_eq!(extract_token(&map).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn token_from_bearer_header() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer xyz")]);
        assert_eq!(extract_token(&map).as_deref(), Some("xyz"));
    }

    #[test]
    fn missing_or_empty_token() {
        assert_eq!(extract_token(&HeaderMap::new()), None);
        let map = headers(&[
            (header::COOKIE, "access_token="),
            (header::AUTHORIZATION, "Basic dXNlcjpwYXNz"),
        ]);
        assert_eq!(extract_token(&map), None);
    }
}
