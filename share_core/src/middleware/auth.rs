use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

impl AuthUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Attaches an `AuthUser` when a valid Bearer token is present. Requests
/// without one, or with an invalid one, continue anonymously.
pub async fn optional_jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let jwt_service = match state.jwt_service.as_ref() {
        Some(service) => service,
        None => return Ok(next.run(request).await),
    };

    if let Ok(token) = extract_token_from_header(request.headers()) {
        match jwt_service.validate_token(&token) {
            Ok(claims) => {
                request.extensions_mut().insert(AuthUser::new(claims.sub));
            }
            Err(e) => debug!("Ignoring invalid bearer token: {}", e),
        }
    }

    Ok(next.run(request).await)
}

fn extract_token_from_header(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Authentication("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Authentication("Invalid Authorization header format".to_string()))?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Authentication("Authorization header must start with 'Bearer '".to_string())
    })?;

    if token.is_empty() {
        return Err(AppError::Authentication("Empty token".to_string()));
    }

    Ok(token.to_string())
}
