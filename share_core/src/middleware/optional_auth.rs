use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};

use crate::{
    error::AppError,
    middleware::auth::AuthUser,
    AppState,
};

/// The caller's identity if `optional_jwt_auth_middleware` recognised one.
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl OptionalAuthUser {
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_ref().map(|user| user.user_id.as_str())
    }

    pub fn required(self) -> Result<AuthUser, AppError> {
        self.0
            .ok_or_else(|| AppError::Authentication("Authentication required".to_string()))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_user = parts.extensions.get::<AuthUser>().cloned();
        Ok(OptionalAuthUser(auth_user))
    }
}
