//! Caller identity
//!
//! Authentication happens upstream. The proxy in front of this service puts
//! the authenticated user id in a configured header; handlers only read it.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::state::AppState;

/// Authenticated user id, taken from the identity header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

impl CallerIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = &state.config().auth.identity_header;

        let value = parts
            .headers
            .get(header.as_str())
            .ok_or_else(|| AppError::Unauthorized("missing caller identity".to_string()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("malformed caller identity".to_string()))?
            .trim();

        if value.is_empty() {
            return Err(AppError::Unauthorized("missing caller identity".to_string()));
        }

        Ok(CallerIdentity(value.to_string()))
    }
}
