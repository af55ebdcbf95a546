//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the id assigned by the correlation middleware
//! - [`Identity`]: the authenticated caller, forwarded by the auth provider
//!
//! Authentication happens upstream. The gateway in front of this service
//! verifies the session and forwards the result as `X-User-Id` and
//! `X-User-Role`; those headers are trusted as-is.

use crate::error::AppError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Header carrying the authenticated user's role
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Per-request correlation id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by the middleware; fall back to the header for routers without it.
        let id = parts
            .extensions
            .get::<CorrelationId>()
            .copied()
            .or_else(|| header_uuid(&parts.headers, crate::CORRELATION_ID_HEADER).map(Self))
            .unwrap_or_else(|| Self(Uuid::new_v4()));

        Ok(id)
    }
}

/// What the caller may do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A learner acting on their own registrations
    Learner,
    /// Back-office staff acting on anyone's registrations
    Admin,
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "learner" => Ok(Self::Learner),
            "admin" => Ok(Self::Admin),
            other => Err(AppError::unauthorized(format!("Unknown role '{other}'"))),
        }
    }
}

/// The authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// Authenticated user id
    pub user_id: Uuid,
    /// Role granted by the auth provider
    pub role: Role,
}

impl Identity {
    /// Whether the caller has back-office rights
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_uuid(&parts.headers, USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized("Missing or invalid X-User-Id header"))?;

        // Absent role means the least-privileged one.
        let role = match parts.headers.get(USER_ROLE_HEADER) {
            None => Role::Learner,
            Some(value) => value
                .to_str()
                .map_err(|_| AppError::unauthorized("Invalid X-User-Role header"))?
                .parse()?,
        };

        Ok(Self { user_id, role })
    }
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Option<Uuid> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}
