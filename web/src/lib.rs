//! Axum integration for the enrollment platform.
//!
//! Handlers stay thin: extract and validate input, call a domain service,
//! map the result. This crate holds the pieces every handler shares.
//!
//! - [`AppError`]: structured JSON errors with a machine-readable code
//! - [`Identity`]: the caller as asserted by the upstream auth provider
//! - [`CorrelationId`]: per-request id, propagated through tracing spans
//! - [`correlation_id_layer`]: middleware that assigns and echoes the id
//!
//! # Example
//!
//! ```ignore
//! use enrollment_web::{AppError, Identity};
//!
//! async fn get_registration(
//!     State(state): State<AppState>,
//!     identity: Identity,
//!     Path(id): Path<Uuid>,
//! ) -> Result<Json<RegistrationView>, AppError> {
//!     let registration = state.service.get(&identity.into(), id.into()).await?;
//!     Ok(Json(registration.into()))
//! }
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{CorrelationId, Identity, Role, USER_ID_HEADER, USER_ROLE_HEADER};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};

/// Result alias for handlers
pub type WebResult<T> = Result<T, AppError>;
