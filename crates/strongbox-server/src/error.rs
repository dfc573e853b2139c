//! HTTP error mapping.
//!
//! Core errors convert into an [`AppError`] carrying the status code and
//! a client-safe message. The taxonomy distinctions the kernel makes are
//! preserved; nothing beyond them leaks (in particular, gatekeeper token
//! failures stay uniform).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use strongbox_core::error::{AuthError, BarrierError, GatekeeperError, KvError, ShamirError};

use crate::ttl::TtlError;

/// An error response: status code plus a JSON body `{ "error": … }`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    /// Build an error with an explicit status.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// A 400 with the given message.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<BarrierError> for AppError {
    fn from(err: BarrierError) -> Self {
        let status = match &err {
            BarrierError::AlreadyInitialized
            | BarrierError::NotInitialized
            | BarrierError::Unsealed
            | BarrierError::DisallowedPath { .. }
            | BarrierError::MixRawMap => StatusCode::BAD_REQUEST,
            BarrierError::Sealed => StatusCode::SERVICE_UNAVAILABLE,
            BarrierError::InvalidGatekeeperKey => StatusCode::UNAUTHORIZED,
            BarrierError::NotFound { .. } => StatusCode::NOT_FOUND,
            BarrierError::UnknownKeyId { .. }
            | BarrierError::Crypto(_)
            | BarrierError::Keychain(_)
            | BarrierError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<GatekeeperError> for AppError {
    fn from(err: GatekeeperError) -> Self {
        match err {
            GatekeeperError::InvalidGatekeeperToken
            | GatekeeperError::InvalidUnsealKey
            | GatekeeperError::InvalidAccessKey => {
                Self::new(StatusCode::UNAUTHORIZED, err.to_string())
            }
            GatekeeperError::Barrier(inner) => inner.into(),
            GatekeeperError::Auth(inner) => inner.into(),
            GatekeeperError::Shamir(inner) => inner.into(),
            GatekeeperError::Crypto(_) | GatekeeperError::Backend(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenNotFound => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            AuthError::TokenInvalid => Self::new(StatusCode::UNAUTHORIZED, err.to_string()),
            AuthError::TokenNotActiveYet | AuthError::Forbidden => {
                Self::new(StatusCode::FORBIDDEN, err.to_string())
            }
            AuthError::InvalidAcl { .. } => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            AuthError::Barrier(inner) => inner.into(),
        }
    }
}

impl From<KvError> for AppError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::InvalidPath | KvError::NoNamespace => {
                Self::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            KvError::Barrier(inner) => inner.into(),
        }
    }
}

impl From<ShamirError> for AppError {
    fn from(err: ShamirError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<TtlError> for AppError {
    fn from(err: TtlError) -> Self {
        Self::bad_request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_maps_to_service_unavailable() {
        let err: AppError = BarrierError::Sealed.into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn gatekeeper_credentials_map_to_unauthorized() {
        for err in [
            GatekeeperError::InvalidGatekeeperToken,
            GatekeeperError::InvalidUnsealKey,
            GatekeeperError::InvalidAccessKey,
        ] {
            let app: AppError = err.into();
            assert_eq!(app.status, StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn nested_barrier_errors_unwrap() {
        let err: AppError = GatekeeperError::Barrier(BarrierError::NotFound {
            key: "x".to_owned(),
        })
        .into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn forbidden_maps_to_403() {
        let err: AppError = AuthError::Forbidden.into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }
}
