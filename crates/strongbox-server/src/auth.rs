//! Bearer-token extraction and request authorization.

use axum::http::HeaderMap;

use strongbox_core::acl::Permission;
use strongbox_core::error::{AuthError, KvError};
use strongbox_core::token::AccessToken;

use crate::error::AppError;
use crate::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Extract the bearer token id from the `authorization` header.
///
/// The `Bearer ` prefix is optional on input; whatever follows it is the
/// token id, validated downstream by the token manager.
///
/// # Errors
///
/// Returns [`AuthError::TokenNotFound`] when the header is absent or too
/// short to carry a token.
pub fn bearer_token_id(headers: &HeaderMap) -> Result<String, AuthError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if value.len() <= BEARER_PREFIX.len() {
        return Err(AuthError::TokenNotFound);
    }

    Ok(value.strip_prefix(BEARER_PREFIX).unwrap_or(value).to_owned())
}

/// Look up and validate the access token carried by the request.
///
/// # Errors
///
/// Propagates extraction and token-manager failures.
pub async fn request_token(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AccessToken, AppError> {
    let id = bearer_token_id(headers)?;
    Ok(state.gatekeeper.token_manager().get(&id).await?)
}

/// Authorize `permission` on `path` for the request's token.
///
/// The token must carry a namespace; its ACLs are evaluated against the
/// namespace-qualified path. Returns the token so handlers can scope KV
/// traffic to its namespace.
///
/// # Errors
///
/// - [`KvError::NoNamespace`] for tokens without a namespace.
/// - [`AuthError::Forbidden`] when the ACLs deny the operation.
pub async fn can_token(
    state: &AppState,
    headers: &HeaderMap,
    permission: Permission,
    path: &str,
) -> Result<AccessToken, AppError> {
    let token = request_token(state, headers).await?;

    if token.namespace.is_empty() {
        return Err(KvError::NoNamespace.into());
    }

    state
        .gatekeeper
        .acl_manager()
        .can_perform(&token.acls, permission, &token.namespace, path)?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn missing_header_is_not_found() {
        let result = bearer_token_id(&HeaderMap::new());
        assert!(matches!(result, Err(AuthError::TokenNotFound)));
    }

    #[test]
    fn empty_value_is_not_found() {
        let result = bearer_token_id(&headers_with(""));
        assert!(matches!(result, Err(AuthError::TokenNotFound)));
    }

    #[test]
    fn too_short_value_is_not_found() {
        let result = bearer_token_id(&headers_with("1234"));
        assert!(matches!(result, Err(AuthError::TokenNotFound)));
    }

    #[test]
    fn bearer_prefix_is_stripped() {
        let id = bearer_token_id(&headers_with("Bearer kt1234567890abcdefgh")).unwrap();
        assert_eq!(id, "kt1234567890abcdefgh");
    }

    #[test]
    fn bare_token_is_passed_through() {
        let id = bearer_token_id(&headers_with("kt1234567890abcdefgh")).unwrap();
        assert_eq!(id, "kt1234567890abcdefgh");
    }
}
