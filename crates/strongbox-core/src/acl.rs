//! Path-based access control lists.
//!
//! An [`Acl`] pairs a path pattern with a permission set. Patterns match
//! exactly, or by prefix when they end with a single trailing `*`.
//! Evaluation walks ACLs from shortest path to longest so that more
//! specific wildcard grants override broader ones; an exact match wins
//! outright. [`Permission::Deny`] erases whatever an earlier ACL granted.

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// An action a token may be granted on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    /// Enumerate child paths.
    List,
    /// Read items.
    Read,
    /// Create new items.
    Create,
    /// Overwrite existing items.
    Update,
    /// Delete items.
    Delete,
    /// Explicitly deny access; must be the only permission in its ACL.
    Deny,
}

/// A path pattern and the permissions it grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    /// Exact path, or a prefix ending in a single trailing `*`.
    pub path: String,
    /// Granted permissions; `DENY` is exclusive.
    pub permissions: Vec<Permission>,
}

/// Evaluates ACL lists. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct AclManager;

impl AclManager {
    /// Create a new evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Check that every ACL in the list is well formed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidAcl`] for an empty path, a wildcard
    /// anywhere but the final character, an empty permission set, or
    /// `DENY` mixed with other permissions.
    pub fn validate_acls(&self, acls: &[Acl]) -> Result<(), AuthError> {
        for acl in acls {
            if acl.path.is_empty() {
                return Err(AuthError::InvalidAcl {
                    reason: "acl path cannot be empty".to_owned(),
                });
            }
            if let Some(index) = acl.path.find('*') {
                if index != acl.path.len() - 1 {
                    return Err(AuthError::InvalidAcl {
                        reason: format!(
                            "the `*` wildcard can only be used at the end of an acl path: {}",
                            acl.path
                        ),
                    });
                }
            }
            if acl.permissions.is_empty() {
                return Err(AuthError::InvalidAcl {
                    reason: format!("acl has no permissions: {}", acl.path),
                });
            }
            if acl.permissions.contains(&Permission::Deny) && acl.permissions.len() > 1 {
                return Err(AuthError::InvalidAcl {
                    reason: format!(
                        "a DENY permission cannot be mixed with other permissions: {}",
                        acl.path
                    ),
                });
            }
        }
        Ok(())
    }

    /// Compute the permissions the ACL list grants on `path` within
    /// `namespace`.
    ///
    /// A non-empty namespace qualifies both the evaluated path and every
    /// ACL pattern as `<ns>/kv/<relative>` — the shape the KV facade
    /// composes, minus the `namespaces/` storage root. Tokens therefore
    /// carry namespace-relative ACLs; an empty namespace evaluates fully
    /// qualified paths as-is.
    ///
    /// The result is independent of the order `acls` arrives in: ACLs
    /// are canonically sorted by ascending path length, ties broken
    /// lexicographically.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidAcl`] when validation fails.
    pub fn calculate_permissions(
        &self,
        acls: &[Acl],
        namespace: &str,
        path: &str,
    ) -> Result<Vec<Permission>, AuthError> {
        self.validate_acls(acls)?;

        let mut sorted: Vec<&Acl> = acls.iter().collect();
        sorted.sort_by(|a, b| {
            a.path
                .len()
                .cmp(&b.path.len())
                .then_with(|| a.path.cmp(&b.path))
        });

        let namespace = namespace.trim_matches('/');
        let qualified = qualify(namespace, path);

        let mut permissions: Vec<Permission> = Vec::new();

        for acl in sorted {
            let pattern = qualify(namespace, &acl.path);

            if qualified == pattern {
                permissions = if acl.permissions[0] == Permission::Deny {
                    Vec::new()
                } else {
                    acl.permissions.clone()
                };
                break;
            }

            if let Some(prefix) = pattern.strip_suffix('*') {
                if qualified.starts_with(prefix) {
                    permissions = if acl.permissions[0] == Permission::Deny {
                        Vec::new()
                    } else {
                        acl.permissions.clone()
                    };
                }
            }
        }

        Ok(permissions)
    }

    /// Succeed iff the ACL list grants `permission` on `path` within
    /// `namespace`. An empty ACL list denies everything.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] when the permission is absent and
    /// [`AuthError::InvalidAcl`] when validation fails.
    pub fn can_perform(
        &self,
        acls: &[Acl],
        permission: Permission,
        namespace: &str,
        path: &str,
    ) -> Result<(), AuthError> {
        if acls.is_empty() {
            return Err(AuthError::Forbidden);
        }

        let permissions = self.calculate_permissions(acls, namespace, path)?;
        if permissions.contains(&permission) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

/// Prefix a namespace-relative path with `<ns>/kv/`; the empty namespace
/// leaves the path fully qualified.
fn qualify(namespace: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if namespace.is_empty() {
        path.to_owned()
    } else {
        format!("{namespace}/kv/{path}")
    }
}
