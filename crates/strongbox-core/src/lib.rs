//! Security kernel for Strongbox.
//!
//! Contains the encryption barrier and its keychain, the gatekeeper that
//! custodies the gatekeeper (master) key, secret sharing for the unseal
//! ceremony, the access-token manager, the ACL evaluator, and the
//! namespace-scoped KV facade. This crate depends on `strongbox-storage`
//! for the backend trait and knows nothing about the network surface.

pub mod acl;
pub mod barrier;
pub mod crypto;
pub mod error;
pub mod gatekeeper;
pub mod hash;
pub mod keychain;
pub mod kv;
pub mod shamir;
pub mod token;
