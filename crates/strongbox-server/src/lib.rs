//! HTTP surface for Strongbox.
//!
//! A thin mapping from request/response messages onto the security
//! kernel in `strongbox-core`: every operation the gatekeeper, token
//! manager, and KV facade expose corresponds 1-to-1 to a route. Bearer
//! credentials travel in the `authorization` header.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod ttl;
