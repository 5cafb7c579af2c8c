//! Access-token authentication.
//!
//! Tokens come from the `access_token` cookie or an `Authorization: Bearer` header and
//! are checked by an external auth service through an [`AuthVerifier`].

pub mod middleware;
pub mod verifier;

pub use middleware::{auth_middleware, extract_token};
pub use verifier::{AuthVerifier, AuthenticatedUser, HttpAuthVerifier};
