//! Authentication extractors.
//!
//! - [`auth::AuthUser`] -- any caller with a valid Bearer token.
//! - [`auth::VerifiedUser`] -- additionally requires `email_verified`; used
//!   on every state-changing endpoint.

pub mod auth;
