//! Authentication primitives.
//!
//! Tokens are issued by the identity provider; this service only verifies
//! them. [`jwt::generate_access_token`] exists for tooling and tests.

pub mod jwt;
