//! Domain rules for the rendezvous matching and meetup-lifecycle engine.
//!
//! Everything in this crate is pure: constants, status enums, validation
//! helpers, and the deterministic decision functions (place resolution,
//! meeting confirmation, match promotion, idempotency classification). The
//! `db`, `engine`, `api`, and `worker` crates all build on these so that the
//! rules live in exactly one place.

#[macro_use]
mod macros;

pub mod candidates;
pub mod confirmation;
pub mod error;
pub mod geo;
pub mod idempotency;
pub mod matching;
pub mod offer;
pub mod place_resolution;
pub mod presence;
pub mod types;
