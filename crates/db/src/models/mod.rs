//! Row structs and insert DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` struct matching the
//! database row and, where rows are created from the engine, a plain `New*`
//! struct for the insert.

pub mod idempotency;
pub mod matches;
pub mod offer;
pub mod pair_guard;
pub mod place;
pub mod presence;
pub mod social;
