//! Repository layer.
//!
//! Each repository is a zero-sized struct whose async methods take any
//! [`sqlx::PgExecutor`] (a pool or an open transaction) as the first argument.

pub mod idempotency_repo;
pub mod match_repo;
pub mod offer_repo;
pub mod pair_guard_repo;
pub mod place_repo;
pub mod presence_repo;
pub mod social_repo;

pub use idempotency_repo::IdempotencyRepo;
pub use match_repo::MatchRepo;
pub use offer_repo::OfferRepo;
pub use pair_guard_repo::PairGuardRepo;
pub use place_repo::PlaceRepo;
pub use presence_repo::{PresenceRepo, PresenceStartRepo};
pub use social_repo::{BlockRepo, CooldownRepo, ProfileRepo, ReliabilityRepo};
