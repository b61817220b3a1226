//! Primitive aliases shared by every crate.

/// User, offer and match ids. Users come from the identity provider; offer
/// and match ids are BIGSERIAL.
pub type DbId = i64;

/// Stored as TIMESTAMPTZ and always handled in UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
