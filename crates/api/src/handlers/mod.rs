pub mod matches;
pub mod offers;
pub mod presence;

use serde::Deserialize;

/// Body for mutations whose only input is the idempotency key.
#[derive(Debug, Default, Deserialize)]
pub struct RequestIdBody {
    #[serde(default)]
    pub request_id: Option<String>,
}
