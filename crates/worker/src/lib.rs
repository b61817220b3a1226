//! Scheduled sweeps for the meetup engine.
//!
//! Every sweep runs on its own interval in its own task (see [`jobs`]) and
//! stops when the shared [`CancellationToken`] fires.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod config;
pub mod jobs;
