//! Push delivery channels used by the [`PushRouter`](crate::PushRouter).

pub mod log;
pub mod webhook;
