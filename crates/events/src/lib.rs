//! Rendezvous domain events and push-notification fan-out.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`MeetupEvent`]: the event envelope published after a commit.
//! - [`PushDispatcher`]: the seam to the external push provider, with a
//!   webhook and a logging implementation in [`delivery`].
//! - [`PushRouter`]: background task forwarding bus events to a dispatcher.

pub mod bus;
pub mod delivery;
pub mod dispatcher;
pub mod router;

pub use bus::{event_types, EventBus, MeetupEvent};
pub use delivery::log::LogDispatcher;
pub use delivery::webhook::WebhookDispatcher;
pub use dispatcher::{DispatchError, PushDispatcher};
pub use router::PushRouter;
