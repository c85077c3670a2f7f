//! In-process activity bus.
//!
//! The bus provides:
//! - Publish-subscribe fan-out of every tracked activity
//! - Fire-and-forget hand-off to the durable store
//!
//! # Architecture
//!
//! Events flow from contributor → ActivityBus → subscribers, then → Persister → store:
//! - `ActivityBus`: stamps session/user/time, broadcasts synchronously
//! - `Persister`: single background writer that batches queued appends
//! - Persistence failures are logged and the event is lost (best effort)

mod event_bus;
mod persister;


pub use event_bus::ActivityBus;
