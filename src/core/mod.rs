//! Shared types used across the pipeline: the activity event model, the
//! per-process session identity and the wall-clock abstraction.

pub mod clock;
pub mod event;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{activity_data, path_parts, ActivityData, ActivityEvent, ActivityKind};
pub use session::SessionContext;
