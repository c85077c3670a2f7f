//! Volume control for high-frequency raw signals.
//!
//! - `TypingDebouncer`: coalesces text fragments per resource into one
//!   `typing` activity once the resource has been quiet for the window.
//! - `OperationGate`: drops repeats of the same discrete operation on the
//!   same resource inside the window.

mod operations;
mod typing;

#[cfg(test)]
mod tests;

pub use operations::OperationGate;
pub use typing::TypingDebouncer;

use std::time::Duration;

pub const DEFAULT_TYPING_WINDOW: Duration = Duration::from_millis(1_000);
pub const DEFAULT_OPERATION_WINDOW: Duration = Duration::from_millis(1_000);
