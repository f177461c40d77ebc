// Messages Module - debounced capture feedback
//
// Capture feedback flickers on and off every frame; the debouncer keeps each
// message visible for a minimum duration and shows one message at a time,
// oldest first.

pub mod debouncer;
pub mod queue;

pub use debouncer::{MessageDebouncer, DEFAULT_MINIMUM_DURATION};
pub use queue::{MessageQueue, TimedMessage};
