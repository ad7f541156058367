//! Recursive filesystem watcher: glob/ignore filtering, per-path debounce,
//! and synthesis of `QueueItem`s for the processing queue.

mod debounce;
mod error;
mod watcher;

pub use debounce::PathDebouncer;
pub use error::WatchError;
pub use watcher::Watcher;
