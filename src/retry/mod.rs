// Retry support, split in two:
// - classify: which errors are worth retrying at all
// - backoff: how long to wait between attempts

pub mod backoff;
pub mod classify;

pub use backoff::{BackoffPolicy, delay};
pub use classify::{is_retriable, is_retriable_code};
