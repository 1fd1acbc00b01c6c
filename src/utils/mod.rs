//! Reusable helpers shared across the monitors.

pub mod retry;

pub use retry::{with_retry, RetryPolicy};
