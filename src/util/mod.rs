//! Utility modules: backoff and timeout.

pub mod retry;
pub mod timeout;
