//! Outcome of one model invocation inside the retry loop.

use crate::error::{ParleyError, Result};
use crate::types::Message;

/// How the agent should react to a single invocation.
#[derive(Debug)]
pub enum Attempt {
    /// Usable response.
    Completed(Message),
    /// Response whose content the prompt's parser rejected.
    ParseFailure(Message),
    /// Provider backpressure; retried without spending budget.
    RateLimited(ParleyError),
    /// Transport-level failure; retried against the recall budget.
    TransportFailure(ParleyError),
    /// Never retried.
    Fatal(ParleyError),
}

impl Attempt {
    pub fn classify(result: Result<Message>) -> Self {
        match result {
            Ok(message) if message.has_errors() => Attempt::ParseFailure(message),
            Ok(message) => Attempt::Completed(message),
            Err(err) if err.is_rate_limit() => Attempt::RateLimited(err),
            Err(err) if err.is_transport() => Attempt::TransportFailure(err),
            Err(err) => Attempt::Fatal(err),
        }
    }
}
