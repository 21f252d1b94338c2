//! Agents: bounded call/interrupt/retry loop over a model binding.

pub mod agent;
pub mod attempt;
pub mod classify;
pub mod diagnostics;

pub use agent::{repeated_call_notice, Agent, AgentLimits, AgentResponse, CallArgs};
pub use attempt::Attempt;
pub use classify::{Classifier, ClassifierOutput};
pub use diagnostics::DiagnosticSink;
