//! Convenience re-exports for common use.

pub use crate::agent::{Agent, AgentLimits, AgentResponse, CallArgs, Classifier};
pub use crate::config::{ParleyConfig, ProjectConfig};
pub use crate::dialog::{Dialog, MessageOptions};
pub use crate::error::{ParleyError, Result};
pub use crate::log::{MemoryLog, NoLog, ReplayLog};
pub use crate::models::{ModelCard, ModelCatalog, StaticCatalog};
pub use crate::prompt::{Prompt, PromptArgs, PromptRegistry};
pub use crate::provider::ModelBinding;
pub use crate::tools::{Function, FunctionParameters, ToolArguments};
pub use crate::types::{ApiType, CallOptions, FunctionCall, Message, Role, Usage};
