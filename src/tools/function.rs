//! Callable functions exposed to the model.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use super::arguments::ToolArguments;
use super::types::FunctionParameters;
use super::validation::validate_arguments;
use crate::error::{ParleyError, Result};
use crate::provider::format::value_to_text;
use crate::types::FunctionCall;

/// Type alias for the function handler.
pub type FunctionHandler = dyn Fn(ToolArguments) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// Turns a handler result into the text shown to the model.
pub type ResultProcessor = dyn Fn(&Value, &FunctionCall) -> String + Send + Sync;

/// Default rendering of a function result.
pub fn default_processor(result: &Value, call: &FunctionCall) -> String {
    format!(
        "Return of calling function {} with arguments {}:\n---\n{}\n---\n",
        call.name,
        call.arguments_json(),
        value_to_text(result)
    )
}

/// A function declared on a prompt, optionally linked to a handler.
#[derive(Clone)]
pub struct Function {
    name: String,
    description: String,
    parameters: FunctionParameters,
    strict: bool,
    handler: Option<Arc<FunctionHandler>>,
    processor: Arc<ResultProcessor>,
}

impl Function {
    /// Declare a function with no handler yet.
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: FunctionParameters) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            strict: true,
            handler: None,
            processor: Arc::new(default_processor),
        }
    }

    /// Declare and link in one step.
    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.link(handler);
        self
    }

    /// Attach the implementation.
    pub fn link<F, Fut>(&mut self, handler: F)
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.handler = Some(Arc::new(
            move |args: ToolArguments| -> BoxFuture<'static, Result<Value>> { Box::pin(handler(args)) },
        ));
    }

    pub fn with_processor<P>(mut self, processor: P) -> Self
    where
        P: Fn(&Value, &FunctionCall) -> String + Send + Sync + 'static,
    {
        self.processor = Arc::new(processor);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &FunctionParameters {
        &self.parameters
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn is_linked(&self) -> bool {
        self.handler.is_some()
    }

    /// Run the handler for `call` and fill in its result.
    ///
    /// Arguments that do not match the schema are reported back to the model
    /// through `result_str`; handler failures are returned as
    /// [`ParleyError::ToolExecution`].
    pub async fn call(&self, mut call: FunctionCall) -> Result<FunctionCall> {
        let handler = self
            .handler
            .as_ref()
            .ok_or_else(|| ParleyError::FunctionNotLinked(self.name.clone()))?;

        if let Err(reason) = validate_arguments(&call.arguments, &self.parameters) {
            debug!(function = %self.name, %reason, "Rejected function arguments");
            call.result_str = Some(format!("Error: {reason}"));
            call.error_message = Some(reason);
            return Ok(call);
        }

        let result = handler(ToolArguments::new(call.arguments.clone()))
            .await
            .map_err(|e| ParleyError::ToolExecution {
                tool_name: self.name.clone(),
                message: e.to_string(),
            })?;
        call.result_str = Some((self.processor)(&result, &call));
        call.result = result;
        Ok(call)
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("linked", &self.is_linked())
            .finish()
    }
}
