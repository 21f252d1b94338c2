//! Function calling: declarations, arguments and dispatch.

pub mod arguments;
pub mod function;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use function::{default_processor, Function};
pub use types::{FunctionParameters, ParameterBuilder};
