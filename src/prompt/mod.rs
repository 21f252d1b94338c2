//! Prompts: templates with output handling, tools and derived handler prompts.

pub mod loader;
pub mod parser;
pub mod registry;
pub mod template;

pub use loader::PromptLoader;
pub use parser::{JsonParser, OutputParser, ParseError, TagParser, TagSpec};
pub use registry::{PromptRegistry, ScopedRegistry};
pub use template::PromptArgs;

use std::sync::Arc;

use crate::error::{ParleyError, Result};
use crate::tools::Function;
use crate::types::OutputSchema;

pub const EXCEPTION_PROMPT: &str = "There is an unexpected error from your response. \nHere is the error message:\n\n---\n{error_message}\n---\n\nPlease fix the error. Remember to follow the instructions from the user message.\n";

pub const INTERRUPT_PROMPT: &str = "The return of the function call is as follows:\n\n---\n{call_results}\n---\n\nYou can choose to make more function calls, or you can provide your final response.\n";

pub const FINAL_PROMPT: &str = "Please provide your final response.";

const EXCEPTION_SUFFIX: &str = "_exception_handler";
const INTERRUPT_SUFFIX: &str = "_interrupt_handler";
const FINAL_SUFFIX: &str = "_interrupt_handler_final";

/// Kind of derived handler prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Exception,
    Interrupt,
    InterruptFinal,
}

impl HandlerKind {
    fn suffix(self) -> &'static str {
        match self {
            HandlerKind::Exception => EXCEPTION_SUFFIX,
            HandlerKind::Interrupt => INTERRUPT_SUFFIX,
            HandlerKind::InterruptFinal => FINAL_SUFFIX,
        }
    }

    /// Split a derived path into its kind and the base prompt path.
    pub fn split(path: &str) -> Option<(HandlerKind, &str)> {
        let inner = path.strip_prefix("__")?;
        [HandlerKind::InterruptFinal, HandlerKind::Interrupt, HandlerKind::Exception]
            .into_iter()
            .find_map(|kind| inner.strip_suffix(kind.suffix()).map(|base| (kind, base)))
            .filter(|(_, base)| !base.is_empty())
    }
}

/// A registered prompt.
#[derive(Clone)]
pub struct Prompt {
    path: String,
    template: String,
    format: Option<OutputSchema>,
    parser: Option<Arc<dyn OutputParser>>,
    tags: TagSpec,
    functions: Vec<Function>,
    exception_prompt: String,
    interrupt_prompt: String,
}

impl Prompt {
    pub fn builder(path: impl Into<String>, template: impl Into<String>) -> PromptBuilder {
        PromptBuilder {
            prompt: Prompt {
                path: path.into(),
                template: template.into(),
                format: None,
                parser: None,
                tags: TagSpec::default(),
                functions: Vec::new(),
                exception_prompt: EXCEPTION_PROMPT.to_string(),
                interrupt_prompt: INTERRUPT_PROMPT.to_string(),
            },
        }
    }

    /// Plain prompt with default handlers.
    pub fn new(path: impl Into<String>, template: impl Into<String>) -> Self {
        Self::builder(path, template).build_unchecked()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn format(&self) -> Option<&OutputSchema> {
        self.format.as_ref()
    }

    pub fn tags(&self) -> &TagSpec {
        &self.tags
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Result<&Function> {
        self.functions
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| ParleyError::FunctionNotFound {
                prompt: self.path.clone(),
                name: name.to_string(),
            })
    }

    pub fn has_functions(&self) -> bool {
        !self.functions.is_empty()
    }

    pub fn exception_prompt(&self) -> &str {
        &self.exception_prompt
    }

    pub fn interrupt_prompt(&self) -> &str {
        &self.interrupt_prompt
    }

    /// Whether this prompt was derived from another one.
    pub fn is_handler(&self) -> bool {
        HandlerKind::split(&self.path).is_some()
    }

    /// Render the template.
    pub fn render(&self, args: &PromptArgs) -> Result<String> {
        template::render(&self.path, &self.template, args)
    }

    /// Parse free-text output. Explicit parsers win over the tag lists.
    pub fn parse(&self, content: &str) -> std::result::Result<serde_json::Value, ParseError> {
        match &self.parser {
            Some(parser) => parser.parse(content),
            None => TagParser::new(self.tags.clone()).parse(content),
        }
    }

    /// Attach a handler to a declared function.
    pub fn link_function<F, Fut>(&mut self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(crate::tools::ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let path = self.path.clone();
        let function = self
            .functions
            .iter_mut()
            .find(|f| f.name() == name)
            .ok_or_else(|| ParleyError::FunctionNotFound {
                prompt: path,
                name: name.to_string(),
            })?;
        function.link(handler);
        Ok(())
    }

    /// Path of the prompt this one was derived from, or its own path.
    pub fn base_path(&self) -> &str {
        HandlerKind::split(&self.path).map_or(self.path.as_str(), |(_, base)| base)
    }

    /// Handlers of handlers hang off the base prompt.
    fn derive(&self, kind: HandlerKind) -> Prompt {
        let mut derived = self.clone();
        derived.path = format!("__{}{}", self.base_path(), kind.suffix());
        derived.template = match kind {
            HandlerKind::Exception => self.exception_prompt.clone(),
            HandlerKind::Interrupt => self.interrupt_prompt.clone(),
            HandlerKind::InterruptFinal => FINAL_PROMPT.to_string(),
        };
        if kind == HandlerKind::InterruptFinal {
            derived.functions.clear();
        }
        derived
    }

    /// Prompt sent after a parse failure; takes `error_message`.
    pub fn exception_handler(&self) -> Prompt {
        self.derive(HandlerKind::Exception)
    }

    /// Prompt carrying function results; takes `call_results`.
    pub fn interrupt_handler(&self) -> Prompt {
        self.derive(HandlerKind::Interrupt)
    }

    /// Prompt asking for a final answer. Carries no functions.
    pub fn interrupt_handler_final(&self) -> Prompt {
        self.derive(HandlerKind::InterruptFinal)
    }

    pub fn handler(&self, kind: HandlerKind) -> Prompt {
        self.derive(kind)
    }
}

impl std::fmt::Debug for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompt")
            .field("path", &self.path)
            .field("format", &self.format.as_ref().map(|s| &s.name))
            .field("custom_parser", &self.parser.is_some())
            .field("functions", &self.functions)
            .finish()
    }
}

/// Validating builder for [`Prompt`].
pub struct PromptBuilder {
    prompt: Prompt,
}

impl PromptBuilder {
    pub fn format(mut self, schema: OutputSchema) -> Self {
        self.prompt.format = Some(schema);
        self
    }

    pub fn parser<P: OutputParser + 'static>(mut self, parser: P) -> Self {
        self.prompt.parser = Some(Arc::new(parser));
        self
    }

    pub fn tags(mut self, tags: TagSpec) -> Self {
        self.prompt.tags = tags;
        self
    }

    pub fn xml_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prompt.tags.xml_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn md_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prompt.tags.md_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn signal_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prompt.tags.signal_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn function(mut self, function: Function) -> Self {
        self.prompt.functions.push(function);
        self
    }

    pub fn functions<I: IntoIterator<Item = Function>>(mut self, functions: I) -> Self {
        self.prompt.functions.extend(functions);
        self
    }

    pub fn exception_prompt(mut self, template: impl Into<String>) -> Self {
        self.prompt.exception_prompt = template.into();
        self
    }

    pub fn interrupt_prompt(mut self, template: impl Into<String>) -> Self {
        self.prompt.interrupt_prompt = template.into();
        self
    }

    /// Skip validation.
    pub(crate) fn build_unchecked(self) -> Prompt {
        self.prompt
    }

    pub fn build(self) -> Result<Prompt> {
        let p = &self.prompt;
        if p.format.is_some() && p.has_functions() {
            return Err(ParleyError::InvalidArgument(format!(
                "prompt '{}' cannot use structured output and functions together",
                p.path
            )));
        }
        if p.format.is_some() && p.parser.is_some() {
            return Err(ParleyError::InvalidArgument(format!(
                "prompt '{}' cannot use structured output and a parser together",
                p.path
            )));
        }
        let exception_args = template::placeholders(&p.path, &p.exception_prompt)?;
        if !exception_args.iter().any(|a| a == "error_message") {
            return Err(ParleyError::Template {
                path: p.path.clone(),
                message: "exception prompt must mention {error_message}".into(),
            });
        }
        let interrupt_args = template::placeholders(&p.path, &p.interrupt_prompt)?;
        if !interrupt_args.iter().any(|a| a == "call_results") {
            return Err(ParleyError::Template {
                path: p.path.clone(),
                message: "interrupt prompt must mention {call_results}".into(),
            });
        }
        let mut names: Vec<&str> = p.functions.iter().map(|f| f.name()).collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(ParleyError::DuplicateRegistration(format!(
                "function '{}' on prompt '{}'",
                dup[0], p.path
            )));
        }
        Ok(self.prompt)
    }
}
