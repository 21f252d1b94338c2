//! Prompt registry owned by the caller.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::{HandlerKind, Prompt};
use crate::error::{ParleyError, Result};
use crate::tools::ToolArguments;

/// Prompts by path. Mutable during warm-up, shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    prompts: BTreeMap<String, Arc<Prompt>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prompt. Paths are unique.
    pub fn register(&mut self, prompt: Prompt) -> Result<Arc<Prompt>> {
        let path = prompt.path().to_string();
        if self.prompts.contains_key(&path) {
            return Err(ParleyError::DuplicateRegistration(format!("prompt '{path}'")));
        }
        debug!(%path, functions = prompt.functions().len(), "Registered prompt");
        let prompt = Arc::new(prompt);
        self.prompts.insert(path, Arc::clone(&prompt));
        Ok(prompt)
    }

    pub fn get(&self, path: &str) -> Result<Arc<Prompt>> {
        self.prompts
            .get(path)
            .cloned()
            .ok_or_else(|| ParleyError::PromptNotFound(path.to_string()))
    }

    /// Like [`get`](Self::get), but also rebuilds derived handler prompts
    /// such as `__{path}_exception_handler`.
    pub fn resolve(&self, path: &str) -> Result<Arc<Prompt>> {
        if let Some(prompt) = self.prompts.get(path) {
            return Ok(Arc::clone(prompt));
        }
        match HandlerKind::split(path) {
            Some((kind, base)) => {
                let base = self.resolve(base)?;
                Ok(Arc::new(base.handler(kind)))
            }
            None => Err(ParleyError::PromptNotFound(path.to_string())),
        }
    }

    /// Attach a handler to a function declared on a registered prompt.
    pub fn link_function<F, Fut>(&mut self, path: &str, name: &str, handler: F) -> Result<()>
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let prompt = self
            .prompts
            .get_mut(path)
            .ok_or_else(|| ParleyError::PromptNotFound(path.to_string()))?;
        Arc::make_mut(prompt).link_function(name, handler)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.prompts.contains_key(path)
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.prompts.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// View that resolves paths relative to `root`.
    pub fn scoped(&self, root: impl Into<String>) -> ScopedRegistry<'_> {
        ScopedRegistry {
            registry: self,
            root: root.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Registry view rooted at a path prefix.
#[derive(Debug, Clone)]
pub struct ScopedRegistry<'a> {
    registry: &'a PromptRegistry,
    root: String,
}

impl ScopedRegistry<'_> {
    fn full(&self, path: &str) -> String {
        format!("{}/{}", self.root, path)
    }

    pub fn get(&self, path: &str) -> Result<Arc<Prompt>> {
        self.registry.get(&self.full(path))
    }

    pub fn resolve(&self, path: &str) -> Result<Arc<Prompt>> {
        self.registry.resolve(&self.full(path))
    }

    /// Paths under the root, relative to it.
    pub fn paths(&self) -> Vec<String> {
        let prefix = format!("{}/", self.root);
        self.registry
            .prompts
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix).map(String::from))
            .collect()
    }
}
