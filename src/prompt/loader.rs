//! Loads prompts from `*.toml` files.
//!
//! ```toml
//! [[prompt]]
//! path = "system"
//! template = "You are a careful assistant."
//!
//! [[prompt]]
//! path = "task"
//! template = "Answer {question}"
//! xml_tags = ["answer"]
//!
//! [[prompt.functions]]
//! name = "search"
//! description = "Search the knowledge base"
//! required = ["query"]
//! properties = { query = { type = "string", description = "Search terms" } }
//! ```
//!
//! Paths without a `/` are prefixed with the file stem (`agent.toml` gives
//! `agent/system`).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::parser::{JsonParser, TagSpec};
use super::{Prompt, PromptRegistry};
use crate::error::{ParleyError, Result};
use crate::tools::{Function, FunctionParameters};
use crate::types::OutputSchema;

#[derive(Debug, Deserialize)]
struct PromptFile {
    #[serde(default)]
    prompt: Vec<PromptEntry>,
}

#[derive(Debug, Deserialize)]
struct PromptEntry {
    path: String,
    template: String,
    #[serde(flatten)]
    tags: TagSpec,
    exception_prompt: Option<String>,
    interrupt_prompt: Option<String>,
    /// `"json"` selects the JSON parser; tags are used otherwise.
    parser: Option<String>,
    format: Option<FormatEntry>,
    #[serde(default)]
    functions: Vec<FunctionEntry>,
}

#[derive(Debug, Deserialize)]
struct FormatEntry {
    name: String,
    schema: Value,
    #[serde(default = "default_true")]
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct FunctionEntry {
    name: String,
    description: String,
    #[serde(default)]
    properties: Map<String, Value>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    additional_properties: bool,
    #[serde(default = "default_true")]
    strict: bool,
}

fn default_true() -> bool {
    true
}

/// Reads prompt files from a list of folders.
#[derive(Debug, Clone, Default)]
pub struct PromptLoader {
    folders: Vec<PathBuf>,
}

impl PromptLoader {
    pub fn new<I, P>(folders: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            folders: folders.into_iter().map(Into::into).collect(),
        }
    }

    /// Register every prompt found. Returns how many were added.
    pub fn load_into(&self, registry: &mut PromptRegistry) -> Result<usize> {
        let mut count = 0;
        for folder in &self.folders {
            let mut files: Vec<PathBuf> = std::fs::read_dir(folder)
                .map_err(|e| {
                    ParleyError::Configuration(format!("cannot read prompt folder {}: {e}", folder.display()))
                })?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
                .collect();
            files.sort();
            for file in files {
                for prompt in Self::load_file(&file)? {
                    registry.register(prompt)?;
                    count += 1;
                }
            }
        }
        info!(count, folders = self.folders.len(), "Loaded prompts");
        Ok(count)
    }

    pub fn load_file(file: &Path) -> Result<Vec<Prompt>> {
        let source = std::fs::read_to_string(file)?;
        let stem = file
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ParleyError::Configuration(format!("bad prompt file name {}", file.display())))?;
        debug!(file = %file.display(), "Parsing prompt file");
        Self::parse_str(stem, &source)
            .map_err(|e| ParleyError::Configuration(format!("{}: {e}", file.display())))
    }

    /// Parse prompt definitions from TOML text.
    pub fn parse_str(namespace: &str, source: &str) -> Result<Vec<Prompt>> {
        let file: PromptFile =
            toml::from_str(source).map_err(|e| ParleyError::Configuration(e.to_string()))?;
        file.prompt
            .into_iter()
            .map(|entry| build_prompt(namespace, entry))
            .collect()
    }
}

fn build_prompt(namespace: &str, entry: PromptEntry) -> Result<Prompt> {
    let path = if entry.path.contains('/') {
        entry.path
    } else {
        format!("{namespace}/{}", entry.path)
    };
    let mut builder = Prompt::builder(path, entry.template).tags(entry.tags);
    if let Some(t) = entry.exception_prompt {
        builder = builder.exception_prompt(t);
    }
    if let Some(t) = entry.interrupt_prompt {
        builder = builder.interrupt_prompt(t);
    }
    match entry.parser.as_deref() {
        None | Some("tags") => {}
        Some("json") => builder = builder.parser(JsonParser),
        Some(other) => {
            return Err(ParleyError::Configuration(format!("unknown parser '{other}'")));
        }
    }
    if let Some(f) = entry.format {
        builder = builder.format(OutputSchema {
            name: f.name,
            schema: f.schema,
            strict: f.strict,
        });
    }
    for f in entry.functions {
        let params = FunctionParameters {
            properties: f.properties,
            required: f.required,
            additional_properties: f.additional_properties,
        };
        builder = builder.function(Function::new(f.name, f.description, params).with_strict(f.strict));
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = r#"
[[prompt]]
path = "system"
template = "You are terse."

[[prompt]]
path = "shared/task"
template = "Answer {question}"
xml_tags = ["answer"]
signal_tags = ["DONE"]

[[prompt.functions]]
name = "search"
description = "Search"
required = ["query"]
properties = { query = { type = "string", description = "terms" } }

[[prompt]]
path = "extract"
template = "Extract"
[prompt.format]
name = "fields"
schema = { type = "object", properties = { a = { type = "string" } } }
"#;

    #[test]
    fn parses_prompts_with_namespacing() {
        let prompts = PromptLoader::parse_str("agent", FILE).unwrap();
        let paths: Vec<&str> = prompts.iter().map(|p| p.path()).collect();
        assert_eq!(paths, vec!["agent/system", "shared/task", "agent/extract"]);

        let task = &prompts[1];
        assert_eq!(task.tags().xml_tags, vec!["answer".to_string()]);
        assert_eq!(task.functions()[0].parameters().required, vec!["query".to_string()]);
        assert!(!task.functions()[0].is_linked());

        let extract = &prompts[2];
        assert_eq!(extract.format().unwrap().schema["type"], "object");
    }

    #[test]
    fn unknown_parser_is_configuration_error() {
        let src = "[[prompt]]\npath = \"p\"\ntemplate = \"x\"\nparser = \"yaml\"\n";
        assert!(matches!(PromptLoader::parse_str("n", src), Err(ParleyError::Configuration(_))));
    }

    #[test]
    fn loads_folder_into_registry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("agent.toml"), FILE).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let mut reg = PromptRegistry::new();
        let n = PromptLoader::new([dir.path()]).load_into(&mut reg).unwrap();
        assert_eq!(n, 3);
        assert!(reg.contains("agent/system"));
    }
}
