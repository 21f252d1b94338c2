//! Parsers that turn free-text model output into structured values.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Output rejected by a parser. The message is shown to the model.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parses model output.
pub trait OutputParser: Send + Sync {
    fn parse(&self, content: &str) -> Result<Value, ParseError>;
}

impl<F> OutputParser for F
where
    F: Fn(&str) -> Result<Value, ParseError> + Send + Sync,
{
    fn parse(&self, content: &str) -> Result<Value, ParseError> {
        self(content)
    }
}

/// Tag lists used by [`TagParser`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSpec {
    #[serde(default)]
    pub xml_tags: Vec<String>,
    #[serde(default)]
    pub md_tags: Vec<String>,
    /// Flags such as `<DONE>`, reported as booleans.
    #[serde(default)]
    pub signal_tags: Vec<String>,
    #[serde(default)]
    pub required_xml_tags: Vec<String>,
    #[serde(default)]
    pub required_md_tags: Vec<String>,
}

/// Default parser: collects `<tag>...</tag>` and top-level fenced blocks.
///
/// Output: `{"raw", "xml_tags": {tag: [..]}, "md_tags": {tag: [..]}, <signal>: bool}`.
#[derive(Debug, Clone, Default)]
pub struct TagParser {
    spec: TagSpec,
}

impl TagParser {
    pub fn new(spec: TagSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &TagSpec {
        &self.spec
    }
}

impl OutputParser for TagParser {
    fn parse(&self, content: &str) -> Result<Value, ParseError> {
        let mut errors = Vec::new();
        let mut xml = Map::new();
        let mut md = Map::new();

        for tag in &self.spec.xml_tags {
            let found = find_xml_blocks(content, tag);
            if found.is_empty() {
                errors.push(format!("No {tag} tags found, it should be provided as <{tag}>...</{tag}>"));
            }
            xml.insert(tag.clone(), json!(found));
        }
        for tag in &self.spec.md_tags {
            let found = find_md_blocks(content, tag);
            if found.is_empty() {
                errors.push(format!("No {tag} tags found, it should be provided as ```{tag} ... ```"));
            }
            md.insert(tag.clone(), json!(found));
        }
        for tag in &self.spec.required_xml_tags {
            if xml.contains_key(tag) {
                continue;
            }
            let found = find_xml_blocks(content, tag);
            if found.is_empty() {
                errors.push(format!("Required {tag} tag not found, it should be provided as <{tag}>...</{tag}>"));
            }
            xml.insert(tag.clone(), json!(found));
        }
        for tag in &self.spec.required_md_tags {
            if md.contains_key(tag) {
                continue;
            }
            let found = find_md_blocks(content, tag);
            if found.is_empty() {
                errors.push(format!("Required {tag} tag not found, it should be provided as ```{tag} ... ```"));
            }
            md.insert(tag.clone(), json!(found));
        }

        if !errors.is_empty() {
            return Err(ParseError::new(format!("Parsing errors:\n{}", errors.join("\n"))));
        }

        let mut parsed = Map::new();
        parsed.insert("raw".into(), json!(content));
        parsed.insert("xml_tags".into(), Value::Object(xml));
        parsed.insert("md_tags".into(), Value::Object(md));
        for tag in &self.spec.signal_tags {
            parsed.insert(tag.clone(), json!(content.contains(&format!("<{tag}>"))));
        }
        Ok(Value::Object(parsed))
    }
}

/// Parses the whole output, or its first fenced `json` block, as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl OutputParser for JsonParser {
    fn parse(&self, content: &str) -> Result<Value, ParseError> {
        if let Ok(value) = serde_json::from_str(content.trim()) {
            return Ok(value);
        }
        let block = find_md_blocks(content, "json")
            .into_iter()
            .next()
            .ok_or_else(|| ParseError::new("Response is not valid JSON and contains no ```json block"))?;
        serde_json::from_str(&block).map_err(|e| ParseError::new(format!("Invalid JSON: {e}")))
    }
}

/// Contents of every `<tag>...</tag>` block, non-greedy and across lines.
pub fn find_xml_blocks(text: &str, tag: &str) -> Vec<String> {
    let pattern = format!(r"(?s)<{0}>(.*?)</{0}>", regex::escape(tag));
    match Regex::new(&pattern) {
        Ok(re) => re
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn fence_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*```\s*(\S*)").expect("valid fence pattern"))
}

/// Trimmed bodies of top-level fenced blocks whose info string is `tag`.
/// Fences nested inside another block are treated as its content.
pub fn find_md_blocks(text: &str, tag: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in text.lines() {
        let fence = fence_open()
            .captures(line)
            .map(|c| c.get(1).map_or("", |m| m.as_str()));
        match (open.is_some(), fence) {
            (false, Some(info)) => {
                open = Some(info.to_string());
                body.clear();
                depth = 1;
            }
            (false, None) => {}
            (true, Some(info)) => {
                if info.is_empty() {
                    depth -= 1;
                } else {
                    depth += 1;
                }
                if depth == 0 {
                    if open.as_deref() == Some(tag) {
                        blocks.push(body.join("\n").trim().to_string());
                    }
                    open = None;
                } else {
                    body.push(line);
                }
            }
            (true, None) => body.push(line),
        }
    }
    blocks
}
