//! Project configuration from `parley.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::{ParleyError, Result};
use crate::types::{ApiType, CallOptions, ReasoningEffort};

/// Environment variable pointing at a config file or its directory.
pub const CONFIG_ENV: &str = "PARLEY_CONFIG";
const CONFIG_FILENAMES: &[&str] = &["parley.toml", ".parley.toml"];
const CONFIG_SUBDIRS: &[&str] = &["", "template"];

/// Log backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogType {
    #[default]
    LocalFile,
    Memory,
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptsSection {
    #[serde(default)]
    pub folders: Vec<PathBuf>,
}

/// Settings for one named agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub model_name: String,
    pub system_prompt_path: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub seed: Option<u64>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub api_type: Option<ApiType>,
    pub max_exception_retry: Option<usize>,
    pub max_interrupt_times: Option<usize>,
    pub max_llm_recall: Option<usize>,
}

impl AgentConfig {
    /// Default call options for this agent.
    pub fn call_options(&self) -> CallOptions {
        CallOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            seed: self.seed,
            reasoning_effort: self.reasoning_effort,
            ..Default::default()
        }
    }
}

fn default_name() -> String {
    "parley".to_string()
}

fn default_exception_retry() -> usize {
    3
}

fn default_interrupt_times() -> usize {
    5
}

/// Contents of `parley.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub log_type: LogType,
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub api_type: ApiType,
    #[serde(default = "default_exception_retry")]
    pub max_exception_retry: usize,
    #[serde(default = "default_interrupt_times")]
    pub max_interrupt_times: usize,
    #[serde(default)]
    pub max_llm_recall: usize,
    pub diagnostics_dir: Option<PathBuf>,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
    /// Directory holding the config file; relative paths resolve against it.
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_type: LogType::default(),
            log_dir: None,
            api_type: ApiType::default(),
            max_exception_retry: default_exception_retry(),
            max_interrupt_times: default_interrupt_times(),
            max_llm_recall: 0,
            diagnostics_dir: None,
            prompts: PromptsSection::default(),
            agents: BTreeMap::new(),
            root: None,
        }
    }
}

impl ProjectConfig {
    pub fn parse(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| ParleyError::Configuration(format!("invalid parley.toml: {e}")))
    }

    /// Load a config file; relative paths inside resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ParleyError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::parse(&source)?;
        config.root = path.parent().map(Path::to_path_buf);
        debug!(path = %path.display(), name = %config.name, "Loaded project config");
        Ok(config)
    }

    /// Find and load the nearest config, falling back to defaults.
    pub fn discover() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        match find_config_file(&cwd) {
            Some(path) => Self::load(&path),
            None => {
                debug!("No parley.toml found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Directory for the file log.
    pub fn log_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.log_dir {
            return Ok(self.resolve(dir));
        }
        directories::ProjectDirs::from("", "", "parley")
            .map(|dirs| dirs.data_dir().join("logs"))
            .ok_or_else(|| ParleyError::Configuration("no home directory for default log_dir".into()))
    }

    /// Directory for unrecoverable-error diagnostics.
    pub fn diagnostics_dir(&self) -> Result<PathBuf> {
        match &self.diagnostics_dir {
            Some(dir) => Ok(self.resolve(dir)),
            None => Ok(self.log_dir()?.join("diagnostics")),
        }
    }

    pub fn prompt_folders(&self) -> Vec<PathBuf> {
        self.prompts.folders.iter().map(|f| self.resolve(f)).collect()
    }

    pub fn agent(&self, name: &str) -> Result<&AgentConfig> {
        self.agents
            .get(name)
            .ok_or_else(|| ParleyError::Configuration(format!("no [agents.{name}] section")))
    }
}

fn candidate(path: &Path) -> Option<PathBuf> {
    let path = if path.is_dir() { path.join(CONFIG_FILENAMES[0]) } else { path.to_path_buf() };
    path.is_file().then_some(path)
}

/// Locate the nearest config file.
///
/// Checks `PARLEY_CONFIG` (file or directory), then `start` and each parent,
/// looking in the directory itself and its `template/` subdirectory.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    if let Some(found) = std::env::var_os(CONFIG_ENV).and_then(|p| candidate(Path::new(&p))) {
        return Some(found);
    }
    for dir in start.ancestors() {
        for sub in CONFIG_SUBDIRS {
            let base = if sub.is_empty() { dir.to_path_buf() } else { dir.join(sub) };
            for name in CONFIG_FILENAMES {
                let path = base.join(name);
                if path.is_file() {
                    return Some(path);
                }
            }
        }
    }
    None
}
