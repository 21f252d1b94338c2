//! Configuration (layered: code > env > `.env`), plus project files.

pub mod project;

pub use project::{find_config_file, AgentConfig, LogType, ProjectConfig, PromptsSection};

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<ParleyConfig> = OnceLock::new();

/// Provider credentials and endpoints.
#[derive(Clone, Default)]
pub struct ParleyConfig {
    api_keys: Arc<RwLock<HashMap<String, String>>>,
    base_urls: Arc<RwLock<HashMap<String, String>>>,
}

impl std::fmt::Debug for ParleyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let providers: Vec<String> = self
            .api_keys
            .read()
            .map(|k| k.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("ParleyConfig")
            .field("api_keys_for", &providers)
            .field("base_urls", &self.base_urls)
            .finish()
    }
}

impl ParleyConfig {
    /// Empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables (`OPENAI_API_KEY`, `OPENAI_BASE_URL`).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let config = Self::new();

        let env_mappings = [("OPENAI_API_KEY", "openai"), ("PARLEY_OPENAI_API_KEY", "openai")];
        for (env_var, provider) in &env_mappings {
            if let Ok(key) = std::env::var(env_var) {
                config.set_api_key(provider, key);
            }
        }

        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.set_base_url("openai", url);
        }

        config
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static ParleyConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    pub fn set_api_key(&self, provider: &str, key: impl Into<String>) {
        if let Ok(mut keys) = self.api_keys.write() {
            keys.insert(provider.to_string(), key.into());
        }
    }

    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys.read().ok()?.get(provider).cloned()
    }

    pub fn set_base_url(&self, provider: &str, url: impl Into<String>) {
        if let Ok(mut urls) = self.base_urls.write() {
            urls.insert(provider.to_string(), url.into());
        }
    }

    pub fn get_base_url(&self, provider: &str) -> Option<String> {
        self.base_urls.read().ok()?.get(provider).cloned()
    }

    pub fn has_credentials(&self, provider: &str) -> bool {
        self.get_api_key(provider).is_some()
    }
}
