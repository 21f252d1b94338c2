//! Model catalog.

pub mod capabilities;
pub mod card;
pub mod openai;
pub mod tokenizer;

pub use capabilities::ModelCapabilities;
pub use card::{Feature, ModelCard, Provider, Snapshot};
pub use tokenizer::{Tokenizer, VocabularyTokenizer};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{ParleyError, Result};

/// Looks up model cards by name or snapshot name.
pub trait ModelCatalog: Send + Sync {
    fn find(&self, name: &str) -> Result<ModelCard>;
}

/// In-memory catalog seeded with the built-in cards.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    cards: Arc<RwLock<HashMap<String, ModelCard>>>,
}

impl StaticCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in OpenAI cards.
    pub fn builtin() -> Self {
        let catalog = Self::new();
        for card in openai::all() {
            catalog.register(card);
        }
        catalog
    }

    /// Add or replace a card.
    pub fn register(&self, card: ModelCard) {
        if let Ok(mut cards) = self.cards.write() {
            cards.insert(card.name.clone(), card);
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .cards
            .read()
            .map(|cards| cards.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl ModelCatalog for StaticCatalog {
    fn find(&self, name: &str) -> Result<ModelCard> {
        let cards = self
            .cards
            .read()
            .map_err(|_| ParleyError::InvalidState("model catalog lock poisoned".into()))?;
        if let Some(card) = cards.get(name) {
            return Ok(card.clone());
        }
        cards
            .values()
            .find(|c| c.matches(name))
            .cloned()
            .ok_or_else(|| ParleyError::ModelNotFound(name.to_string()))
    }
}
