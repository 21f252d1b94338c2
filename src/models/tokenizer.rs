//! Tokenizers used to build classifier logit biases.

use std::collections::HashMap;

/// Maps text onto provider token ids.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;
}

/// Tokenizer over an explicit vocabulary.
///
/// Whitespace-separated words found in the vocabulary encode to their id;
/// anything else falls back to one token per byte, like a byte-level BPE
/// would for an unseen word.
#[derive(Debug, Clone, Default)]
pub struct VocabularyTokenizer {
    vocab: HashMap<String, u32>,
}

impl VocabularyTokenizer {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            vocab: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn insert(&mut self, token: impl Into<String>, id: u32) {
        self.vocab.insert(token.into(), id);
    }
}

impl Tokenizer for VocabularyTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.split_whitespace()
            .flat_map(|word| match self.vocab.get(word) {
                Some(id) => vec![*id],
                None => word.bytes().map(u32::from).collect(),
            })
            .collect()
    }
}

impl<F> Tokenizer for F
where
    F: Fn(&str) -> Vec<u32> + Send + Sync,
{
    fn encode(&self, text: &str) -> Vec<u32> {
        self(text)
    }
}
