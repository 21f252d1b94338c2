//! Model cards: limits, prices and features of one model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::capabilities::ModelCapabilities;
use super::tokenizer::Tokenizer;
use crate::error::{ParleyError, Result};
use crate::types::{CallOptions, CompletionCost, Modality, Usage};

/// Output budget reserved for a classifier answer.
const CLASSIFIER_MAX_TOKENS: u32 = 3;

/// Model vendor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Provider {
    OpenAi,
}

/// Optional model feature.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Feature {
    FunctionCall,
    StructuredOutput,
    Streaming,
    Finetuning,
    Distillation,
    PredictedOutput,
    /// Logit bias with token log-probabilities.
    Classification,
}

/// A dated release of a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub name: String,
    /// `YYYY-MM-DD`.
    pub date: String,
}

impl Snapshot {
    pub fn new(name: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            date: date.into(),
        }
    }
}

/// Catalog entry for a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCard {
    pub name: String,
    pub provider: Provider,
    pub snapshots: Vec<Snapshot>,
    pub max_tokens: u32,
    pub max_output_tokens: u32,
    /// USD per 1M input tokens.
    pub input_price: f64,
    pub cached_input_price: f64,
    pub output_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_cutoff: Option<String>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default = "default_modalities")]
    pub input_modalities: Vec<Modality>,
    #[serde(default)]
    pub is_reasoning: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_modalities() -> Vec<Modality> {
    vec![Modality::Text]
}

impl ModelCard {
    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Whether `name` is this card or one of its snapshots.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.snapshots.iter().any(|s| s.name == name)
    }

    /// Most recent snapshot, falling back to the card name.
    pub fn latest_snapshot(&self) -> &str {
        self.snapshots
            .iter()
            .max_by(|a, b| a.date.cmp(&b.date))
            .map(|s| s.name.as_str())
            .unwrap_or(self.name.as_str())
    }

    pub fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities {
            supports_vision: self.input_modalities.contains(&Modality::Image),
            supports_tools: self.supports(Feature::FunctionCall),
            supports_json_schema: self.supports(Feature::StructuredOutput),
            supports_reasoning: self.is_reasoning,
            supports_logprobs: self.supports(Feature::Classification),
            context_length: self.max_tokens as usize,
            max_output_tokens: Some(self.max_output_tokens as usize),
        }
    }

    /// Price `usage` with this card's rates.
    pub fn cost(&self, usage: &Usage) -> CompletionCost {
        CompletionCost::from_usage(usage, self.input_price, self.cached_input_price, self.output_price)
    }

    /// Reject options this model cannot honour.
    pub fn check_options(&self, options: &CallOptions, structured: bool, tools: bool) -> Result<()> {
        let caps = self.capabilities();
        if structured && !caps.supports_json_schema {
            return Err(ParleyError::UnsupportedOperation(format!(
                "{} does not support structured output",
                self.name
            )));
        }
        if tools && !caps.supports_tools {
            return Err(ParleyError::UnsupportedOperation(format!(
                "{} does not support function calling",
                self.name
            )));
        }
        if options.wants_logprobs() && !caps.supports_logprobs {
            return Err(ParleyError::UnsupportedOperation(format!(
                "{} does not support logit bias or logprobs",
                self.name
            )));
        }
        if let Some(max) = options.max_tokens {
            if max > self.max_output_tokens {
                return Err(ParleyError::UnsupportedOperation(format!(
                    "max_tokens {max} exceeds {} output limit of {}",
                    self.name, self.max_output_tokens
                )));
            }
        }
        if self.is_reasoning {
            if let Some(t) = options.temperature {
                if (t - 1.0).abs() > f64::EPSILON {
                    return Err(ParleyError::UnsupportedOperation(format!(
                        "{} is a reasoning model and only accepts temperature 1",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the call options that force a one-token answer from `classes`.
    pub fn make_classifier(
        &self,
        classes: &[String],
        strength: i32,
        tokenizer: &dyn Tokenizer,
    ) -> Result<CallOptions> {
        if !self.supports(Feature::Classification) {
            return Err(ParleyError::UnsupportedOperation(format!(
                "{} does not support classification",
                self.name
            )));
        }
        let mut bias = BTreeMap::new();
        for class in classes {
            let ids = tokenizer.encode(class);
            match ids.as_slice() {
                [id] => {
                    bias.insert(*id, strength);
                }
                _ => {
                    return Err(ParleyError::InvalidArgument(format!(
                        "class '{class}' does not encode to a single token ({} tokens)",
                        ids.len()
                    )))
                }
            }
        }
        if bias.len() != classes.len() {
            return Err(ParleyError::InvalidArgument(format!(
                "classes {classes:?} share tokens"
            )));
        }
        let top = u32::try_from(bias.len()).map_err(|_| {
            ParleyError::InvalidArgument(format!("too many classes: {}", bias.len()))
        })?;
        Ok(CallOptions::builder()
            .logit_bias(bias)
            .temperature(0.0)
            .top_logprobs(top)
            .max_tokens(CLASSIFIER_MAX_TOKENS)
            .logprobs(true)
            .build())
    }
}
