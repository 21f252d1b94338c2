//! Built-in OpenAI model cards.

use super::card::{Feature, ModelCard, Provider, Snapshot};
use crate::types::Modality;

fn chat_features(classification: bool) -> Vec<Feature> {
    let mut features = vec![
        Feature::FunctionCall,
        Feature::StructuredOutput,
        Feature::Streaming,
        Feature::Finetuning,
    ];
    if classification {
        features.push(Feature::Classification);
    }
    features
}

fn reasoning_features() -> Vec<Feature> {
    vec![Feature::FunctionCall, Feature::StructuredOutput, Feature::Streaming]
}

#[allow(clippy::too_many_arguments)]
fn card(
    name: &str,
    snapshot: (&str, &str),
    max_tokens: u32,
    max_output_tokens: u32,
    prices: (f64, f64, f64),
    cutoff: &str,
    features: Vec<Feature>,
    is_reasoning: bool,
) -> ModelCard {
    ModelCard {
        name: name.to_string(),
        provider: Provider::OpenAi,
        snapshots: vec![Snapshot::new(snapshot.0, snapshot.1)],
        max_tokens,
        max_output_tokens,
        input_price: prices.0,
        cached_input_price: prices.1,
        output_price: prices.2,
        knowledge_cutoff: Some(cutoff.to_string()),
        features,
        input_modalities: vec![Modality::Text, Modality::Image],
        is_reasoning,
        base_url: None,
    }
}

pub fn gpt_41() -> ModelCard {
    let mut c = card(
        "gpt-4.1",
        ("gpt-4.1-2025-04-14", "2025-04-14"),
        1_047_576,
        32_768,
        (2.0, 0.5, 8.0),
        "2024-06-01",
        chat_features(true),
        false,
    );
    c.features.extend([Feature::Distillation, Feature::PredictedOutput]);
    c
}

pub fn gpt_41_mini() -> ModelCard {
    card(
        "gpt-4.1-mini",
        ("gpt-4.1-mini-2025-04-14", "2025-04-14"),
        1_047_576,
        32_768,
        (0.4, 0.1, 1.6),
        "2024-06-01",
        chat_features(true),
        false,
    )
}

pub fn gpt_4o() -> ModelCard {
    card(
        "gpt-4o",
        ("gpt-4o-2024-08-06", "2024-08-06"),
        128_000,
        16_384,
        (2.5, 1.25, 10.0),
        "2023-10-01",
        chat_features(true),
        false,
    )
}

pub fn gpt_4o_mini() -> ModelCard {
    card(
        "gpt-4o-mini",
        ("gpt-4o-mini-2024-07-18", "2024-07-18"),
        128_000,
        16_384,
        (0.15, 0.075, 0.6),
        "2023-10-01",
        chat_features(true),
        false,
    )
}

pub fn o3() -> ModelCard {
    card(
        "o3",
        ("o3-2025-04-16", "2025-04-16"),
        200_000,
        100_000,
        (2.0, 0.5, 8.0),
        "2024-06-01",
        reasoning_features(),
        true,
    )
}

pub fn o4_mini() -> ModelCard {
    card(
        "o4-mini",
        ("o4-mini-2025-04-16", "2025-04-16"),
        200_000,
        100_000,
        (1.1, 0.275, 4.4),
        "2024-06-01",
        reasoning_features(),
        true,
    )
}

/// Every built-in OpenAI card.
pub fn all() -> Vec<ModelCard> {
    vec![gpt_41(), gpt_41_mini(), gpt_4o(), gpt_4o_mini(), o3(), o4_mini()]
}
