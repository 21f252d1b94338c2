//! Token usage and cost tracking types.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Token usage for a generation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
}

impl Usage {
    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        if let Some(v) = other.cached_tokens {
            *self.cached_tokens.get_or_insert(0) += v;
        }
        if let Some(v) = other.reasoning_tokens {
            *self.reasoning_tokens.get_or_insert(0) += v;
        }
    }
}

/// Priced usage, in USD.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct CompletionCost {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_prompt_tokens: u64,
    pub cost: f64,
}

impl CompletionCost {
    /// Price `usage` with per-1M-token rates. Cached prompt tokens are billed
    /// at `cached_price` and excluded from the input count.
    pub fn from_usage(usage: &Usage, input_price: f64, cached_price: f64, output_price: f64) -> Self {
        let prompt = u64::from(usage.input_tokens);
        let cached = u64::from(usage.cached_tokens.unwrap_or(0)).min(prompt);
        let completion = u64::from(usage.output_tokens);
        let cost = (input_price * (prompt - cached) as f64
            + output_price * completion as f64
            + cached_price * cached as f64)
            / 1e6;
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            cached_prompt_tokens: cached,
            cost,
        }
    }
}

impl Add for CompletionCost {
    type Output = CompletionCost;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            cached_prompt_tokens: self.cached_prompt_tokens + rhs.cached_prompt_tokens,
            cost: self.cost + rhs.cost,
        }
    }
}

impl AddAssign for CompletionCost {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for CompletionCost {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
