use super::ids::ModelId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Static rate configuration for one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRate {
    pub model_id: ModelId,
    pub rate_per_million_units: Decimal,
}

impl ModelRate {
    pub fn new(model_id: impl Into<ModelId>, rate_per_million_units: Decimal) -> Self {
        Self {
            model_id: model_id.into(),
            rate_per_million_units,
        }
    }
}

/// Outcome of a rate lookup. Unknown models are priced at the default
/// model's rate and say so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLookup {
    Exact(Decimal),
    Fallback(Decimal),
}

impl RateLookup {
    #[inline]
    pub fn rate(&self) -> Decimal {
        match self {
            RateLookup::Exact(rate) | RateLookup::Fallback(rate) => *rate,
        }
    }

    #[inline]
    pub fn is_fallback(&self) -> bool {
        matches!(self, RateLookup::Fallback(_))
    }
}

/// Estimated usage for one inference exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_units: u64,
    pub completion_units: u64,
}

impl TokenUsage {
    #[inline]
    pub fn total(&self) -> u64 {
        self.prompt_units + self.completion_units
    }
}
