pub mod estimator;

pub use estimator::estimate;

use crate::constants::DEFAULT_MODEL;
use crate::error::ConfigError;
use crate::types::{Cost, ModelId, ModelRate, RateLookup};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Per-model rates with an explicit default for unknown models
#[derive(Debug, Clone)]
pub struct RateTable {
    rates: HashMap<ModelId, Decimal>,
    default_model: ModelId,
}

impl RateTable {
    /// Table containing only `default`, which also prices unknown models
    pub fn new(default: ModelRate) -> Result<Self, ConfigError> {
        check_rate(&default)?;
        let mut rates = HashMap::new();
        let default_model = default.model_id.clone();
        rates.insert(default.model_id, default.rate_per_million_units);
        Ok(Self {
            rates,
            default_model,
        })
    }

    /// Rates in EUR per million usage units for the models the front-end offers
    pub fn builtin() -> Self {
        let rates: HashMap<ModelId, Decimal> = [
            (DEFAULT_MODEL, Decimal::new(450, 2)),
            ("gemini-1.5-flash", Decimal::new(30, 2)),
            ("gemini-2.0-flash", Decimal::new(40, 2)),
            ("gpt-4o", Decimal::new(500, 2)),
            ("gpt-4o-mini", Decimal::new(60, 2)),
        ]
        .into_iter()
        .map(|(model, rate)| (ModelId::from(model), rate))
        .collect();

        Self {
            rates,
            default_model: ModelId::from(DEFAULT_MODEL),
        }
    }

    /// Add or replace a rate
    pub fn insert(&mut self, rate: ModelRate) -> Result<(), ConfigError> {
        check_rate(&rate)?;
        self.rates.insert(rate.model_id, rate.rate_per_million_units);
        Ok(())
    }

    pub fn default_model(&self) -> &ModelId {
        &self.default_model
    }

    pub fn contains(&self, model_id: &ModelId) -> bool {
        self.rates.contains_key(model_id)
    }

    /// Resolve the rate for `model_id`; never fails
    pub fn lookup(&self, model_id: &ModelId) -> RateLookup {
        if let Some(rate) = self.rates.get(model_id) {
            return RateLookup::Exact(*rate);
        }

        let rate = self
            .rates
            .get(&self.default_model)
            .copied()
            .unwrap_or(Decimal::ZERO);
        tracing::warn!(
            model = %model_id,
            default_model = %self.default_model,
            %rate,
            "no rate for model, pricing at default model rate"
        );
        RateLookup::Fallback(rate)
    }

    /// Cost of `units` estimated usage units on `model_id`
    pub fn cost_of_units(&self, units: u64, model_id: &ModelId) -> Cost {
        Cost::from_units(units, self.lookup(model_id).rate())
    }

    /// `(estimate(text) / 1_000_000) * rate(model_id)`
    pub fn cost(&self, text: &str, model_id: &ModelId) -> Cost {
        self.cost_of_units(estimate(text), model_id)
    }

    /// All known rates, sorted by model id
    pub fn rates(&self) -> Vec<ModelRate> {
        let mut rates: Vec<_> = self
            .rates
            .iter()
            .map(|(model, rate)| ModelRate::new(model.clone(), *rate))
            .collect();
        rates.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        rates
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn check_rate(rate: &ModelRate) -> Result<(), ConfigError> {
    if rate.rate_per_million_units.is_sign_negative() && !rate.rate_per_million_units.is_zero() {
        return Err(ConfigError::InvalidValue {
            var: format!("rate for {}", rate.model_id),
            value: rate.rate_per_million_units.to_string(),
        });
    }
    Ok(())
}

/// Parse `model=rate,model=rate` overrides
pub fn parse_rate_overrides(spec: &str) -> Result<Vec<ModelRate>, ConfigError> {
    spec.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let invalid = || ConfigError::InvalidValue {
                var: "ARCHITECT_RATES".to_string(),
                value: pair.to_string(),
            };
            let (model, rate) = pair.split_once('=').ok_or_else(invalid)?;
            let model = model.trim();
            if model.is_empty() {
                return Err(invalid());
            }
            let rate: Decimal = rate.trim().parse().map_err(|_| invalid())?;
            let rate = ModelRate::new(model, rate);
            check_rate(&rate)?;
            Ok(rate)
        })
        .collect()
}
