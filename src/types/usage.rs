use super::cost::Cost;
use super::ids::ModelId;
use super::pricing::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    InferenceSuccess,
    InferenceError,
    StoreError,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditAction::InferenceSuccess => "inference_success",
            AuditAction::InferenceError => "inference_error",
            AuditAction::StoreError => "store_error",
        };
        f.write_str(name)
    }
}

/// Append-only record of one inference attempt or store failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: AuditAction,
    pub model_id: ModelId,
    pub estimated_cost: Cost,
    #[serde(default)]
    pub usage: TokenUsage,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn success(model_id: ModelId, cost: Cost, usage: TokenUsage, latency_ms: u64) -> Self {
        Self {
            action: AuditAction::InferenceSuccess,
            model_id,
            estimated_cost: cost,
            usage,
            latency_ms: Some(latency_ms),
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Failed attempts are never charged
    pub fn inference_error(model_id: ModelId, latency_ms: Option<u64>, error: String) -> Self {
        Self {
            action: AuditAction::InferenceError,
            model_id,
            estimated_cost: Cost::ZERO,
            usage: TokenUsage::default(),
            latency_ms,
            error: Some(error),
            created_at: Utc::now(),
        }
    }

    pub fn store_error(model_id: ModelId, error: String) -> Self {
        Self {
            action: AuditAction::StoreError,
            model_id,
            estimated_cost: Cost::ZERO,
            usage: TokenUsage::default(),
            latency_ms: None,
            error: Some(error),
            created_at: Utc::now(),
        }
    }
}

/// Aggregated audit statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageStats {
    pub total_cost: Cost,
    pub total_units: u64,
    pub successes: usize,
    pub inference_errors: usize,
    pub store_errors: usize,
    pub by_model: HashMap<ModelId, ModelUsage>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelUsage {
    pub cost: Cost,
    pub units: u64,
    pub requests: usize,
}

impl UsageStats {
    pub fn from_entries(entries: &[AuditEntry]) -> Self {
        let mut stats = UsageStats::default();

        for entry in entries {
            stats.total_cost = stats.total_cost + entry.estimated_cost;
            stats.total_units += entry.usage.total();

            match entry.action {
                AuditAction::InferenceSuccess => stats.successes += 1,
                AuditAction::InferenceError => stats.inference_errors += 1,
                AuditAction::StoreError => {
                    stats.store_errors += 1;
                    continue;
                }
            }

            let model = stats.by_model.entry(entry.model_id.clone()).or_default();
            model.cost = model.cost + entry.estimated_cost;
            model.units += entry.usage.total();
            model.requests += 1;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_audit_entry_json_parsing() {
        let json_str = r#"{
            "action": "inference_success",
            "modelId": "gemini-1.5-pro",
            "estimatedCost": "0.000054",
            "usage": { "promptUnits": 2, "completionUnits": 10 },
            "latencyMs": 812,
            "error": null,
            "createdAt": "2024-01-15T10:30:00Z"
        }"#;

        let entry: AuditEntry = serde_json::from_str(json_str).unwrap();
        assert_eq!(entry.action, AuditAction::InferenceSuccess);
        assert_eq!(entry.model_id.as_str(), "gemini-1.5-pro");
        assert_eq!(entry.estimated_cost, Cost::new(Decimal::new(54, 6)));
        assert_eq!(entry.usage.total(), 12);
        assert_eq!(entry.latency_ms, Some(812));
        assert!(entry.error.is_none());
    }

    #[test]
    fn test_usage_stats_from_entries() {
        let model = ModelId::from("gemini-1.5-pro");
        let usage = TokenUsage {
            prompt_units: 2,
            completion_units: 10,
        };
        let entries = vec![
            AuditEntry::success(model.clone(), Cost::new(Decimal::new(54, 6)), usage, 100),
            AuditEntry::inference_error(model.clone(), Some(60_000), "timeout".into()),
            AuditEntry::store_error(model.clone(), "offline".into()),
            AuditEntry::success(model.clone(), Cost::new(Decimal::new(6, 6)), usage, 90),
        ];

        let stats = UsageStats::from_entries(&entries);
        assert_eq!(stats.total_cost, Cost::new(Decimal::new(60, 6)));
        assert_eq!(stats.total_units, 24);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.inference_errors, 1);
        assert_eq!(stats.store_errors, 1);
        assert_eq!(stats.by_model[&model].requests, 3);
        assert_eq!(stats.total_cost, Cost::from_entries(entries.iter()));
    }

    #[test]
    fn test_action_display() {
        assert_eq!(AuditAction::StoreError.to_string(), "store_error");
        assert_eq!(
            serde_json::to_string(&AuditAction::InferenceError).unwrap(),
            "\"inference_error\""
        );
    }
}
