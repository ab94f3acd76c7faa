use crate::domain::error::{AppError, Result};
use crate::domain::variant::VariantSlot;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Flat feature vector consumed by the scorer, keyed `Q{questionId}_score`.
/// Built fresh per prediction request and never persisted.
pub type FeatureMap = BTreeMap<String, f64>;

/// Lifecycle states of a trained model row.
///
/// The training pipeline writes the first five; promotion moves rows between
/// `trained` and the three serving states. At most one row may hold each
/// serving state at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "training")]
    Training,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "trained")]
    Trained,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "active-A")]
    ActiveA,
    #[serde(rename = "active-B")]
    ActiveB,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Pending => "pending",
            ModelStatus::Training => "training",
            ModelStatus::Completed => "completed",
            ModelStatus::Failed => "failed",
            ModelStatus::Trained => "trained",
            ModelStatus::Active => "active",
            ModelStatus::ActiveA => "active-A",
            ModelStatus::ActiveB => "active-B",
        }
    }

    pub fn parse(value: &str) -> Result<ModelStatus> {
        match value {
            "pending" => Ok(ModelStatus::Pending),
            "training" => Ok(ModelStatus::Training),
            "completed" => Ok(ModelStatus::Completed),
            "failed" => Ok(ModelStatus::Failed),
            "trained" => Ok(ModelStatus::Trained),
            "active" => Ok(ModelStatus::Active),
            "active-A" => Ok(ModelStatus::ActiveA),
            "active-B" => Ok(ModelStatus::ActiveB),
            other => Err(AppError::ParseError(format!(
                "Unknown model status: {}",
                other
            ))),
        }
    }

    /// Serving status a row takes when promoted into `slot`.
    pub fn for_slot(slot: VariantSlot) -> ModelStatus {
        match slot {
            VariantSlot::Single => ModelStatus::Active,
            VariantSlot::A => ModelStatus::ActiveA,
            VariantSlot::B => ModelStatus::ActiveB,
        }
    }
}

/// A persisted trained-model record, including the serialized artifact.
#[derive(Debug, Clone)]
pub struct PredictionModel {
    pub id: i64,
    pub name: String,
    pub status: ModelStatus,
    /// Opaque metrics blob written by the training pipeline; passed through.
    pub performance: Option<JsonValue>,
    /// Serialized trained model, absent until training completes.
    pub model_data: Option<Vec<u8>>,
    /// Opaque hyperparameter blob; passed through.
    pub parameters: Option<JsonValue>,
    pub created_at: Option<String>,
}

/// Listing view of a model row without the binary artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub id: i64,
    pub name: String,
    pub status: ModelStatus,
    pub performance: Option<JsonValue>,
    pub parameters: Option<JsonValue>,
    pub created_at: Option<String>,
}

impl From<&PredictionModel> for ModelSummary {
    fn from(model: &PredictionModel) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            status: model.status,
            performance: model.performance.clone(),
            parameters: model.parameters.clone(),
            created_at: model.created_at.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ModelStatus::Pending,
            ModelStatus::Training,
            ModelStatus::Completed,
            ModelStatus::Failed,
            ModelStatus::Trained,
            ModelStatus::Active,
            ModelStatus::ActiveA,
            ModelStatus::ActiveB,
        ] {
            assert_eq!(ModelStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(ModelStatus::parse("bogus").is_err());
    }

    #[test]
    fn test_status_for_slot() {
        assert_eq!(
            ModelStatus::for_slot(VariantSlot::Single),
            ModelStatus::Active
        );
        assert_eq!(ModelStatus::for_slot(VariantSlot::A), ModelStatus::ActiveA);
        assert_eq!(ModelStatus::for_slot(VariantSlot::B), ModelStatus::ActiveB);
    }
}
