//! Single and batch prediction orchestration.
//!
//! Resolves the `predict_ab` flag, routes requests to the active model of
//! the matching serving slot, materializes the model blob, and drives the
//! external scorer. Batch requests are partitioned per arm and scored one
//! process per non-empty group.

use crate::application::use_cases::feature_extraction::features_from_assessment;
use crate::domain::error::{AppError, Result};
use crate::domain::model::{FeatureMap, PredictionModel};
use crate::domain::variant::{Variant, VariantSlot};
use crate::infrastructure::db::repositories::{
    AssessmentRepository, FeatureFlagRepository, PredictionModelRepository,
};
use crate::infrastructure::db::ClinicalDb;
use crate::infrastructure::model_store::ModelStore;
use crate::infrastructure::report::ReportRenderer;
use crate::infrastructure::scorer::{ScoreFields, Scorer};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routing key used when a request carries no key of its own.
const DEFAULT_AB_KEY: &str = "default";
const DEFAULT_AB_KEY_FIELD: &str = "patientId";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PredictRequest {
    /// Explicit feature map; takes precedence over `assessment_id`.
    pub features: Option<FeatureMap>,
    pub assessment_id: Option<i64>,
    pub ab_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchPredictRequest {
    /// Assessment ids take priority over raw feature rows when both appear.
    pub assessment_ids: Vec<i64>,
    pub feature_rows: Vec<FeatureRow>,
    /// Name of the field holding each item's routing key.
    pub ab_key_field: Option<String>,
    /// `generatePdf` is accepted for clients of the older API.
    #[serde(alias = "generatePdf")]
    pub generate_report: bool,
    /// Restore original item order in the response instead of the historical
    /// group order (A results, then B, then single).
    pub preserve_input_order: bool,
}

/// Raw batch input row; any extra fields are kept so the routing key can be
/// picked out by name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeatureRow {
    pub id: Option<JsonValue>,
    pub features: Option<FeatureMap>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionOutcome {
    pub model_id: i64,
    pub model_name: String,
    pub variant: Option<Variant>,
    #[serde(flatten)]
    pub fields: ScoreFields,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPredictionItem {
    pub id: String,
    pub ab_key: String,
    pub variant: Option<Variant>,
    pub model_id: i64,
    pub model_name: String,
    #[serde(flatten)]
    pub fields: ScoreFields,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub items: Vec<BatchPredictionItem>,
    pub report_path: Option<String>,
}

/// Uniform batch work item after input normalization.
struct BatchItem {
    id: String,
    ab_key: String,
    features: FeatureMap,
}

/// Model routing resolved for a whole batch. True A/B needs both arms; a
/// missing arm drops the entire batch to the single slot.
enum BatchRouting {
    Split {
        arm_a: PredictionModel,
        arm_b: PredictionModel,
    },
    Single(PredictionModel),
}

pub struct PredictionService {
    models: PredictionModelRepository,
    assessments: AssessmentRepository,
    flags: FeatureFlagRepository,
    store: ModelStore,
    scorer: Arc<dyn Scorer>,
    renderer: Arc<dyn ReportRenderer>,
}

impl PredictionService {
    pub fn new(
        db: &ClinicalDb,
        store: ModelStore,
        scorer: Arc<dyn Scorer>,
        renderer: Arc<dyn ReportRenderer>,
    ) -> Self {
        Self {
            models: PredictionModelRepository::new(db),
            assessments: AssessmentRepository::new(db),
            flags: FeatureFlagRepository::new(db),
            store,
            scorer,
            renderer,
        }
    }

    pub async fn predict_single(&self, request: PredictRequest) -> Result<PredictionOutcome> {
        let ab_enabled = self.flags.ab_enabled().await?;

        let mut ab_key = request.ab_key;
        let features = match request.features {
            Some(features) => features,
            None => {
                let Some(assessment_id) = request.assessment_id else {
                    return Err(AppError::ValidationError(
                        "Missing features or assessmentId".to_string(),
                    ));
                };
                let assessment = self.assessments.get(assessment_id).await?.ok_or_else(|| {
                    AppError::NotFound(format!("Assessment not found: {}", assessment_id))
                })?;
                if ab_key.is_none() {
                    ab_key = Some(assessment.ab_key(DEFAULT_AB_KEY_FIELD));
                }
                features_from_assessment(&assessment)
            }
        };

        let (model, variant) = self.resolve_single(ab_enabled, ab_key.as_deref()).await?;
        let model_path = self.store.materialize(&model)?;
        let fields = self.scorer.score(&model_path, &features).await?;

        info!(model_id = model.id, variant = ?variant, "Prediction served");
        Ok(PredictionOutcome {
            model_id: model.id,
            model_name: model.name,
            variant,
            fields,
        })
    }

    pub async fn predict_batch(&self, request: BatchPredictRequest) -> Result<BatchOutcome> {
        let ab_enabled = self.flags.ab_enabled().await?;
        let ab_key_field = request
            .ab_key_field
            .clone()
            .unwrap_or_else(|| DEFAULT_AB_KEY_FIELD.to_string());

        let items = self.collect_items(&request, &ab_key_field).await?;
        let routing = self.resolve_batch(ab_enabled).await?;

        // Partition, remembering original positions for optional
        // input-order restoration.
        let mut group_a = Vec::new();
        let mut group_b = Vec::new();
        let mut group_single = Vec::new();
        for (position, item) in items.into_iter().enumerate() {
            match &routing {
                BatchRouting::Split { .. } => {
                    let key = if item.ab_key.is_empty() {
                        DEFAULT_AB_KEY
                    } else {
                        item.ab_key.as_str()
                    };
                    match Variant::bucket(key) {
                        Variant::A => group_a.push((position, item)),
                        Variant::B => group_b.push((position, item)),
                    }
                }
                BatchRouting::Single(_) => group_single.push((position, item)),
            }
        }

        // Historical response order is by group: A, then B, then single.
        let mut tagged = Vec::new();
        match &routing {
            BatchRouting::Split { arm_a, arm_b } => {
                tagged.extend(self.score_group(arm_a, Some(Variant::A), &group_a).await?);
                tagged.extend(self.score_group(arm_b, Some(Variant::B), &group_b).await?);
            }
            BatchRouting::Single(model) => {
                tagged.extend(self.score_group(model, None, &group_single).await?);
            }
        }
        if request.preserve_input_order {
            tagged.sort_by_key(|(position, _)| *position);
        }
        let items: Vec<BatchPredictionItem> =
            tagged.into_iter().map(|(_, item)| item).collect();

        // Rendering is a best-effort addendum; computed predictions are
        // returned even when it fails.
        let report_path = if request.generate_report {
            match self.renderer.render(&items).await {
                Ok(path) => Some(path.to_string_lossy().to_string()),
                Err(err) => {
                    warn!(error = %err, "Report rendering failed");
                    None
                }
            }
        } else {
            None
        };

        info!(rows = items.len(), "Batch prediction served");
        Ok(BatchOutcome { items, report_path })
    }

    async fn resolve_single(
        &self,
        ab_enabled: bool,
        ab_key: Option<&str>,
    ) -> Result<(PredictionModel, Option<Variant>)> {
        if ab_enabled {
            let key = match ab_key {
                Some(key) if !key.is_empty() => key,
                _ => DEFAULT_AB_KEY,
            };
            let bucket = Variant::bucket(key);
            if let Some(model) = self
                .models
                .find_active(VariantSlot::from_variant(bucket))
                .await?
            {
                return Ok((model, Some(bucket)));
            }
            debug!(
                bucket = bucket.as_str(),
                "No model for bucket, falling back to single slot"
            );
        }
        match self.models.find_active(VariantSlot::Single).await? {
            Some(model) => Ok((model, None)),
            None => Err(AppError::NotFound("No active model available".to_string())),
        }
    }

    async fn resolve_batch(&self, ab_enabled: bool) -> Result<BatchRouting> {
        if ab_enabled {
            let arm_a = self.models.find_active(VariantSlot::A).await?;
            let arm_b = self.models.find_active(VariantSlot::B).await?;
            match (arm_a, arm_b) {
                (Some(arm_a), Some(arm_b)) => return Ok(BatchRouting::Split { arm_a, arm_b }),
                _ => debug!("A/B arms incomplete, falling back to single slot"),
            }
        }
        match self.models.find_active(VariantSlot::Single).await? {
            Some(model) => Ok(BatchRouting::Single(model)),
            None => Err(AppError::NotFound("No active model available".to_string())),
        }
    }

    async fn collect_items(
        &self,
        request: &BatchPredictRequest,
        ab_key_field: &str,
    ) -> Result<Vec<BatchItem>> {
        if !request.assessment_ids.is_empty() {
            let assessments = self.assessments.list_by_ids(&request.assessment_ids).await?;
            return Ok(assessments
                .iter()
                .map(|assessment| BatchItem {
                    id: assessment.id.to_string(),
                    ab_key: assessment.ab_key(ab_key_field),
                    features: features_from_assessment(assessment),
                })
                .collect());
        }
        if !request.feature_rows.is_empty() {
            return Ok(request
                .feature_rows
                .iter()
                .enumerate()
                .map(|(index, row)| BatchItem {
                    id: row
                        .id
                        .as_ref()
                        .and_then(scalar_text)
                        .unwrap_or_else(|| index.to_string()),
                    ab_key: row
                        .extra
                        .get(ab_key_field)
                        .and_then(non_empty_text)
                        .unwrap_or_else(|| index.to_string()),
                    features: row.features.clone().unwrap_or_default(),
                })
                .collect());
        }
        Err(AppError::ValidationError(
            "No assessment ids or feature rows given".to_string(),
        ))
    }

    /// Score one routing group with one scorer invocation, zipping the
    /// ordered result rows back onto the group's items by position.
    async fn score_group(
        &self,
        model: &PredictionModel,
        variant: Option<Variant>,
        group: &[(usize, BatchItem)],
    ) -> Result<Vec<(usize, BatchPredictionItem)>> {
        if group.is_empty() {
            return Ok(Vec::new());
        }
        let model_path = self.store.materialize(model)?;
        let features: Vec<FeatureMap> = group.iter().map(|(_, item)| item.features.clone()).collect();
        let rows = self.scorer.score_batch(&model_path, &features).await?;

        Ok(group
            .iter()
            .zip(rows)
            .map(|((position, item), fields)| {
                (
                    *position,
                    BatchPredictionItem {
                        id: item.id.clone(),
                        ab_key: item.ab_key.clone(),
                        variant,
                        model_id: model.id,
                        model_name: model.name.clone(),
                        fields,
                    },
                )
            })
            .collect())
    }
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Truthy-style routing-key read: empty strings and zero do not count.
fn non_empty_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}
