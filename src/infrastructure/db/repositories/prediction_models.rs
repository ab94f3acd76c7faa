//! Prediction-model rows and the serving-slot registry.
//!
//! The `active_models` table holds one pointer per serving slot; promotion
//! swaps the pointer and the row statuses inside a single transaction, so two
//! rows can never end up active in the same slot.

use crate::domain::error::{AppError, Result};
use crate::domain::model::{ModelStatus, ModelSummary, PredictionModel};
use crate::domain::variant::VariantSlot;
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqlitePool;
use tracing::info;

use super::super::connection::ClinicalDb;

#[derive(Debug, Clone)]
pub struct PredictionModelInput {
    pub name: String,
    pub status: ModelStatus,
    pub performance: Option<JsonValue>,
    pub model_data: Option<Vec<u8>>,
    pub parameters: Option<JsonValue>,
}

#[derive(Clone)]
pub struct PredictionModelRepository {
    pool: SqlitePool,
}

impl PredictionModelRepository {
    pub fn new(db: &ClinicalDb) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    pub async fn insert(&self, model: &PredictionModelInput) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO prediction_models (name, status, performance, model_data, parameters) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&model.name)
        .bind(model.status.as_str())
        .bind(json_text(&model.performance)?)
        .bind(&model.model_data)
        .bind(json_text(&model.parameters)?)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert model: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get(&self, id: i64) -> Result<PredictionModel> {
        let row = sqlx::query_as::<_, PredictionModelEntity>(
            "SELECT id, name, status, performance, model_data, parameters, created_at \
             FROM prediction_models WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch model: {e}")))?;

        match row {
            Some(entity) => entity.try_into(),
            None => Err(AppError::NotFound(format!("Model not found: {}", id))),
        }
    }

    /// Newest-first listing without the binary artifacts.
    pub async fn list_all(&self) -> Result<Vec<ModelSummary>> {
        let rows = sqlx::query_as::<_, ModelSummaryEntity>(
            "SELECT id, name, status, performance, parameters, created_at \
             FROM prediction_models ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list models: {e}")))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Model currently serving the given slot, or `None` when the slot is
    /// empty. Callers treat `None` as "no model available", not a failure.
    pub async fn find_active(&self, slot: VariantSlot) -> Result<Option<PredictionModel>> {
        let row = sqlx::query_as::<_, PredictionModelEntity>(
            "SELECT m.id, m.name, m.status, m.performance, m.model_data, m.parameters, m.created_at \
             FROM prediction_models m \
             JOIN active_models a ON a.model_id = m.id \
             WHERE a.slot = ?",
        )
        .bind(slot.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch active model: {e}")))?;

        row.map(TryInto::try_into).transpose()
    }

    /// Listing view of the active model for a slot.
    pub async fn find_active_summary(&self, slot: VariantSlot) -> Result<Option<ModelSummary>> {
        let row = sqlx::query_as::<_, ModelSummaryEntity>(
            "SELECT m.id, m.name, m.status, m.performance, m.parameters, m.created_at \
             FROM prediction_models m \
             JOIN active_models a ON a.model_id = m.id \
             WHERE a.slot = ?",
        )
        .bind(slot.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch active model: {e}")))?;

        row.map(TryInto::try_into).transpose()
    }

    /// Promote a model into a serving slot, demoting the previous holder.
    ///
    /// Runs as one transaction: the old holder's status drops to `trained`,
    /// the target row takes the slot's serving status, and the slot pointer
    /// is upserted. If the target already serves another slot it is released
    /// from that slot first, since a row carries a single status.
    pub async fn promote(&self, model_id: i64, slot: VariantSlot) -> Result<ModelSummary> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {e}")))?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM prediction_models WHERE id = ?")
            .bind(model_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch model: {e}")))?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("Model not found: {}", model_id)));
        }

        let active_status = ModelStatus::for_slot(slot);

        sqlx::query(
            "UPDATE prediction_models SET status = 'trained', updated_at = datetime('now') \
             WHERE id IN (SELECT model_id FROM active_models WHERE slot = ?)",
        )
        .bind(slot.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to demote active model: {e}")))?;

        sqlx::query("DELETE FROM active_models WHERE model_id = ? AND slot <> ?")
            .bind(model_id)
            .bind(slot.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to release previous slot: {e}"))
            })?;

        sqlx::query(
            "UPDATE prediction_models SET status = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(active_status.as_str())
        .bind(model_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to promote model: {e}")))?;

        sqlx::query(
            "INSERT INTO active_models (slot, model_id, promoted_at) \
             VALUES (?, ?, datetime('now')) \
             ON CONFLICT(slot) DO UPDATE SET model_id = excluded.model_id, \
                 promoted_at = excluded.promoted_at",
        )
        .bind(slot.as_str())
        .bind(model_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to set slot pointer: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit promotion: {e}")))?;

        info!(model_id, slot = slot.as_str(), "Promoted model");

        let promoted = self.get(model_id).await?;
        Ok(ModelSummary::from(&promoted))
    }
}

fn json_text(value: &Option<JsonValue>) -> Result<Option<String>> {
    match value {
        Some(v) => serde_json::to_string(v)
            .map(Some)
            .map_err(|e| AppError::ParseError(format!("Failed to encode JSON column: {e}"))),
        None => Ok(None),
    }
}

fn json_value(text: Option<String>, column: &str) -> Result<Option<JsonValue>> {
    match text {
        Some(t) => serde_json::from_str(&t)
            .map(Some)
            .map_err(|e| AppError::ParseError(format!("Malformed {} JSON: {e}", column))),
        None => Ok(None),
    }
}

#[derive(sqlx::FromRow)]
struct PredictionModelEntity {
    id: i64,
    name: String,
    status: String,
    performance: Option<String>,
    model_data: Option<Vec<u8>>,
    parameters: Option<String>,
    created_at: String,
}

impl TryFrom<PredictionModelEntity> for PredictionModel {
    type Error = AppError;

    fn try_from(entity: PredictionModelEntity) -> Result<Self> {
        Ok(Self {
            id: entity.id,
            name: entity.name,
            status: ModelStatus::parse(&entity.status)?,
            performance: json_value(entity.performance, "performance")?,
            model_data: entity.model_data,
            parameters: json_value(entity.parameters, "parameters")?,
            created_at: Some(entity.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ModelSummaryEntity {
    id: i64,
    name: String,
    status: String,
    performance: Option<String>,
    parameters: Option<String>,
    created_at: String,
}

impl TryFrom<ModelSummaryEntity> for ModelSummary {
    type Error = AppError;

    fn try_from(entity: ModelSummaryEntity) -> Result<Self> {
        Ok(Self {
            id: entity.id,
            name: entity.name,
            status: ModelStatus::parse(&entity.status)?,
            performance: json_value(entity.performance, "performance")?,
            parameters: json_value(entity.parameters, "parameters")?,
            created_at: Some(entity.created_at),
        })
    }
}
