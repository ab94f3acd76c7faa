use crate::domain::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::super::connection::ClinicalDb;

/// Flag key that switches prediction routing into A/B mode when set to "on".
pub const PREDICT_AB_FLAG: &str = "predict_ab";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Clone)]
pub struct FeatureFlagRepository {
    pool: SqlitePool,
}

impl FeatureFlagRepository {
    pub fn new(db: &ClinicalDb) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Fresh read on every call; flags are never cached.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, Option<String>>(
            "SELECT value FROM feature_flags WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch flag: {e}")))?;

        Ok(value.flatten())
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO feature_flags (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
                 updated_at = datetime('now')",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to set flag: {e}")))?;

        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<FeatureFlag>> {
        let rows = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT key, value FROM feature_flags ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list flags: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(key, value)| FeatureFlag { key, value })
            .collect())
    }

    /// True when the A/B experiment flag reads exactly "on".
    pub async fn ab_enabled(&self) -> Result<bool> {
        Ok(self.get(PREDICT_AB_FLAG).await?.as_deref() == Some("on"))
    }
}
