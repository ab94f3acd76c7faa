use crate::domain::assessment::Assessment;
use crate::domain::error::{AppError, Result};
use sqlx::sqlite::SqlitePool;
use tracing::warn;

use super::super::connection::ClinicalDb;

#[derive(Clone)]
pub struct AssessmentRepository {
    pool: SqlitePool,
}

impl AssessmentRepository {
    pub fn new(db: &ClinicalDb) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<Assessment>> {
        let row = sqlx::query_as::<_, AssessmentEntity>(
            "SELECT id, patient_id, questionnaire_id, responses, risk_score \
             FROM assessments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch assessment: {e}")))?;

        row.map(TryInto::try_into).transpose()
    }

    /// Fetch assessments in the order requested. Unknown ids are skipped with
    /// a warning rather than failing the whole lookup.
    pub async fn list_by_ids(&self, ids: &[i64]) -> Result<Vec<Assessment>> {
        let mut found = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.get(id).await? {
                Some(assessment) => found.push(assessment),
                None => warn!(assessment_id = id, "Skipping unknown assessment in batch"),
            }
        }
        Ok(found)
    }
}

#[derive(sqlx::FromRow)]
struct AssessmentEntity {
    id: i64,
    patient_id: i64,
    questionnaire_id: i64,
    responses: Option<String>,
    risk_score: Option<f64>,
}

impl TryFrom<AssessmentEntity> for Assessment {
    type Error = AppError;

    fn try_from(entity: AssessmentEntity) -> Result<Self> {
        let responses = match entity.responses {
            Some(text) => Some(serde_json::from_str(&text).map_err(|e| {
                AppError::ParseError(format!("Malformed responses JSON: {e}"))
            })?),
            None => None,
        };
        Ok(Self {
            id: entity.id,
            patient_id: entity.patient_id,
            questionnaire_id: entity.questionnaire_id,
            responses,
            risk_score: entity.risk_score,
        })
    }
}
