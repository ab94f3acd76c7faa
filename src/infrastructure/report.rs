//! Batch prediction report rendering.
//!
//! Rendering is best-effort: a renderer failure must never discard the
//! predictions that were already computed, so callers log and move on.

use crate::application::use_cases::prediction_service::BatchPredictionItem;
use crate::domain::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::debug;

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Render the ordered result rows to a downloadable file and return its
    /// path.
    async fn render(&self, items: &[BatchPredictionItem]) -> Result<PathBuf>;
}

/// Plain-text renderer: one header, one block per result row.
pub struct TextReportRenderer {
    dir: PathBuf,
}

impl TextReportRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn render_body(items: &[BatchPredictionItem]) -> String {
        let mut body = String::new();
        body.push_str("Batch Prediction Report\n");
        let _ = writeln!(body, "{}", chrono::Utc::now().to_rfc3339());
        body.push('\n');
        for item in items {
            let variant = item
                .variant
                .map(|v| v.as_str().to_string())
                .unwrap_or_else(|| "Single".to_string());
            let _ = writeln!(
                body,
                "#{} — Variant: {} — Model: {} (#{})",
                item.id, variant, item.model_name, item.model_id
            );
            let _ = writeln!(
                body,
                "Pred: {} | Proba: {}",
                field_text(item.fields.get("pred")),
                proba_text(item.fields.get("proba"))
            );
            body.push_str("----\n");
        }
        body
    }
}

#[async_trait]
impl ReportRenderer for TextReportRenderer {
    async fn render(&self, items: &[BatchPredictionItem]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            AppError::IoError(format!(
                "Failed to create reports dir {}: {e}",
                self.dir.display()
            ))
        })?;

        let file_name = format!(
            "batch_pred_{}.txt",
            chrono::Utc::now().format("%Y%m%d_%H%M%S%3f")
        );
        let path = self.dir.join(file_name);
        let body = Self::render_body(items);

        tokio::fs::write(&path, body).await.map_err(|e| {
            AppError::IoError(format!(
                "Failed to write report {}: {e}",
                path.display()
            ))
        })?;

        debug!(path = %path.display(), rows = items.len(), "Rendered batch report");
        Ok(path)
    }
}

fn field_text(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

fn proba_text(value: Option<&JsonValue>) -> String {
    match value.and_then(JsonValue::as_f64) {
        Some(p) => format!("{:.3}", p),
        None => field_text(value),
    }
}
