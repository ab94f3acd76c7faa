use crate::application::PredictionService;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::repositories::{FeatureFlagRepository, PredictionModelRepository};
use crate::infrastructure::db::ClinicalDb;
use crate::infrastructure::model_store::ModelStore;
use crate::infrastructure::report::TextReportRenderer;
use crate::infrastructure::scorer::{PythonScorer, ScorerConfig};
use crate::interfaces::http::{start_http_server, ApiState};
use actix_web::web;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let config = AppConfig::load()?;

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::IoError(format!(
                "Failed to create data dir {}: {e}",
                parent.display()
            ))
        })?;
    }
    let db = ClinicalDb::connect(&config.database_path).await?;

    let store = ModelStore::new(&config.models_dir);
    store.ensure()?;

    let scorer = Arc::new(PythonScorer::new(ScorerConfig {
        python_bin: config.python_bin.clone(),
        script: config.predict_script.clone(),
        timeout: Duration::from_secs(config.scorer_timeout_secs),
        max_concurrent: config.max_concurrent_scorers,
    }));
    let renderer = Arc::new(TextReportRenderer::new(&config.reports_dir));

    let state = web::Data::new(ApiState {
        predictor: PredictionService::new(&db, store, scorer, renderer),
        models: PredictionModelRepository::new(&db),
        flags: FeatureFlagRepository::new(&db),
    });

    info!(
        addr = %format!("{}:{}", config.bind_addr, config.port),
        "Starting CLBP prediction service"
    );

    let server = start_http_server(state, &config)
        .map_err(|e| AppError::IoError(format!("Failed to bind HTTP server: {e}")))?;
    server
        .await
        .map_err(|e| AppError::IoError(format!("HTTP server failed: {e}")))?;

    Ok(())
}
