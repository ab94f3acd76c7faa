//! HTTP surface for the prediction service.
//!
//! Thin handlers over the application layer: every error is mapped to the
//! shared taxonomy and rendered as a `{"message": ...}` body with the
//! matching status code.

use crate::application::use_cases::prediction_service::{
    BatchPredictRequest, PredictRequest, PredictionService,
};
use crate::domain::error::AppError;
use crate::domain::variant::VariantSlot;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::repositories::{FeatureFlagRepository, PredictionModelRepository};
use actix_cors::Cors;
use actix_web::{dev::Server, get, post, web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::warn;

pub struct ApiState {
    pub predictor: PredictionService,
    pub models: PredictionModelRepository,
    pub flags: FeatureFlagRepository,
}

fn error_response(err: AppError) -> HttpResponse {
    let body = serde_json::json!({ "message": err.to_string() });
    match err {
        AppError::ValidationError(_) => HttpResponse::BadRequest().json(body),
        AppError::NotFound(_) => HttpResponse::NotFound().json(body),
        AppError::ScorerProcess(_) | AppError::ScorerParse(_) => {
            HttpResponse::BadGateway().json(body)
        }
        AppError::ScorerTimeout(_) => HttpResponse::GatewayTimeout().json(body),
        AppError::Internal(_)
        | AppError::ParseError(_)
        | AppError::DatabaseError(_)
        | AppError::IoError(_) => HttpResponse::InternalServerError().json(body),
    }
}

#[get("/api/status")]
async fn status() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

#[post("/api/predict")]
async fn predict(data: web::Data<ApiState>, req: web::Json<PredictRequest>) -> impl Responder {
    match data.predictor.predict_single(req.into_inner()).await {
        Ok(outcome) => HttpResponse::Ok().json(outcome),
        Err(e) => {
            warn!(error = %e, "Prediction failed");
            error_response(e)
        }
    }
}

#[post("/api/predict/batch")]
async fn predict_batch(
    data: web::Data<ApiState>,
    req: web::Json<BatchPredictRequest>,
) -> impl Responder {
    match data.predictor.predict_batch(req.into_inner()).await {
        Ok(outcome) => HttpResponse::Ok().json(outcome),
        Err(e) => {
            warn!(error = %e, "Batch prediction failed");
            error_response(e)
        }
    }
}

#[get("/api/models")]
async fn list_models(data: web::Data<ApiState>) -> impl Responder {
    match data.models.list_all().await {
        Ok(models) => HttpResponse::Ok().json(models),
        Err(e) => error_response(e),
    }
}

#[get("/api/models/active")]
async fn active_model(data: web::Data<ApiState>) -> impl Responder {
    match data.models.find_active_summary(VariantSlot::Single).await {
        Ok(Some(model)) => HttpResponse::Ok().json(model),
        Ok(None) => error_response(AppError::NotFound("No active model".to_string())),
        Err(e) => error_response(e),
    }
}

#[get("/api/models/active-ab")]
async fn active_ab_models(data: web::Data<ApiState>) -> impl Responder {
    let arm_a = match data.models.find_active_summary(VariantSlot::A).await {
        Ok(model) => model,
        Err(e) => return error_response(e),
    };
    let arm_b = match data.models.find_active_summary(VariantSlot::B).await {
        Ok(model) => model,
        Err(e) => return error_response(e),
    };
    if arm_a.is_none() && arm_b.is_none() {
        return error_response(AppError::NotFound("No A/B models active".to_string()));
    }
    HttpResponse::Ok().json(serde_json::json!({ "A": arm_a, "B": arm_b }))
}

#[derive(Debug, Default, Deserialize)]
pub struct PromoteRequest {
    pub variant: Option<String>,
}

#[post("/api/models/{id}/promote")]
async fn promote_model(
    data: web::Data<ApiState>,
    path: web::Path<i64>,
    req: web::Json<PromoteRequest>,
) -> impl Responder {
    let slot = match req.variant.as_deref() {
        None => VariantSlot::Single,
        Some("A") => VariantSlot::A,
        Some("B") => VariantSlot::B,
        Some(other) => {
            return error_response(AppError::ValidationError(format!(
                "Unknown variant: {}",
                other
            )))
        }
    };
    match data.models.promote(path.into_inner(), slot).await {
        Ok(model) => HttpResponse::Ok().json(serde_json::json!({
            "ok": true,
            "id": model.id,
            "status": model.status,
        })),
        Err(e) => {
            warn!(error = %e, "Promotion failed");
            error_response(e)
        }
    }
}

#[get("/api/flags")]
async fn list_flags(data: web::Data<ApiState>) -> impl Responder {
    match data.flags.list().await {
        Ok(flags) => {
            let mut map = serde_json::Map::new();
            for flag in flags {
                map.insert(
                    flag.key,
                    flag.value.map(JsonValue::String).unwrap_or(JsonValue::Null),
                );
            }
            HttpResponse::Ok().json(map)
        }
        Err(e) => error_response(e),
    }
}

#[get("/api/flags/{key}")]
async fn get_flag(data: web::Data<ApiState>, path: web::Path<String>) -> impl Responder {
    let key = path.into_inner();
    match data.flags.get(&key).await {
        Ok(value) => HttpResponse::Ok().json(serde_json::json!({ "key": key, "value": value })),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SetFlagRequest {
    pub value: JsonValue,
}

#[post("/api/flags/{key}")]
async fn set_flag(
    data: web::Data<ApiState>,
    path: web::Path<String>,
    req: web::Json<SetFlagRequest>,
) -> impl Responder {
    let key = path.into_inner();
    let value = match &req.value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    match data.flags.set(&key, &value).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "ok": true,
            "key": key,
            "value": value,
        })),
        Err(e) => error_response(e),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(status)
        .service(predict)
        .service(predict_batch)
        .service(list_models)
        .service(active_model)
        .service(active_ab_models)
        .service(promote_model)
        .service(list_flags)
        .service(get_flag)
        .service(set_flag);
}

pub fn start_http_server(
    state: web::Data<ApiState>,
    config: &AppConfig,
) -> std::io::Result<Server> {
    let allowed_origin = config.allowed_origin.clone();
    let server = HttpServer::new(move || {
        let cors = match &allowed_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header(),
            None => Cors::permissive(),
        };
        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run();
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ModelStatus;
    use crate::infrastructure::db::repositories::PredictionModelInput;
    use crate::infrastructure::db::ClinicalDb;
    use crate::infrastructure::model_store::ModelStore;
    use crate::infrastructure::report::TextReportRenderer;
    use crate::infrastructure::scorer::{PythonScorer, ScorerConfig};
    use actix_web::{test, App};
    use std::sync::Arc;
    use std::time::Duration;

    async fn test_state() -> web::Data<ApiState> {
        let db = ClinicalDb::connect_in_memory().await.unwrap();
        let tmp = std::env::temp_dir().join(format!("http_test_{}", uuid::Uuid::new_v4()));
        let scorer = Arc::new(PythonScorer::new(ScorerConfig {
            python_bin: "sh".to_string(),
            script: tmp.join("missing.sh"),
            timeout: Duration::from_secs(5),
            max_concurrent: 1,
        }));
        let renderer = Arc::new(TextReportRenderer::new(tmp.join("reports")));
        web::Data::new(ApiState {
            predictor: PredictionService::new(
                &db,
                ModelStore::new(tmp.join("models")),
                scorer,
                renderer,
            ),
            models: PredictionModelRepository::new(&db),
            flags: FeatureFlagRepository::new(&db),
        })
    }

    #[actix_web::test]
    async fn test_status_reports_ok() {
        let state = test_state().await;
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/status").to_request())
            .await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_predict_without_inputs_is_bad_request() {
        let state = test_state().await;
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/predict")
                .set_json(serde_json::json!({}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_promote_then_read_active() {
        let state = test_state().await;
        let model_id = state
            .models
            .insert(&PredictionModelInput {
                name: "rf_v1".to_string(),
                status: ModelStatus::Trained,
                performance: None,
                model_data: Some(vec![1]),
                parameters: None,
            })
            .await
            .unwrap();
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(configure),
        )
        .await;

        // No active model yet.
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/models/active").to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/models/{}/promote", model_id))
                .set_json(serde_json::json!({}))
                .to_request(),
        )
        .await;
        assert!(resp.status().is_success());
        let body: JsonValue = test::read_body_json(resp).await;
        assert_eq!(body["ok"], serde_json::json!(true));
        assert_eq!(body["status"], serde_json::json!("active"));

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/models/active").to_request(),
        )
        .await;
        assert!(resp.status().is_success());
        let body: JsonValue = test::read_body_json(resp).await;
        assert_eq!(body["id"], serde_json::json!(model_id));
    }

    #[actix_web::test]
    async fn test_promote_unknown_variant_is_bad_request() {
        let state = test_state().await;
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/models/1/promote")
                .set_json(serde_json::json!({ "variant": "C" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_flag_round_trip() {
        let state = test_state().await;
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/flags/predict_ab")
                .set_json(serde_json::json!({ "value": "on" }))
                .to_request(),
        )
        .await;
        assert!(resp.status().is_success());

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/flags/predict_ab").to_request(),
        )
        .await;
        let body: JsonValue = test::read_body_json(resp).await;
        assert_eq!(body["value"], serde_json::json!("on"));

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/flags").to_request(),
        )
        .await;
        let body: JsonValue = test::read_body_json(resp).await;
        assert_eq!(body["predict_ab"], serde_json::json!("on"));
    }

    #[actix_web::test]
    async fn test_unset_flag_reads_null() {
        let state = test_state().await;
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/flags/predict_ab").to_request(),
        )
        .await;
        let body: JsonValue = test::read_body_json(resp).await;
        assert_eq!(body["value"], JsonValue::Null);
    }
}
