use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Liveness: the process is up and serving HTTP.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": state.config.server.host,
            "port": state.config.server.port
        }
    }))
}

/// Readiness: vendor credentials are configured, plus relay counters.
pub async fn readiness_check(state: web::Data<AppState>) -> HttpResponse {
    let missing = state.config.missing_credentials();
    let metrics = state.metrics.snapshot();
    let ready = missing.is_empty();

    let body = json!({
        "status": if ready { "ready" } else { "not_ready" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "missing_credentials": missing,
        "models": {
            "inference": state.config.inference.model,
            "synthesis": state.config.synthesis.model,
            "voice": state.config.synthesis.voice
        },
        "metrics": metrics,
        "pipeline_error_rate": if metrics.pipelines_started > 0 {
            metrics.pipelines_failed as f64 / metrics.pipelines_started as f64
        } else {
            0.0
        }
    });

    if ready {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::session::mock::{self, MockModel};
    use actix_web::{test, App};
    use std::sync::Arc;

    fn state_with(config: AppConfig) -> AppState {
        AppState::with_pipeline(config, mock::pipeline_with_model(Arc::new(MockModel::replying("ok"))))
    }

    #[actix_web::test]
    async fn test_health_is_always_ok() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(AppConfig::default())))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"]["version"], env!("CARGO_PKG_VERSION"));
    }

    #[actix_web::test]
    async fn test_ready_reports_missing_credentials() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(AppConfig::default())))
                .route("/ready", web::get().to(readiness_check)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ready").to_request()).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["missing_credentials"].as_array().unwrap().len(), 3);
    }

    #[actix_web::test]
    async fn test_ready_with_credentials() {
        let mut config = AppConfig::default();
        config.transcription.api_key = "aai".to_string();
        config.inference.api_key = "gm".to_string();
        config.synthesis.api_key = "gm".to_string();
        let state = state_with(config);
        state.metrics.connection_opened();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/ready", web::get().to(readiness_check)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ready").to_request()).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["metrics"]["active_connections"], 1);
    }
}
