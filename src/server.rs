use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::models::{Order, Partner};
use crate::queue::{CancelOutcome, EnqueueError, QueueProcessor};
use crate::routing::RoutingService;

// ============================================================================
// HTTP Surface
// ============================================================================
//
// Thin ingress and observability layer. POST /orders validates and
// enqueues, everything else is read-only monitoring. Errors come back as
// `{"error": "..."}` bodies so callers degrade without parsing panics.
//
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<QueueProcessor>,
    pub routing: Arc<RoutingService>,
    pub metrics: Arc<Metrics>,
}

pub async fn run(state: AppState, port: u16) -> std::io::Result<()> {
    tracing::info!(port, "🌐 HTTP surface listening");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders", web::post().to(enqueue_order))
        .route("/orders/{id}", web::get().to(job_details))
        .route("/orders/{id}", web::delete().to(cancel_job))
        .route("/stats", web::get().to(queue_stats))
        .route("/volumes", web::get().to(partner_volumes))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_exposition));
}

fn error_body(err: impl std::fmt::Display) -> serde_json::Value {
    serde_json::json!({ "error": err.to_string() })
}

fn job_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "error": "Job not found" }))
}

async fn enqueue_order(state: web::Data<AppState>, order: web::Json<Order>) -> impl Responder {
    match state.processor.add_order(order.into_inner()) {
        Ok(job_id) => HttpResponse::Accepted().json(serde_json::json!({ "job_id": job_id })),
        Err(EnqueueError::Invalid(err)) => HttpResponse::BadRequest().json(error_body(err)),
        Err(EnqueueError::Queue(err)) => HttpResponse::InternalServerError().json(error_body(err)),
    }
}

async fn job_details(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let Ok(job_id) = Uuid::parse_str(&path.into_inner()) else {
        return job_not_found();
    };

    match state.processor.job_details(job_id) {
        Ok(Some(details)) => HttpResponse::Ok().json(details),
        Ok(None) => job_not_found(),
        Err(err) => HttpResponse::InternalServerError().json(error_body(err)),
    }
}

async fn cancel_job(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let Ok(job_id) = Uuid::parse_str(&path.into_inner()) else {
        return job_not_found();
    };

    match state.processor.remove_waiting_job(job_id) {
        Ok(CancelOutcome::Removed) => {
            HttpResponse::Ok().json(serde_json::json!({ "removed": true }))
        }
        Ok(CancelOutcome::NotFound) => job_not_found(),
        Ok(CancelOutcome::NotCancellable(status)) => HttpResponse::Conflict()
            .json(error_body(format!("job is already {}", status))),
        Err(err) => HttpResponse::InternalServerError().json(error_body(err)),
    }
}

async fn queue_stats(state: web::Data<AppState>) -> impl Responder {
    match state.processor.queue_stats() {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(err) => HttpResponse::InternalServerError().json(error_body(err)),
    }
}

async fn partner_volumes(state: web::Data<AppState>) -> impl Responder {
    let mut volumes = Vec::with_capacity(Partner::ALL.len());
    for partner in Partner::ALL {
        volumes.push(serde_json::json!({
            "partner": partner.as_str(),
            "volume": state.routing.current_volume(partner).await,
            "cap": state.routing.cap_for(partner).to_string(),
        }));
    }
    HttpResponse::Ok().json(volumes)
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "fulfillment-router"
    }))
}

async fn metrics_exposition(state: web::Data<AppState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    match encoder.encode(&families, &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(err) => HttpResponse::InternalServerError().json(error_body(err)),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::HttpDispatcher;
    use crate::models::{PartnerMap, VolumeCap};
    use crate::routing::RoutingTables;
    use crate::utils::{BackoffPolicy, BreakerConfig};
    use crate::volume::InMemoryVolumeStore;
    use actix_web::{http::StatusCode, test};
    use std::time::Duration;

    fn state() -> AppState {
        let metrics = Arc::new(Metrics::new().unwrap());
        let routing = Arc::new(RoutingService::new(
            RoutingTables {
                us_skus: ["US-STARTER-001"].iter().map(|s| s.to_string()).collect(),
                refill_skus: ["REFILL-001"].iter().map(|s| s.to_string()).collect(),
            },
            PartnerMap {
                f1: VolumeCap::Unlimited,
                f2: VolumeCap::Limited(100),
                f3: VolumeCap::Limited(50),
                f_us: VolumeCap::Unlimited,
            },
            Arc::new(InMemoryVolumeStore::default()),
            metrics.clone(),
        ));
        // Workers are never started in these tests, so the dispatcher is
        // wired but idle.
        let dispatcher = Arc::new(
            HttpDispatcher::new(
                PartnerMap::from_fn(|p| {
                    format!("http://127.0.0.1:9/partner-{}", p.as_str().to_lowercase())
                }),
                Duration::from_millis(100),
                BreakerConfig::default(),
                metrics.clone(),
            )
            .unwrap(),
        );
        let processor = QueueProcessor::new(
            routing.clone(),
            dispatcher,
            metrics.clone(),
            3,
            BackoffPolicy::default(),
        );
        AppState {
            processor,
            routing,
            metrics,
        }
    }

    #[actix_web::test]
    async fn test_enqueue_order_returns_job_id() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/orders")
            .set_json(serde_json::json!({
                "order_number": "WEB-001",
                "presentment_currency": "GBP",
                "line_items": [{ "sku": "STARTER-001", "quantity": 1 }]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["job_id"].is_string());
    }

    #[actix_web::test]
    async fn test_enqueue_rejects_empty_order() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/orders")
            .set_json(serde_json::json!({
                "order_number": "WEB-002",
                "presentment_currency": "GBP",
                "line_items": []
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("line items"));
    }

    #[actix_web::test]
    async fn test_unknown_job_is_not_found() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(routes),
        )
        .await;

        for uri in ["/orders/no-such-job", "/orders/6f0f9c4e-0000-0000-0000-000000000000"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);

            let body: serde_json::Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "Job not found");
        }
    }

    #[actix_web::test]
    async fn test_stats_reflect_enqueued_jobs() {
        let state = state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/orders")
            .set_json(serde_json::json!({
                "order_number": "WEB-003",
                "presentment_currency": "EUR",
                "line_items": [{ "sku": "SOAP-004", "quantity": 2 }]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let req = test::TestRequest::get().uri("/stats").to_request();
        let stats: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats["waiting"], 1);
        assert_eq!(stats["total"], 1);
    }

    #[actix_web::test]
    async fn test_health_and_metrics_respond() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("orders_enqueued_total"));
    }

    #[actix_web::test]
    async fn test_volumes_list_all_partners() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/volumes").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let volumes = body.as_array().unwrap();
        assert_eq!(volumes.len(), 4);
        assert!(volumes.iter().any(|v| v["partner"] == "F-US"));
        assert!(volumes.iter().any(|v| v["cap"] == "unlimited"));
    }
}
