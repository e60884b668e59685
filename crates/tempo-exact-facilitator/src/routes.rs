use actix_web::http::StatusCode;
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use x402::{PaymentPayload, PaymentRequirements, SchemeFacilitator, X402Error};

use crate::metrics;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Uniform JSON error body.
fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "error": error,
        "message": message.into(),
        "statusCode": status.as_u16(),
    }))
}

/// Fault details only leave the process in development.
fn internal_error(state: &AppState, err: &X402Error) -> HttpResponse {
    let message = if state.environment.is_development() {
        err.to_string()
    } else {
        "An unexpected error occurred".to_string()
    };
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error",
        message,
    )
}

fn parse_request(body: &[u8]) -> Result<PaymentRequest, HttpResponse> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "rejected request body");
        error_response(StatusCode::BAD_REQUEST, "Validation Error", e.to_string())
    })
}

/// Register every endpoint. Pair with [`not_found`] as the default service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(supported)
        .service(verify)
        .service(settle)
        .service(metrics_endpoint);
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let network = &state.facilitator.config().network;
    match state.facilitator.health_check().await {
        Ok(block) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
            "network": network,
            "latestBlock": block.to_string(),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "degraded",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "version": env!("CARGO_PKG_VERSION"),
                "network": network,
                "error": "RPC unreachable",
            }))
        }
    }
}

#[get("/supported")]
pub async fn supported(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.facilitator.supported())
}

#[post("/verify")]
pub async fn verify(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(resp) => return resp,
    };

    match state
        .facilitator
        .verify(&request.payment_payload, &request.payment_requirements)
        .await
    {
        Ok(result) => {
            if result.is_valid {
                metrics::VERIFY_REQUESTS.with_label_values(&["valid"]).inc();
            } else {
                metrics::VERIFY_REQUESTS.with_label_values(&["invalid"]).inc();
                if let Some(kind) = result.invalid_kind {
                    let label = serde_json::to_value(kind)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default();
                    metrics::VERIFY_REJECTIONS.with_label_values(&[label.as_str()]).inc();
                }
            }
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            metrics::VERIFY_REQUESTS.with_label_values(&["error"]).inc();
            tracing::error!(error = %e, "verification internal error");
            internal_error(&state, &e)
        }
    }
}

#[post("/settle")]
pub async fn settle(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(resp) => return resp,
    };

    let start = std::time::Instant::now();

    match state
        .facilitator
        .settle(&request.payment_payload, &request.payment_requirements)
        .await
    {
        Ok(result) => {
            let elapsed = start.elapsed().as_secs_f64();
            let label = if result.success { "success" } else { "rejected" };
            metrics::SETTLE_REQUESTS.with_label_values(&[label]).inc();
            metrics::SETTLE_LATENCY
                .with_label_values(&[label])
                .observe(elapsed);
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            let elapsed = start.elapsed().as_secs_f64();
            metrics::SETTLE_REQUESTS.with_label_values(&["error"]).inc();
            metrics::SETTLE_LATENCY
                .with_label_values(&["error"])
                .observe(elapsed);
            tracing::error!(error = %e, "settlement internal error");
            internal_error(&state, &e)
        }
    }
}

#[get("/metrics")]
pub async fn metrics_endpoint() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

/// Default service for unmatched routes.
pub async fn not_found(req: HttpRequest) -> HttpResponse {
    error_response(
        StatusCode::NOT_FOUND,
        "Not Found",
        format!("Route {} {} not found", req.method(), req.path()),
    )
}
