use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;

use paylane::response::recover_payer_hint;
use paylane::{Error, PaymentRequirement, SettlementResult, VerificationResult};

use crate::metrics;
use crate::state::AppState;

/// Envelope for /verify and /settle requests.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub protocol_version: u32,
    pub payment_header: String,
    pub payment_requirement: PaymentRequirement,
}

/// Validate the HMAC header on an incoming request.
/// Authentication is always required — the secret is set at startup.
fn validate_hmac(
    req: &HttpRequest,
    body_bytes: &[u8],
    state: &AppState,
) -> Result<(), HttpResponse> {
    let header_value = req
        .headers()
        .get("X-Facilitator-Auth")
        .and_then(|v| v.to_str().ok());

    match header_value {
        Some(mac) => {
            if paylane::auth::verify_request_mac(&state.hmac_secret, body_bytes, mac) {
                Ok(())
            } else {
                tracing::warn!("HMAC verification failed — signature mismatch");
                metrics::HMAC_FAILURES.with_label_values(&["invalid"]).inc();
                Err(HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "authentication failed"
                })))
            }
        }
        None => {
            tracing::warn!("HMAC header missing on authenticated endpoint");
            metrics::HMAC_FAILURES.with_label_values(&["missing"]).inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication required"
            })))
        }
    }
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let report = state.facilitator.health().await;
    let degraded: Vec<&str> = report
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(ledger, _)| ledger.as_str())
        .collect();

    let ledgers: serde_json::Map<String, serde_json::Value> = report
        .iter()
        .map(|(ledger, ok)| {
            (
                ledger.clone(),
                serde_json::Value::String(if *ok { "ok" } else { "unreachable" }.to_string()),
            )
        })
        .collect();

    if degraded.is_empty() {
        HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "paylane-facilitator",
            "ledgers": ledgers,
        }))
    } else {
        HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "degraded",
            "service": "paylane-facilitator",
            "ledgers": ledgers,
        }))
    }
}

#[get("/discover")]
pub async fn discover(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "kinds": state.facilitator.registry().list(),
    }))
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| paylane::security::constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None => {
            // No token configured — metrics stay protected unless the
            // operator explicitly opts in to public access.
            let public_metrics = std::env::var("PAYLANE_PUBLIC_METRICS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false);
            if !public_metrics {
                return HttpResponse::Forbidden().json(serde_json::json!({
                    "error": "forbidden",
                    "message": "Set METRICS_TOKEN or PAYLANE_PUBLIC_METRICS=true to access /metrics"
                }));
            }
        }
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

#[post("/verify")]
pub async fn verify(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    if let Err(resp) = validate_hmac(&req, &body, &state) {
        return resp;
    }

    let parsed: PaymentRequest = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(_) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "isValid": false,
                "payer": "unknown",
                "invalidReason": "invalid request body",
            }));
        }
    };

    match state
        .facilitator
        .verify(&parsed.payment_header, &parsed.payment_requirement)
        .await
    {
        Ok(result) => {
            let label = if result.is_valid { "valid" } else { "invalid" };
            metrics::VERIFY_REQUESTS.with_label_values(&[label]).inc();
            if !result.is_valid {
                tracing::info!(
                    payer = %result.payer,
                    reason = result.invalid_reason.as_deref().unwrap_or("unknown"),
                    "verification rejected"
                );
            }
            HttpResponse::Ok().json(result)
        }
        Err(Error::Decode(e)) => {
            metrics::VERIFY_REQUESTS.with_label_values(&["error"]).inc();
            tracing::warn!(error = %e, "verification failed: undecodable header");
            let (payer, _ledger) = recover_payer_hint(&parsed.payment_header);
            HttpResponse::InternalServerError().json(VerificationResult {
                is_valid: false,
                payer,
                invalid_reason: Some("malformed payment header".to_string()),
            })
        }
        Err(e) => {
            metrics::VERIFY_REQUESTS.with_label_values(&["error"]).inc();
            tracing::error!(error = %e, "verification internal error");
            HttpResponse::InternalServerError().json(VerificationResult {
                is_valid: false,
                payer: paylane::Identity::unknown(),
                invalid_reason: Some("verification failed".to_string()),
            })
        }
    }
}

#[post("/settle")]
pub async fn settle(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    if let Err(resp) = validate_hmac(&req, &body, &state) {
        return resp;
    }

    let parsed: PaymentRequest = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(_) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "success": false,
                "payer": "unknown",
                "transactionRef": "",
                "ledger": "unknown",
                "errorReason": "invalid request body",
            }));
        }
    };

    let start = std::time::Instant::now();

    match state
        .facilitator
        .settle(&parsed.payment_header, &parsed.payment_requirement)
        .await
    {
        Ok(result) => {
            let elapsed = start.elapsed().as_secs_f64();
            let label = if result.success { "success" } else { "rejected" };
            metrics::SETTLE_REQUESTS.with_label_values(&[label]).inc();
            metrics::SETTLE_LATENCY
                .with_label_values(&[label])
                .observe(elapsed);

            if result.success {
                tracing::info!(
                    payer = %result.payer,
                    tx = %result.transaction_ref,
                    ledger = %result.ledger,
                    "settlement completed"
                );
            } else {
                tracing::warn!(
                    payer = %result.payer,
                    reason = result.error_reason.as_deref().unwrap_or("unknown"),
                    "settlement rejected"
                );
            }
            HttpResponse::Ok().json(result)
        }
        Err(Error::Decode(e)) => {
            metrics::SETTLE_REQUESTS.with_label_values(&["error"]).inc();
            tracing::warn!(error = %e, "settlement failed: undecodable header");
            let (payer, ledger) = recover_payer_hint(&parsed.payment_header);
            HttpResponse::InternalServerError().json(SettlementResult {
                success: false,
                payer,
                transaction_ref: String::new(),
                ledger,
                error_reason: Some("malformed payment header".to_string()),
            })
        }
        Err(e) => {
            metrics::SETTLE_REQUESTS.with_label_values(&["error"]).inc();
            metrics::SETTLE_LATENCY
                .with_label_values(&["error"])
                .observe(start.elapsed().as_secs_f64());
            tracing::error!(error = %e, "settlement internal error");
            let (payer, ledger) = recover_payer_hint(&parsed.payment_header);
            HttpResponse::InternalServerError().json(SettlementResult {
                success: false,
                payer,
                transaction_ref: String::new(),
                ledger,
                error_reason: Some("settlement failed".to_string()),
            })
        }
    }
}
