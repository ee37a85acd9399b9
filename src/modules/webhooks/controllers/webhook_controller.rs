use crate::core::AppError;
use crate::modules::webhooks::services::{WebhookDelivery, WebhookIngestor};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// POST /payment/webhook
///
/// Takes the body as raw bytes: signature schemes hash the exact wire bytes,
/// and any JSON round trip would change them. Always answers 200 once the
/// delivery is in the audit log.
pub async fn receive_webhook(
    req: HttpRequest,
    body: web::Bytes,
    ingestor: web::Data<Arc<WebhookIngestor>>,
) -> Result<HttpResponse, AppError> {
    let raw_body = String::from_utf8_lossy(&body).into_owned();
    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let source_ip = req
        .connection_info()
        .realip_remote_addr()
        .map(String::from);

    let outcome = ingestor
        .process(WebhookDelivery {
            raw_body,
            headers,
            source_ip,
        })
        .await?;

    Ok(HttpResponse::Ok().json(outcome.http_body()))
}

#[derive(Debug, Deserialize)]
pub struct FailedQuery {
    limit: Option<i64>,
}

/// GET /payment/webhook/failed
pub async fn list_failed_webhooks(
    query: web::Query<FailedQuery>,
    ingestor: web::Data<Arc<WebhookIngestor>>,
) -> Result<HttpResponse, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let records = ingestor.failed_for_retry(limit).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "count": records.len(),
        "webhooks": records,
    })))
}

/// Webhook routes. Registered before the payment scope so the longer
/// `/payment/webhook` prefix matches first.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payment/webhook")
            .route("", web::post().to(receive_webhook))
            .route("/failed", web::get().to(list_failed_webhooks)),
    );
}
