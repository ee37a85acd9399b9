use crate::core::AppError;
use crate::modules::gateways::services::PaymentRouter;
use crate::modules::transactions::services::{
    InitializePaymentRequest, PaymentService, RefundRequest,
};
use actix_web::{web, HttpResponse};
use std::sync::Arc;

/// POST /payment/initialize
pub async fn initialize_payment(
    service: web::Data<Arc<PaymentService>>,
    body: web::Json<InitializePaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let response = service.initialize_payment(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /payment/verify
///
/// Body is gateway-shaped (Razorpay handshake fields, PayU response form,
/// or a generic `transactionId`), so it is taken as raw JSON.
pub async fn verify_payment(
    service: web::Data<Arc<PaymentService>>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let response = service.verify_payment(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /payment/status/{transaction_id}
pub async fn payment_status(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let response = service.payment_status(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /payment/health
pub async fn payment_health(
    router: web::Data<Arc<PaymentRouter>>,
) -> Result<HttpResponse, AppError> {
    let health = router.fleet_health().await;
    Ok(HttpResponse::Ok().json(health))
}

/// POST /payment/refund/{transaction_id}. Body is optional; no body means a
/// full refund.
pub async fn refund_payment(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
    body: Option<web::Json<RefundRequest>>,
) -> Result<HttpResponse, AppError> {
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    let response = service.refund_payment(&path.into_inner(), request).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Payment lifecycle routes. Webhook routes live in the webhooks module.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payment")
            .route("/initialize", web::post().to(initialize_payment))
            .route("/verify", web::post().to(verify_payment))
            .route("/status/{transaction_id}", web::get().to(payment_status))
            .route("/health", web::get().to(payment_health))
            .route("/refund/{transaction_id}", web::post().to(refund_payment)),
    );
}
