use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use printpay::config::Config;
use printpay::core::CredentialVault;
use printpay::middleware::{RateLimiter, RequestId};
use printpay::modules::gateways::adapters::GatewayHttp;
use printpay::modules::gateways::repositories::SqlxGatewayRepository;
use printpay::modules::gateways::services::{PaymentRouter, RouterOptions, RoutingStrategy};
use printpay::modules::orders::repositories::SqlxOrderRepository;
use printpay::modules::orders::services::LoggingCompletionHook;
use printpay::modules::transactions::{PaymentService, SqlxTransactionRepository};
use printpay::modules::webhooks::{SqlxWebhookRepository, WebhookIngestor};
use printpay::modules::{transactions, webhooks};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "printpay=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Configuration validation failed");

    tracing::info!("Starting payment service");
    tracing::info!("Environment: {}", config.app.env);

    let db_pool = config
        .database
        .create_pool()
        .await
        .expect("Failed to create database pool");
    tracing::info!(
        "Database pool initialized ({} max connections)",
        config.database.max_connections
    );

    let vault = Arc::new(CredentialVault::from_env());
    let http = GatewayHttp::new().expect("Failed to build gateway HTTP client");

    let gateway_repo = Arc::new(SqlxGatewayRepository::new(db_pool.clone()));
    let order_repo = Arc::new(SqlxOrderRepository::new(db_pool.clone()));
    let transaction_repo = Arc::new(SqlxTransactionRepository::new(db_pool.clone()));
    let webhook_repo = Arc::new(SqlxWebhookRepository::new(db_pool));

    let strategy = RoutingStrategy::from_str(&config.routing.default_strategy)
        .expect("Routing strategy already validated");
    let router = Arc::new(PaymentRouter::new(
        gateway_repo,
        vault,
        http,
        RouterOptions {
            strategy,
            failure_rate_threshold: config.routing.failure_rate_threshold,
            health_min_attempts: config.routing.health_min_attempts,
            health_cooldown: chrono::Duration::seconds(config.routing.health_cooldown_secs),
        },
    ));
    match router.reload_providers().await {
        Ok(loaded) => tracing::info!(loaded, "Gateway adapters ready"),
        Err(err) => tracing::error!(error = %err, "Could not load gateway adapters at startup"),
    }

    let payment_service = Arc::new(PaymentService::new(
        order_repo,
        transaction_repo.clone(),
        router.clone(),
        Arc::new(LoggingCompletionHook),
        chrono::Duration::minutes(config.app.payment_expiry_minutes),
        config.app.public_base_url.clone(),
    ));
    let ingestor = Arc::new(WebhookIngestor::new(
        webhook_repo,
        transaction_repo,
        payment_service.clone(),
        router.clone(),
    ));

    // Sweep overdue checkout sessions once a minute so abandoned payments
    // free their orders without waiting for a status request.
    {
        let sweeper = payment_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                if let Err(err) = sweeper.expire_overdue_sessions().await {
                    tracing::warn!(error = %err, "Expiry sweep failed");
                }
            }
        });
    }

    let rate_limiter = RateLimiter::new(config.security.rate_limit_per_minute);
    let cors_origin = config.security.cors_allowed_origin.clone();
    let bind_address = config.server.bind_address();
    let workers = config.server.workers;

    let server = HttpServer::new(move || {
        let cors = match cors_origin.as_deref() {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allowed_methods(["GET", "POST"])
                .allow_any_header()
                .max_age(3600),
            None => Cors::permissive(),
        };

        App::new()
            .app_data(web::Data::new(router.clone()))
            .app_data(web::Data::new(payment_service.clone()))
            .app_data(web::Data::new(ingestor.clone()))
            // Registered inside-out: CORS wraps everything so preflights and
            // throttled responses both carry its headers.
            .wrap(rate_limiter.clone())
            .wrap(RequestId)
            .wrap(TracingLogger::default())
            .wrap(cors)
            // Webhook scope first: its /payment/webhook prefix must win over
            // the broader /payment scope.
            .configure(webhooks::controllers::configure)
            .configure(transactions::controllers::configure)
            .route("/health", web::get().to(health_check))
            .route("/", web::get().to(index))
    })
    .workers(workers)
    .bind(&bind_address)?
    .run();

    tracing::info!("Server started at http://{}", bind_address);

    server.await
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "printpay"
    }))
}

async fn index() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "service": "printpay",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
