use std::num::NonZeroU32;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use anyhow::Context;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use enrollment_core::config::{Config, LogFormat, ServerConfig, StorageBackend};
use enrollment_core::middleware::{ErrorLogger, RateLimiter, RequestId};
use enrollment_core::modules::enrollment::{
    EnrollmentStore, InMemoryEnrollmentStore, MySqlEnrollmentStore,
};
use enrollment_core::modules::gateways::{PaymentGateway, PaystackClient};
use enrollment_core::modules::payments::PricingRules;
use enrollment_core::{configure_enrollment, configure_public, AppState, API_PREFIX};

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "enrollment_core={},actix_web=info",
            config.app.log_level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    match config.app.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn EnrollmentStore>> {
    match (config.storage, &config.database) {
        (StorageBackend::MySql, Some(database)) => {
            let pool = database
                .create_pool()
                .await
                .context("Failed to create database pool")?;

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;

            tracing::info!(
                max_connections = database.max_connections,
                "Database pool initialized"
            );
            Ok(Arc::new(MySqlEnrollmentStore::new(pool)))
        }
        (StorageBackend::MySql, None) => anyhow::bail!("MySQL storage selected without DATABASE_URL"),
        (StorageBackend::Memory, _) => {
            tracing::warn!("Using in-memory store; records are lost on restart");
            Ok(Arc::new(InMemoryEnrollmentStore::new()))
        }
    }
}

fn cors(server: &ServerConfig) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec![
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-actor-id"),
            header::HeaderName::from_static("x-actor-role"),
            header::HeaderName::from_static("x-request-id"),
        ])
        .max_age(3600);

    match &server.cors_allowed_origin {
        Some(origin) => cors.allowed_origin(origin),
        None => cors,
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config);

    tracing::info!(
        env = %config.app.env,
        storage = ?config.storage,
        bind = %config.server.bind_address(),
        "Starting enrollment service"
    );

    let pricing = PricingRules::from_file(&config.enrollment.pricing_rules_path)
        .context("Failed to load pricing rules")?;
    tracing::info!(
        base = %pricing.currency.format_minor(pricing.base_amount_minor),
        discounts = pricing.discounts.len(),
        "Pricing rules loaded"
    );

    let store = build_store(&config).await?;
    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        PaystackClient::new(config.paystack.client_config())
            .context("Failed to configure payment gateway")?,
    );

    let state = AppState::new(store, gateway, pricing, &config.enrollment)
        .context("Failed to build application state")?;

    let rate_limit = NonZeroU32::new(config.security.rate_limit_per_minute)
        .context("RATE_LIMIT_PER_MINUTE must be greater than 0")?;
    let limiter = RateLimiter::per_minute(rate_limit);

    let server_config = config.server.clone();
    let bind_address = server_config.bind_address();

    HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(ErrorLogger)
            .wrap(cors(&server_config))
            .wrap(TracingLogger::default())
            .wrap(RequestId)
            .configure(|cfg| state.register(cfg))
            .service(
                web::scope(API_PREFIX)
                    .wrap(limiter.clone())
                    .configure(configure_enrollment),
            )
            .configure(configure_public)
    })
    .workers(config.server.workers)
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await
    .context("Server error")?;

    Ok(())
}
