//! OpenSASE Orders - order lifecycle and payment reconciliation service

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_orders::api::{self, AppState, TokenVerifier};
use opensase_orders::application::payments::PaymentGateway;
use opensase_orders::application::ports::Notifier;
use opensase_orders::application::{OrderService, WebhookReconciler};
use opensase_orders::config::Config;
use opensase_orders::infrastructure::notify::{LogNotifier, NatsNotifier};
use opensase_orders::infrastructure::paystack::PaystackGateway;
use opensase_orders::infrastructure::postgres::{PgCatalog, PgOrderRepository};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opensase_orders=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let notifier: Arc<dyn Notifier> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsNotifier::new(client, "orders")),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, order events will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let gateway: Arc<dyn PaymentGateway> = Arc::new(PaystackGateway::new(config.paystack())?);
    let service = Arc::new(OrderService::new(
        Arc::new(PgOrderRepository::new(db.clone())),
        Arc::new(PgCatalog::new(db)),
        gateway.clone(),
        notifier,
        config.order_settings(),
    ));
    let webhook = Arc::new(WebhookReconciler::new(config.paystack_secret_key.clone(), gateway, service.clone()));
    let state = AppState { service, webhook, tokens: Arc::new(TokenVerifier::new(&config.jwt_secret)) };

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(environment = %config.environment, "OpenSASE Orders listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, api::router(state)).await?;
    Ok(())
}
