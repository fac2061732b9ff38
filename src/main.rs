use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use food_delivery_api as api;
use api::{
    payments::{DisabledProcessor, PaymentProcessor, StripeClient},
    store::{DocumentStore, InMemoryStore, SqlDocumentStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);
    api::errors::set_expose_error_details(!cfg.is_production());

    // Init store
    let store: Arc<dyn DocumentStore> = if cfg.uses_sql_store() {
        let url = cfg
            .database_url
            .as_deref()
            .context("store_backend = \"sql\" requires database_url")?;
        Arc::new(
            SqlDocumentStore::connect(url)
                .await
                .context("failed to open document store")?,
        )
    } else {
        info!("Using in-memory document store; data is lost on restart");
        Arc::new(InMemoryStore::new())
    };

    // Payment processor
    let processor: Arc<dyn PaymentProcessor> = match cfg.stripe_secret_key.as_deref() {
        Some(key) if !key.trim().is_empty() => Arc::new(
            StripeClient::new(
                key,
                cfg.stripe_api_base.clone(),
                Duration::from_secs(cfg.processor_timeout_secs),
            )
            .context("failed to build payment processor client")?,
        ),
        _ => {
            warn!("No payment processor key configured; payment endpoints will fail");
            Arc::new(DisabledProcessor)
        }
    };
    if cfg.payment_webhook_secret.is_none() {
        warn!("payment_webhook_secret not set; payment webhooks will be rejected");
    }

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;

    let app_state = api::AppState::new(store, processor, cfg);
    let app = api::build_app(app_state);

    // Bind and serve
    info!("food-delivery-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
