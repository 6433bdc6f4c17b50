//! Ticket-stock service.
//!
//! Consumes paid orders from Redpanda, acquires ticket stock in `PostgreSQL`
//! and publishes every acquired ticket.

use std::sync::Arc;
use ticket_stock::{
    AcquisitionConfig, AcquisitionService, CatalogQueries, Config, EventConsumer, OrderPaidHandler,
};
use ticket_stock_core::environment::SystemClock;
use ticket_stock_core::event_bus::EventBus;
use ticket_stock_core::store::CatalogReader;
use ticket_stock_postgres::PostgresStore;
use ticket_stock_redpanda::RedpandaEventBus;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        redpanda_brokers = %config.redpanda.brokers,
        order_paid_topic = %config.redpanda.order_paid_topic,
        acquired_ticket_topic = %config.redpanda.acquired_ticket_topic,
        capacity_policy = ?config.acquisition.capacity_policy,
        "Starting ticket-stock service"
    );
    ticket_stock_runtime::metrics::describe_metrics();

    info!("Connecting to database...");
    let store = PostgresStore::connect(
        &config.postgres.url,
        config.postgres.max_connections,
        std::time::Duration::from_secs(config.postgres.acquire_timeout),
    )
    .await?;
    if config.postgres.run_migrations {
        store.migrate().await?;
        info!("Migrations applied");
    }
    let store = Arc::new(store);

    // Catalog reachability check, bounded by the catalog read deadline
    let reader: Arc<dyn CatalogReader> = store.clone();
    let catalog = CatalogQueries::new(reader, config.catalog_timeout());
    match catalog.get_many_events(1, 1).await {
        Ok(page) => info!(events = page.total, "Catalog reachable"),
        Err(e) => warn!(error = %e, "Catalog read failed at startup"),
    }

    info!("Connecting to Redpanda event bus...");
    let event_bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.consumer_group)
            .auto_offset_reset(&config.redpanda.auto_offset_reset)
            .producer_acks(&config.redpanda.producer_acks)
            .nack_backoff(config.nack_backoff())
            .build()?,
    );

    let service = AcquisitionService::new(
        store,
        Arc::clone(&event_bus),
        Arc::new(SystemClock),
        AcquisitionConfig {
            timeout: config.acquisition_timeout(),
            capacity_policy: config.acquisition.capacity_policy,
            acquired_ticket_topic: config.redpanda.acquired_ticket_topic.clone(),
        },
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = EventConsumer::new(
        "order-paid",
        vec![config.redpanda.order_paid_topic.clone()],
        event_bus,
        Arc::new(OrderPaidHandler::new(service)),
        shutdown_rx,
    )
    .with_retry_delay(config.consumer_retry_delay());
    let handle = consumer.spawn();
    info!("Order-paid intake started");

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    if tokio::time::timeout(config.shutdown_timeout(), handle).await.is_err() {
        warn!(
            timeout = ?config.shutdown_timeout(),
            "Intake did not stop in time; unsettled deliveries stay uncommitted"
        );
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
