//! Cross-exchange quote broker
//!
//! Loads the product catalog, connects Binance, Coinbase, Kraken and
//! Bitfinex, aggregates their quotes and serves arbitrage events over
//! WebSocket.

use anyhow::Context;
use quote_broker::core::{CryptoCompareCatalog, JsonFileCatalog, ProductRegistry};
use quote_broker::engine::AppEngine;
use quote_broker::infrastructure::{init_logging, start_server, MetricsCollector, Shutdown};
use quote_broker::ws::TungsteniteConnector;
use quote_broker::Config;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    let _guards = init_logging(&config.logging).context("initializing logging")?;
    tracing::info!("Starting quote broker...");

    let loaded = if config.catalog.remote {
        let catalog =
            CryptoCompareCatalog::new(&config.catalog.remote_url, config.exchanges.enabled());
        ProductRegistry::load(&catalog).await
    } else {
        let catalog = JsonFileCatalog::new(&config.catalog.products_path);
        ProductRegistry::load(&catalog).await
    };
    let registry = Arc::new(loaded.context("loading product catalog")?);

    let shutdown = Shutdown::new();
    let metrics = Arc::new(MetricsCollector::new());
    let engine = AppEngine::new(
        config.clone(),
        registry,
        TungsteniteConnector,
        metrics,
        shutdown.signal(),
    );
    let handle = engine.handle();

    let api_addr = config.api_addr();
    let api_signal = shutdown.signal();
    let api = tokio::spawn(async move {
        if let Err(e) = start_server(handle, &api_addr, api_signal).await {
            tracing::error!(target: "api", "API Server failed: {}", e);
        }
    });

    let mut engine_task = tokio::spawn(engine.run());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listening for ctrl-c")?;
            tracing::info!("Ctrl-C received, shutting down");
            shutdown.trigger();
            engine_task.await.context("engine task panicked")??;
        }
        result = &mut engine_task => {
            shutdown.trigger();
            result.context("engine task panicked")??;
        }
    }

    let _ = api.await;
    tracing::info!("Shutdown complete");
    Ok(())
}
