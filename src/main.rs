use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use evently::api::{create_api_router, AppState};
use evently::config::Config;
use evently::events::{EventQueryEngine, EventService};
use evently::stats::{HttpStatsClient, LocalStatsClient, StatsClient};
use evently::stats_server::create_stats_router;
use evently::storage::{self, CachedEventStorage, EventStorage};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");
    let format = config.timestamp_format();

    let backends = storage::connect(&config.database).await?;
    info!("Database initialized successfully");

    let events: Arc<dyn EventStorage> = if config.cache.max_entries > 0 {
        info!(
            max_entries = config.cache.max_entries,
            ttl_secs = config.cache.ttl_secs,
            "Event read cache enabled"
        );
        Arc::new(CachedEventStorage::new(
            Arc::clone(&backends.events),
            config.cache.max_entries,
            config.cache.ttl_secs,
        ))
    } else {
        Arc::clone(&backends.events)
    };

    let stats: Arc<dyn StatsClient> = match &config.stats.server_url {
        Some(url) => {
            info!("Recording hits to remote stats server at {}", url);
            Arc::new(HttpStatsClient::new(url.clone(), format.clone())?)
        }
        None => {
            info!("Recording hits in-process");
            Arc::new(LocalStatsClient::new(
                Arc::clone(&backends.hits),
                format.clone(),
            ))
        }
    };

    let state = Arc::new(AppState {
        engine: EventQueryEngine::new(Arc::clone(&events), stats, config.stats.app_name.clone()),
        service: EventService::new(events, format.clone()),
        format: format.clone(),
        client_ip: config.client_ip.clone(),
    });

    let api_router = create_api_router(state);
    let stats_router = create_stats_router(Arc::clone(&backends.hits), format);

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("Failed to bind API server to {api_addr}"))?;
    info!("API server listening on http://{}", api_addr);

    let stats_addr = format!(
        "{}:{}",
        config.stats_server.host, config.stats_server.port
    );
    let stats_listener = tokio::net::TcpListener::bind(&stats_addr)
        .await
        .with_context(|| format!("Failed to bind stats server to {stats_addr}"))?;
    info!("Stats server listening on http://{}", stats_addr);

    tokio::try_join!(
        axum::serve(
            api_listener,
            api_router.into_make_service_with_connect_info::<SocketAddr>(),
        ),
        axum::serve(stats_listener, stats_router),
    )?;

    Ok(())
}
