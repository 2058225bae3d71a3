mod aggregator;
mod api;
mod config;
mod detector;
mod dispatcher;
mod error;
mod models;
mod normalizer;
mod notifier;
mod orchestrator;
mod parser_client;
mod storage;
mod utils;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use config::Config;
use notifier::{NullNotifier, TelegramNotifier};
use parser_client::ParserClient;
use storage::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let config = Arc::new(Config::load()?);
    tracing::info!(
        listen_addr = %config.listen_addr,
        async_enabled = config.async_enabled.unwrap_or(config::DEFAULT_ASYNC_ENABLED),
        "starting odds-calculator"
    );

    let pool = storage::sqlite::create_pool().await?;
    storage::sqlite::init_schema(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let notifier: Arc<dyn notifier::Notifier> = match (&config.notifier_bot_token, &config.notifier_chat_id) {
        (Some(token), Some(chat_id)) => Arc::new(TelegramNotifier::new(token.clone(), chat_id.clone())),
        _ => {
            tracing::warn!("no notifier credentials configured, alerts will be logged only");
            Arc::new(NullNotifier)
        }
    };

    let (dispatcher_handle, dispatcher_join) = dispatcher::spawn(notifier, shutdown_rx.clone());

    let parser = config.parser_url.clone().map(|url| Arc::new(ParserClient::new(url)));
    let orchestrator_parser = parser.clone().unwrap_or_else(|| Arc::new(ParserClient::new(String::new())));

    let (orchestrator_handle, orchestrator_join) = orchestrator::spawn(
        config.clone(),
        orchestrator_parser,
        store.clone(),
        store.clone(),
        dispatcher_handle.clone(),
        shutdown_rx.clone(),
    );

    let app_state = api::AppState {
        config: config.clone(),
        parser,
        diff_storage: store.clone(),
        odds_storage: store.clone(),
        orchestrator: orchestrator_handle,
        shutdown: shutdown_rx,
    };

    let app = api::create_router().with_state(app_state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = orchestrator_join.await;
    let _ = dispatcher_join.await;
    Ok(())
}
