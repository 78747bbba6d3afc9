mod api;
mod middleware;

use std::sync::Arc;

use pulsewatch_client::CommentApiClient;
use pulsewatch_core::SentimentScorer;
use pulsewatch_db::PgStore;
use pulsewatch_monitor::{Monitor, MonitorConfig};
use pulsewatch_sentiment::LexiconScorer;
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(pulsewatch_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = pulsewatch_db::PoolConfig::from_app_config(&config);
    let pool = pulsewatch_db::connect_pool(&config.database_url, pool_config).await?;
    pulsewatch_db::run_migrations(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let client = Arc::new(CommentApiClient::new(
        &config.upstream_base_url,
        config.upstream_api_key.as_deref(),
        config.http_timeout_secs,
        &config.http_user_agent,
    )?);
    let scorer: Arc<dyn SentimentScorer> = Arc::new(LexiconScorer);
    let monitor = Monitor::new(
        client,
        Arc::clone(&store),
        scorer,
        MonitorConfig::from_app_config(&config),
    );
    monitor.watch_all(&config.watch_resources);

    let app = build_app(AppState {
        store,
        monitor: monitor.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
