use anyhow::Result;
use detection_store::DetectionStore;
use query_api::{create_router, AppState, QueryApiConfig};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = QueryApiConfig::from_env()?;
    telemetry::init("query-api", &config.log_level);

    info!(
        bind = %config.bind_addr,
        database = %config.database_url,
        media_root = %config.foscam_root.display(),
        "starting query api"
    );

    let store = DetectionStore::connect(&config.database_url).await?;
    let app = create_router(AppState {
        store,
        media_root: config.foscam_root.clone(),
    });

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("query api listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("query api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => info!("received Ctrl+C signal"),
        _ = terminate => info!("received terminate signal"),
    }
}
