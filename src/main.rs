mod config;
mod db;
mod frame;
mod routes;
mod services;
mod state;
mod throttle;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::services::persistence::{self, ElementRepository, PersistHandle};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Config::from_env().expect("invalid configuration");
    let port = config.port;
    let sweep_interval = config.sweep_interval;

    // Persistence is optional: without it the canvas runs memory-only.
    let (persist, stored) = match config.database_url.as_deref() {
        Some(url) => match persistence::connect_repository(url).await {
            Ok(repo) => {
                let repo: Arc<dyn ElementRepository> = Arc::new(repo);
                let stored = persistence::hydrate(repo.as_ref()).await;
                let (handle, _worker) = persistence::spawn_persistence_worker(repo);
                (Some(handle), stored)
            }
            Err(e) => {
                tracing::warn!(error = %e, "persistence unavailable; running memory-only");
                (None::<PersistHandle>, Vec::new())
            }
        },
        None => {
            tracing::info!("DATABASE_URL not set; running memory-only");
            (None, Vec::new())
        }
    };

    let state = state::AppState::new(config, persist);
    {
        let mut canvas = state.canvas.write().await;
        services::canvas::load(&mut canvas, stored);
    }

    let _sweeper = services::canvas::spawn_sweep_task(state.clone(), sweep_interval);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "sharedcanvas listening");
    axum::serve(listener, app).await.expect("server failed");
}
