use std::env;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use purser_backend::config::AppPaths;
use purser_backend::logging;
use purser_backend::server::router::router;
use purser_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let state = AppState::initialize(paths).await?;

    match state.config.settings() {
        Ok(settings) => match state.providers.get_or_build(&settings.generation).await {
            Ok(provider) => {
                if !provider.health_check().await.unwrap_or(false) {
                    tracing::warn!(
                        "Generation backend is not reachable. Chat requests will fail until it is."
                    );
                }
            }
            Err(err) => tracing::warn!("Generation backend not ready: {}", err),
        },
        Err(err) => tracing::warn!("Could not load settings for startup probe: {}", err),
    }

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or_else(|| {
            state
                .config
                .settings()
                .map(|settings| settings.server.port)
                .unwrap_or(0)
        });
    let bind_addr = format!("127.0.0.1:{}", port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("PURSER_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
