mod error;
mod handlers;
mod probe;
mod state;

use anyhow::{Context, Result};
use common::{JobManager, ServiceConfig};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("server=debug,common=debug,tower_http=info")),
        )
        .init();

    let config = ServiceConfig::from_env();
    config.storage.ensure()?;

    let manager = JobManager::from_config(&config);
    info!(
        "base {} · generador {} · timeout {:?} · máx. {} generaciones simultáneas",
        config.storage.base_dir().display(),
        config.generator.program,
        config.generator.timeout,
        config.max_concurrent_generations
    );

    // router HTTP
    let app = handlers::build_router(AppState::new(manager));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("no se pudo abrir {}", config.bind_addr))?;
    info!("servidor escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
