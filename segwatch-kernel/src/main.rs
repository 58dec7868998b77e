/**
 * SEGWATCH KERNEL - Point d'entrée du serveur HTTP
 *
 * RÔLE : charge .env + config YAML, initialise les logs, sert l'API.
 * UTILITÉ : source des snapshots ingérés par le collector.
 */

use anyhow::{Context, Result};
use segwatch_kernel::config::load_config;
use segwatch_kernel::http::{build_router, AppState};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;
    let bind = cfg.bind.clone();
    info!(
        inventory = %cfg.inventory_path.display(),
        store = %cfg.store_path.display(),
        "segwatch kernel starting"
    );

    // fabrique l'état unique pour Axum
    let app = build_router(AppState::new(cfg));

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("listening on http://{bind}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("HTTP server failed")?;

    info!("segwatch kernel stopped");
    Ok(())
}
