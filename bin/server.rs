// Finance Ledger - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use finance_ledger::api::{router, AppState};
use finance_ledger::logging::init_tracing;
use finance_ledger::{open_database, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from_env()?;
    init_tracing(&config.log_filter);

    let conn = open_database(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;

    let bind_addr = config.bind_addr.clone();
    tracing::info!(
        db = %config.db_path.display(),
        version = finance_ledger::VERSION,
        "database ready"
    );

    let app = router(AppState::new(conn, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    tracing::info!(addr = %bind_addr, "server listening");
    println!("🚀 Finance Ledger API running on http://{}", bind_addr);
    println!("📊 Health check: http://{}/api/health", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
