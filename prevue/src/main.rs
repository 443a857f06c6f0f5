mod migrations;
mod server;
mod supervisor;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use prevue_core::bootstrap::{init_database, init_services, load_config};
use prevue_core::logging;

use server::PrevueServer;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration (fatal on bad config)
    let config = load_config()?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Prevue server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Open the database
    let pool = init_database(&config).await?;

    // 4. Run migrations
    migrations::run_migrations(&pool).await?;

    // 5. Wire services
    let config = Arc::new(config);
    let services = init_services(pool, &config)?;

    // 6. Boot sequence: connect, sync, materialize defaults, extend schedules
    let supervisor = Arc::new(supervisor::Supervisor::new(&services));
    supervisor.boot().await;

    // 7. Background maintenance timers
    let timer_handles = supervisor.clone().start_timers();

    // 8. Serve HTTP until shutdown
    let server = PrevueServer::new(config, services);
    server.start().await?;

    // 9. Stop timers, let the pool close on drop
    for handle in timer_handles {
        handle.abort();
    }
    info!("Prevue stopped cleanly");
    Ok(())
}
