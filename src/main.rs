use anyhow::{Context, Result};
use log::{error, info, warn};
use std::env;
use std::sync::Arc;

use guardbot::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    info!("Starting GuardBot v{}", guardbot::VERSION);

    // =================================================================
    // CONFIGURATION
    // =================================================================

    let config_dir = env::var("GUARD_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config_manager = ConfigurationManager::new(&config_dir);
    config_manager
        .initialize()
        .await
        .with_context(|| format!("Failed to initialize configuration in {}", config_dir))?;
    let config = config_manager.get_bot_config().await;

    let store = JsonFileStore::new(&config.storage.database_path);
    info!("Chat database: {}", store.path().display());
    let store = SharedStore::new(Arc::new(store));

    // =================================================================
    // SESSION BRIDGE
    // =================================================================

    let mut connection = BridgeConnection::new(config.bridge.clone());
    connection
        .connect()
        .await
        .context("Failed to connect to the session bridge")?;
    let events = connection
        .get_event_receiver()
        .context("Bridge connected without an event stream")?;
    let transport: Arc<dyn Transport> = Arc::new(connection.clone());

    let bot = GuardBot::new(&config, transport, store).context("Failed to build the engine")?;
    info!(
        "GuardBot running on {} as {}",
        connection.platform_name(),
        connection.bot_id()
    );

    // =================================================================
    // EVENT LOOP WITH GRACEFUL SHUTDOWN
    // =================================================================

    tokio::select! {
        _ = bot.run(events) => {
            warn!("Bridge event stream ended");
        }
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown requested"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    }

    if let Err(e) = connection.disconnect().await {
        error!("Error while disconnecting: {}", e);
    }

    info!("GuardBot shutdown complete");
    Ok(())
}
