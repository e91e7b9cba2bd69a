use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use wc24mail::config::{InboundConfig, StoreBackend};
use wc24mail::inbound::{DirectoryStore, InboundPipeline, ObjectStore, S3Store};
use wc24mail::mail::{DisabledRelay, Relay, SmtpRelay};
use wc24mail::{AppState, Config, Database, WebServer};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = wc24mail::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        wc24mail::logging::init_console_only(&config.logging.level);
    }

    info!("wc24mail - WiiConnect24 mail gateway");

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let db = match Database::open(&config.database.path, config.database.max_connections).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open database {}: {}", config.database.path, e);
            return ExitCode::FAILURE;
        }
    };

    let relay: Arc<dyn Relay> = if config.relay.enabled {
        match SmtpRelay::new(&config.relay) {
            Ok(relay) => {
                info!("Relaying Internet mail through {}:{}", config.relay.host, config.relay.port);
                Arc::new(relay)
            }
            Err(e) => {
                error!("Failed to set up SMTP relay: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        warn!("SMTP relay disabled, mail to Internet recipients will fail");
        Arc::new(DisabledRelay)
    };

    let state = AppState::new(db, &config, relay);

    if config.inbound.enabled {
        match open_inbound_store(&config.inbound).await {
            Ok(store) => {
                InboundPipeline::with_interval(
                    store,
                    state.ingestor.clone(),
                    config.inbound.interval_secs,
                )
                .spawn();
            }
            Err(e) => {
                warn!("Failed to open inbound store: {}. Inbound pipeline disabled.", e);
            }
        }
    }

    let server = match WebServer::new(&config.server, state) {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Web server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn open_inbound_store(config: &InboundConfig) -> wc24mail::Result<Arc<dyn ObjectStore>> {
    match config.backend {
        StoreBackend::Directory => {
            info!("Sweeping inbound mail from {}", config.store_path);
            Ok(Arc::new(DirectoryStore::new(&config.store_path, config.page_size)?))
        }
        StoreBackend::S3 => Ok(Arc::new(S3Store::connect(config).await?)),
    }
}
