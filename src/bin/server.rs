use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use showdown_hub::auth::{JwtIdentityProvider, SharedIdentityProvider};
use showdown_hub::config::ServerConfig;
use showdown_hub::handlers::{routes, AppState};
use showdown_hub::storage::{MemoryRecordStore, PostgrestRecordStore, SharedRecordStore};

#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    // Load config from env
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, mailbox={}, burst={}, refill={:?}, body cap={}",
        config.host,
        config.port,
        config.mailbox_capacity,
        config.publish_burst,
        config.publish_refill_interval,
        config.max_body_bytes
    );

    let store: SharedRecordStore = match (
        config.record_store_url.as_deref(),
        config.record_store_service_key.as_deref(),
    ) {
        (Some(url), Some(key)) => match PostgrestRecordStore::new(url, key) {
            Ok(store) => {
                info!("Match results will be stored at {}", url);
                Arc::new(store)
            }
            Err(e) => {
                error!("Failed to create record store: {}", e);
                std::process::exit(1);
            }
        },
        _ => {
            warn!("No record store configured; match results are kept in memory only");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let identity: Option<SharedIdentityProvider> = config
        .jwt_secret
        .as_deref()
        .map(|secret| Arc::new(JwtIdentityProvider::new(secret)) as SharedIdentityProvider);
    if config.require_auth {
        info!("Bearer authentication required on mutating endpoints");
    }

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let tls = match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert), Some(key)) if config.enable_tls => Some((cert.clone(), key.clone())),
        _ => None,
    };

    let state = AppState::new(config, store, identity);
    let routes = routes(state);

    match tls {
        Some((cert, key)) => {
            info!("Starting Showdown hub on https://{}", addr);
            warp::serve(routes)
                .tls()
                .cert_path(cert)
                .key_path(key)
                .run(addr)
                .await;
        }
        None => {
            info!("Starting Showdown hub on http://{}", addr);
            warp::serve(routes).run(addr).await;
        }
    }
}
