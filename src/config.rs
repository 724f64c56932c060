//! Server configuration module
//! Handles runtime parameters for the hub, its HTTP side channel and collaborators

use crate::constants::{
    DEFAULT_HOST, DEFAULT_MAILBOX_CAPACITY, DEFAULT_MATCH_SETTLE_SECS, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_PORT, DEFAULT_PUBLISH_BURST, DEFAULT_PUBLISH_REFILL_MS, DEFAULT_PUBLISH_WAIT_SECS,
    DEFAULT_SYSTEM_OWNER_ID, DEFAULT_WRITE_TIMEOUT_SECS,
};
use crate::error::{HubError, Result};
use std::env;
use std::time::Duration;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Outbound envelopes buffered per subscriber before it counts as slow
    pub mailbox_capacity: usize,
    /// Token bucket capacity shared by every publish
    pub publish_burst: u32,
    /// Time to refill one publish token
    pub publish_refill_interval: Duration,
    /// Upper bound a side-channel publish waits for a token
    pub publish_wait_timeout: Duration,
    /// Bound on a single write to a subscriber's connection
    pub write_timeout: Duration,
    /// Body cap for side-channel requests
    pub max_body_bytes: u64,
    /// Delay before matched players count as returned to the pool
    pub match_settle_delay: Duration,
    /// Record store base URL (in-memory store when absent)
    pub record_store_url: Option<String>,
    /// Elevated key used for system writes to the record store
    pub record_store_service_key: Option<String>,
    /// Owner identity stamped on system-written records
    pub system_owner_id: String,
    /// HS256 secret for bearer credentials
    pub jwt_secret: Option<String>,
    /// Require a bearer credential on mutating side-channel endpoints
    pub require_auth: bool,
    /// TLS configuration
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub enable_tls: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            publish_burst: DEFAULT_PUBLISH_BURST,
            publish_refill_interval: Duration::from_millis(DEFAULT_PUBLISH_REFILL_MS),
            publish_wait_timeout: Duration::from_secs(DEFAULT_PUBLISH_WAIT_SECS),
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            match_settle_delay: Duration::from_secs(DEFAULT_MATCH_SETTLE_SECS),
            record_store_url: None,
            record_store_service_key: None,
            system_owner_id: DEFAULT_SYSTEM_OWNER_ID.to_string(),
            jwt_secret: None,
            require_auth: false,
            tls_cert_path: None,
            tls_key_path: None,
            enable_tls: false,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn flag_var(name: &str) -> bool {
    env::var(name)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(false)
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            host: env::var("SHOWDOWN_HOST").unwrap_or(defaults.host),
            port: parse_var("SHOWDOWN_PORT", defaults.port),
            mailbox_capacity: parse_var("SHOWDOWN_MAILBOX_CAPACITY", defaults.mailbox_capacity),
            publish_burst: parse_var("SHOWDOWN_PUBLISH_BURST", defaults.publish_burst),
            publish_refill_interval: Duration::from_millis(parse_var(
                "SHOWDOWN_PUBLISH_REFILL_MS",
                DEFAULT_PUBLISH_REFILL_MS,
            )),
            publish_wait_timeout: Duration::from_secs(parse_var(
                "SHOWDOWN_PUBLISH_WAIT_SECS",
                DEFAULT_PUBLISH_WAIT_SECS,
            )),
            write_timeout: Duration::from_secs(parse_var(
                "SHOWDOWN_WRITE_TIMEOUT_SECS",
                DEFAULT_WRITE_TIMEOUT_SECS,
            )),
            max_body_bytes: parse_var("SHOWDOWN_MAX_BODY_BYTES", defaults.max_body_bytes),
            match_settle_delay: Duration::from_secs(parse_var(
                "SHOWDOWN_MATCH_SETTLE_SECS",
                DEFAULT_MATCH_SETTLE_SECS,
            )),
            record_store_url: env::var("SHOWDOWN_RECORD_STORE_URL").ok(),
            record_store_service_key: env::var("SHOWDOWN_RECORD_STORE_SERVICE_KEY").ok(),
            system_owner_id: env::var("SHOWDOWN_SYSTEM_OWNER_ID")
                .unwrap_or(defaults.system_owner_id),
            jwt_secret: env::var("SHOWDOWN_JWT_SECRET")
                .or_else(|_| env::var("JWT_SECRET"))
                .ok(),
            require_auth: flag_var("SHOWDOWN_REQUIRE_AUTH"),
            enable_tls: flag_var("SHOWDOWN_ENABLE_TLS"),
            tls_cert_path: env::var("SHOWDOWN_TLS_CERT_PATH").ok(),
            tls_key_path: env::var("SHOWDOWN_TLS_KEY_PATH").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the hub cannot run with
    pub fn validate(&self) -> Result<()> {
        // room for WELCOME plus the subscriber's own PEER_JOIN
        if self.mailbox_capacity < 2 {
            return Err(HubError::ConfigError(
                "mailbox capacity must be at least 2".to_string(),
            ));
        }
        if self.publish_burst == 0 || self.publish_refill_interval.is_zero() {
            return Err(HubError::ConfigError(
                "publish burst and refill interval must be non-zero".to_string(),
            ));
        }
        if self.write_timeout.is_zero() {
            return Err(HubError::ConfigError(
                "write timeout must be non-zero".to_string(),
            ));
        }

        match &self.jwt_secret {
            Some(secret) if secret.len() < 32 => {
                return Err(HubError::ConfigError(
                    "JWT secret must be at least 32 characters long".to_string(),
                ));
            }
            None if self.require_auth => {
                return Err(HubError::ConfigError(
                    "SHOWDOWN_REQUIRE_AUTH is set but no JWT secret is configured".to_string(),
                ));
            }
            _ => {}
        }

        if self.enable_tls {
            let (cert_path, key_path) = match (&self.tls_cert_path, &self.tls_key_path) {
                (Some(cert), Some(key)) => (cert, key),
                _ => {
                    return Err(HubError::ConfigError(
                        "TLS is enabled but SHOWDOWN_TLS_CERT_PATH or SHOWDOWN_TLS_KEY_PATH is not set"
                            .to_string(),
                    ))
                }
            };
            if !std::path::Path::new(cert_path).exists() {
                return Err(HubError::ConfigError(format!(
                    "TLS certificate file does not exist: {}",
                    cert_path
                )));
            }
            if !std::path::Path::new(key_path).exists() {
                return Err(HubError::ConfigError(format!(
                    "TLS private key file does not exist: {}",
                    key_path
                )));
            }
        }

        Ok(())
    }
}
