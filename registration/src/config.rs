//! Configuration for the registration service.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::aggregates::Policy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server
    pub server: ServerConfig,
    /// `PostgreSQL`; `None` runs on the in-memory repository
    pub database: Option<DatabaseConfig>,
    /// Hold and offer windows
    pub registration: RegistrationConfig,
    /// Payment gateway calls
    pub gateway: GatewayConfig,
    /// Expiry sweeper
    pub sweep: SweepConfig,
    /// Catalog seed file (JSON)
    pub catalog_file: Option<String>,
    /// Shared secret expected in `X-Webhook-Secret`
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL
    #[serde(skip_serializing)]
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

/// Registration windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Minutes a seat is held awaiting payment (default: 30)
    pub hold_duration_minutes: i64,
    /// Minutes a waitlist offer stays open (default: 1440)
    pub waitlist_response_window_minutes: i64,
    /// ISO currency for payments (default: SAR)
    pub currency: String,
}

/// Payment gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Per-call timeout in seconds
    pub timeout_seconds: u64,
    /// Retries for status reads
    pub max_retries: u32,
}

/// Sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweeps (default: 300)
    pub interval_seconds: u64,
}

fn var_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: var_or("PORT", 8080),
                shutdown_timeout: var_or("SHUTDOWN_TIMEOUT", 30),
            },
            database: non_empty("DATABASE_URL").map(|url| DatabaseConfig {
                url,
                max_connections: var_or("DATABASE_MAX_CONNECTIONS", 10),
                connect_timeout: var_or("DATABASE_CONNECT_TIMEOUT", 30),
            }),
            registration: RegistrationConfig {
                hold_duration_minutes: var_or("HOLD_DURATION_MINUTES", 30),
                waitlist_response_window_minutes: var_or("WAITLIST_RESPONSE_WINDOW_MINUTES", 1440),
                currency: env::var("CURRENCY").unwrap_or_else(|_| "SAR".to_string()),
            },
            gateway: GatewayConfig {
                timeout_seconds: var_or("PAYMENT_GATEWAY_TIMEOUT_SECONDS", 10),
                max_retries: var_or("PAYMENT_GATEWAY_MAX_RETRIES", 2),
            },
            sweep: SweepConfig {
                interval_seconds: var_or("SWEEP_INTERVAL_SECONDS", 300),
            },
            catalog_file: non_empty("CATALOG_FILE"),
            webhook_secret: non_empty("WEBHOOK_SECRET"),
        }
    }

    /// Socket address string for the listener
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Hold and offer windows for the reducer. Non-positive values fall back
    /// to one minute.
    #[must_use]
    pub fn policy(&self) -> Policy {
        let minutes = |m: i64| chrono::Duration::minutes(m.max(1));
        Policy {
            hold_duration: minutes(self.registration.hold_duration_minutes),
            response_window: minutes(self.registration.waitlist_response_window_minutes),
        }
    }

    /// Per-call gateway timeout
    #[must_use]
    pub const fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.timeout_seconds)
    }

    /// Time between sweeps, at least one second
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep.interval_seconds.max(1))
    }

    /// Grace period for in-flight requests on shutdown
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                shutdown_timeout: 30,
            },
            database: None,
            registration: RegistrationConfig {
                hold_duration_minutes: 30,
                waitlist_response_window_minutes: 1440,
                currency: "SAR".to_string(),
            },
            gateway: GatewayConfig {
                timeout_seconds: 10,
                max_retries: 2,
            },
            sweep: SweepConfig { interval_seconds: 300 },
            catalog_file: None,
            webhook_secret: None,
        }
    }
}
