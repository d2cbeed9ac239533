use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Which `SubscriptionStore` implementation the service runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => bail!("Unknown SUBSCRIPTIONS_STORE backend: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn new(database_url: String) -> Self {
        Self {
            database_url,
            max_connections: 10,
            connect_timeout_seconds: 30,
            run_migrations: true,
        }
    }

    fn from_env() -> Result<Self> {
        let database_url = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => bail!("DATABASE_URL must be set when SUBSCRIPTIONS_STORE=postgres"),
        };

        Ok(Self {
            database_url,
            max_connections: parse_env("DB_MAX_CONNECTIONS").unwrap_or(10),
            connect_timeout_seconds: parse_env("DB_CONNECT_TIMEOUT").unwrap_or(30),
            run_migrations: parse_env("DB_RUN_MIGRATIONS").unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    /// Present only for the Postgres backend.
    pub database: Option<DatabaseConfig>,
}

impl ServiceConfig {
    pub const SERVICE_NAME: &'static str = "subscriptions-service";

    /// Load configuration from the environment (after `.env`, if any).
    pub fn from_env() -> Result<Self> {
        let store = match env::var("SUBSCRIPTIONS_STORE") {
            Ok(value) => value.parse()?,
            Err(_) => StoreBackend::Postgres,
        };

        let database = match store {
            StoreBackend::Postgres => Some(DatabaseConfig::from_env()?),
            StoreBackend::Memory => None,
        };

        Ok(Self {
            host: env::var("SUBSCRIPTIONS_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env("SUBSCRIPTIONS_SERVICE_PORT").unwrap_or(8080),
            store,
            database,
        })
    }

    /// In-memory configuration, handy for local runs.
    pub fn in_memory(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
            store: StoreBackend::Memory,
            database: None,
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
