use std::env;
use std::net::SocketAddr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::services::OrderSettings;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SERVICE_FEE: &str = "500";
const DEFAULT_TX_REF_PREFIX: &str = "SOP";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres is used when set; otherwise orders live in memory.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub service_fee: Decimal,
    pub tx_ref_prefix: String,
    pub cors_allowed_origins: Vec<String>,
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: raw })
        }

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => parse("DATABASE_MAX_CONNECTIONS", raw)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let bind_addr = parse(
            "BIND_ADDR",
            lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        )?;

        let service_fee: Decimal = parse(
            "SERVICE_FEE",
            lookup("SERVICE_FEE").unwrap_or_else(|| DEFAULT_SERVICE_FEE.to_string()),
        )?;
        if service_fee.is_sign_negative() {
            return Err(ConfigError::Invalid {
                key: "SERVICE_FEE",
                value: service_fee.to_string(),
            });
        }

        let tx_ref_prefix = lookup("TX_REF_PREFIX")
            .map(|prefix| prefix.trim().to_string())
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or_else(|| DEFAULT_TX_REF_PREFIX.to_string());

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        let production = lookup("RUST_ENV")
            .map(|v| v.to_lowercase() == "production")
            .unwrap_or(false);

        Ok(Self {
            database_url,
            max_connections,
            bind_addr,
            service_fee,
            tx_ref_prefix,
            cors_allowed_origins,
            production,
        })
    }

    pub fn order_settings(&self) -> OrderSettings {
        OrderSettings {
            service_fee: self.service_fee,
            tx_ref_prefix: self.tx_ref_prefix.clone(),
        }
    }
}
