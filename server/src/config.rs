//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use rust_decimal::Decimal;
use walletd_common::Currency;
use walletd_fx::ResolverConfig;

/// Main server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Database URL.
    pub database_url: String,
    /// Maximum pooled database connections.
    pub database_max_connections: u32,
    /// Upstream rate feed URL.
    pub rates_url: String,
    /// Serve these rates instead of polling `rates_url`.
    pub fixed_rates: Option<Vec<(Currency, Decimal)>>,
    /// Rate cache and lookup policy.
    pub resolver: ResolverConfig,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            database_url: "postgres://localhost/walletd".to_string(),
            database_max_connections: 10,
            rates_url: "http://localhost:8081/api/v1/rates".to_string(),
            fixed_rates: None,
            resolver: ResolverConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

/// Parse `CUR:rate` pairs separated by commas, e.g. `USD:1,EUR:0.92`.
pub fn parse_fixed_rates(raw: &str) -> Result<Vec<(Currency, Decimal)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (code, rate) = entry
                .split_once(':')
                .ok_or_else(|| format!("Fixed rate '{entry}' is not CUR:rate"))?;
            let rate: Decimal = rate
                .trim()
                .parse()
                .map_err(|e| format!("Fixed rate '{entry}': {e}"))?;
            Ok((Currency::new(code), rate))
        })
        .collect()
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup, overlaying defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let millis = |key: &str| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        if let Some(addr) = lookup("WALLETD_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = lookup("WALLETD_LISTEN_PORT").and_then(|p| p.parse().ok()) {
            config.listen_port = port;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }

        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS").and_then(|m| m.parse().ok()) {
            config.database_max_connections = max;
        }

        if let Some(url) = lookup("RATES_URL") {
            config.rates_url = url;
        }

        // Unparseable fixed rates fall through to validate().
        if let Some(raw) = lookup("RATES_FIXED") {
            config.fixed_rates = Some(parse_fixed_rates(&raw).unwrap_or_default());
        }

        if let Some(ttl) = millis("RATES_CACHE_TTL_MS") {
            config.resolver.cache_ttl = ttl;
        }

        if let Some(attempts) = lookup("RATES_MAX_ATTEMPTS").and_then(|a| a.parse().ok()) {
            config.resolver.max_attempts = attempts;
        }

        if let Some(interval) = millis("RATES_RETRY_INTERVAL_MS") {
            config.resolver.retry_interval = interval;
        }

        if let Some(timeout) = millis("RATES_REQUEST_TIMEOUT_MS") {
            config.resolver.request_timeout = timeout;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Socket address to listen on.
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.listen_addr, self.listen_port)
            .parse()
            .map_err(|e| format!("Invalid listen address: {e}"))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        self.socket_addr()?;

        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.database_max_connections == 0 {
            return Err("Database pool needs at least one connection".to_string());
        }

        match &self.fixed_rates {
            Some(rates) if rates.is_empty() => {
                return Err("RATES_FIXED must list at least one CUR:rate pair".to_string());
            }
            Some(_) => {}
            None if self.rates_url.is_empty() => {
                return Err("Rates URL cannot be empty".to_string());
            }
            None => {}
        }

        self.resolver.validate()
    }
}
