// Process configuration read from the environment

use std::env;

use crate::payments::PaymentGatewayKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings for the server binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub database_max_connections: u32,
    pub payment_gateway: PaymentGatewayKind,
}

impl Config {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("PORT", lookup("PORT"), 8080)?;
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", lookup("DATABASE_MAX_CONNECTIONS"), 5)?;
        let payment_gateway = parse_or("PAYMENT_GATEWAY", lookup("PAYMENT_GATEWAY"), PaymentGatewayKind::Offline)?;

        Ok(Self {
            database_url,
            host,
            port,
            database_max_connections,
            payment_gateway,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/rental")])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.payment_gateway, PaymentGatewayKind::Offline);
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_missing_database_url() {
        let result = Config::from_lookup(lookup(&[("PORT", "9000")]));
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn test_invalid_port() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/rental"),
            ("PORT", "eighty"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { name: "PORT", .. })));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/rental"),
            ("HOST", "127.0.0.1"),
            ("PORT", "3000"),
            ("DATABASE_MAX_CONNECTIONS", "20"),
        ]))
        .unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
        assert_eq!(config.database_max_connections, 20);
    }

    #[test]
    fn test_payment_gateway_selection() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/rental"),
            ("PAYMENT_GATEWAY", "in_memory"),
        ]))
        .unwrap();
        assert_eq!(config.payment_gateway, PaymentGatewayKind::InMemory);

        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/rental"),
            ("PAYMENT_GATEWAY", "always-yes"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { name: "PAYMENT_GATEWAY", .. })));
    }
}
