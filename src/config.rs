//! Environment-driven configuration
//!
//! Values come from the process environment, optionally seeded from a
//! `.env` file by the binaries.

use crate::error::OrchestrationError;
use crate::Result;
use std::env;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Empty when unset; the generator reports it at call time.
    pub gemini_api_key: String,
    pub gemini_model: String,
    /// Overrides the generateContent endpoint (proxies, gateways).
    pub gemini_base_url: Option<String>,
    pub api_port: u16,
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests, alternate sources).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_port = match non_empty("PORT").or_else(|| non_empty("API_PORT")) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                OrchestrationError::Config(format!("Invalid port '{}'", raw))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            gemini_api_key: non_empty("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_base_url: non_empty("GEMINI_BASE_URL"),
            api_port,
            database_url: non_empty("DATABASE_URL"),
        })
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
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.gemini_model, "gemini-2.0-flash");
        assert!(config.gemini_api_key.is_empty());
        assert!(config.database_url.is_none());
        assert!(config.gemini_base_url.is_none());
    }

    #[test]
    fn test_port_fallback_and_blank_values() {
        let config = AppConfig::from_lookup(lookup(&[
            ("API_PORT", "9000"),
            ("DATABASE_URL", "  "),
            ("GEMINI_API_KEY", "k"),
        ]))
        .unwrap();

        assert_eq!(config.api_port, 9000);
        assert!(config.database_url.is_none());
        assert_eq!(config.gemini_api_key, "k");
    }

    #[test]
    fn test_invalid_port() {
        let err = AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, OrchestrationError::Config(_)));
    }
}
