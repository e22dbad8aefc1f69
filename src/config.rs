use anyhow::{Context, Result};

use crate::data::yahoo::{DEFAULT_BASE_URL, DEFAULT_USER_AGENT};

/// Process-level settings. Requests carry everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Serve MCP over streamable HTTP on this port instead of stdio.
    pub port: Option<u16>,
    pub yahoo_base_url: String,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: None,
            yahoo_base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Build from environment variables.
    ///
    /// | Env Var | Default | Purpose |
    /// |---------|---------|---------|
    /// | `PORT` | (none) | HTTP mode on `0.0.0.0:$PORT`; stdio if unset |
    /// | `YAHOO_BASE_URL` | `https://query1.finance.yahoo.com` | Chart API host |
    /// | `YAHOO_USER_AGENT` | desktop browser UA | Sent with every request |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = non_empty("PORT")
            .map(|p| {
                p.trim()
                    .parse::<u16>()
                    .with_context(|| format!("PORT must be a port number, got {p:?}"))
            })
            .transpose()?;

        Ok(Self {
            port,
            yahoo_base_url: non_empty("YAHOO_BASE_URL").unwrap_or(defaults.yahoo_base_url),
            user_agent: non_empty("YAHOO_USER_AGENT").unwrap_or(defaults.user_agent),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.port.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8000"),
            ("YAHOO_BASE_URL", "http://localhost:9000"),
            ("YAHOO_USER_AGENT", "test-agent"),
        ]))
        .unwrap();
        assert_eq!(config.port, Some(8000));
        assert_eq!(config.yahoo_base_url, "http://localhost:9000");
        assert_eq!(config.user_agent, "test-agent");
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[("PORT", " "), ("YAHOO_BASE_URL", "")])).unwrap();
        assert!(config.port.is_none());
        assert_eq!(config.yahoo_base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = Config::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
