//! Bridge configuration
//!
//! Defaults can be overridden through environment variables:
//!
//! - `GENERALS_BIND_ADDR`    (default: "0.0.0.0")
//! - `GENERALS_PORT`         (default: "5000")
//! - `GENERALS_BACKLOG`      (default: "5")
//! - `GENERALS_RENDER_MODE`  (default: unset, no rendering)

use generals_core::{BridgeError, Result};
use generals_wire::DEFAULT_MAX_FRAME;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Bridge configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Interface to bind, e.g. "0.0.0.0" or "127.0.0.1"
    pub bind_addr: String,

    /// TCP port; 0 picks an ephemeral port
    pub port: u16,

    /// Listen backlog
    pub backlog: u32,

    /// Passed to every engine; `None` disables rendering
    pub render_mode: Option<String>,

    /// Upper bound on a single accept wait, so shutdown is noticed promptly
    pub accept_timeout: Duration,

    /// How often finished workers are reaped
    pub reap_interval: Duration,

    /// How long `stop` waits for workers before aborting them
    pub shutdown_grace: Duration,

    /// Largest accepted frame, newline excluded
    pub max_frame_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 5000,
            backlog: 5,
            render_mode: None,
            accept_timeout: Duration::from_secs(1),
            reap_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
            max_frame_bytes: DEFAULT_MAX_FRAME,
        }
    }
}

impl BridgeConfig {
    /// Loopback configuration on an ephemeral port
    pub fn local() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            ..Self::default()
        }
    }

    /// Build from the process environment, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let bind_addr = lookup("GENERALS_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let port = parse_var(&lookup, "GENERALS_PORT", defaults.port)?;
        let backlog = parse_var(&lookup, "GENERALS_BACKLOG", defaults.backlog)?;
        if backlog == 0 {
            return Err(BridgeError::Config(
                "GENERALS_BACKLOG must be at least 1".into(),
            ));
        }
        let render_mode = lookup("GENERALS_RENDER_MODE")
            .map(|mode| mode.trim().to_string())
            .filter(|mode| !mode.is_empty() && mode != "none" && mode != "off");

        Ok(Self {
            bind_addr,
            port,
            backlog,
            render_mode,
            ..defaults
        })
    }

    /// `addr:port` socket string
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Parse an optional variable, keeping `default` when it is unset
pub fn parse_var<T>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| BridgeError::Config(format!("invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.socket_addr_string(), "0.0.0.0:5000");
        assert_eq!(config.backlog, 5);
        assert_eq!(config.render_mode, None);
    }

    #[test]
    fn test_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("GENERALS_BIND_ADDR", "127.0.0.1"),
            ("GENERALS_PORT", " 6123 "),
            ("GENERALS_BACKLOG", "64"),
            ("GENERALS_RENDER_MODE", "human"),
        ]))
        .unwrap();

        assert_eq!(config.socket_addr_string(), "127.0.0.1:6123");
        assert_eq!(config.backlog, 64);
        assert_eq!(config.render_mode.as_deref(), Some("human"));
    }

    #[test]
    fn test_render_mode_off_values() {
        for value in ["", "none", "off"] {
            let config =
                BridgeConfig::from_lookup(lookup(&[("GENERALS_RENDER_MODE", value)])).unwrap();
            assert_eq!(config.render_mode, None, "{:?}", value);
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = BridgeConfig::from_lookup(lookup(&[("GENERALS_PORT", "http")])).unwrap_err();
        assert!(matches!(err, BridgeError::Config(ref msg) if msg.contains("GENERALS_PORT")));

        let err = BridgeConfig::from_lookup(lookup(&[("GENERALS_PORT", "70000")])).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));

        let err = BridgeConfig::from_lookup(lookup(&[("GENERALS_BACKLOG", "0")])).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
