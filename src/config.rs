use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Client configuration for talking to the trusted authority and the share escrow.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the authority's HTTP endpoint; `/pp` is appended.
    pub authority_url: String,
    /// `host:port` of the authority's realtime channel.
    pub authority_socket: String,
    pub handshake_timeout_secs: u64,
    pub share_count: u8,
    pub share_threshold: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            authority_url: "https://localhost:8443".to_owned(),
            authority_socket: "localhost:8444".to_owned(),
            handshake_timeout_secs: 30,
            share_count: 10,
            share_threshold: 2,
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.share_threshold < 2 {
            return Err(Error::Config("share_threshold must be at least 2".into()));
        }
        if self.share_threshold > self.share_count {
            return Err(Error::Config(format!(
                "share_threshold {} exceeds share_count {}",
                self.share_threshold, self.share_count
            )));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(Error::Config("handshake_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn parameters_url(&self) -> String {
        format!("{}/pp", self.authority_url.trim_end_matches('/'))
    }

    /// Host part of `authority_socket`; the name its TLS certificate must carry.
    pub fn authority_host(&self) -> &str {
        let host = self
            .authority_socket
            .rsplit_once(':')
            .map_or(self.authority_socket.as_str(), |(host, _)| host);
        host.trim_start_matches('[').trim_end_matches(']')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config =
            Config::from_json_str(r#"{ "authority_url": "https://ta.example/" }"#).unwrap();
        assert_eq!(config.share_count, 10);
        assert_eq!(config.share_threshold, 2);
        assert_eq!(config.parameters_url(), "https://ta.example/pp");
        assert_eq!(config.handshake_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn authority_host_strips_port() {
        let mut config = Config::default();
        assert_eq!(config.authority_host(), "localhost");

        config.authority_socket = "ta.example.org:9443".into();
        assert_eq!(config.authority_host(), "ta.example.org");

        config.authority_socket = "[::1]:9443".into();
        assert_eq!(config.authority_host(), "::1");
    }

    #[test]
    fn rejects_bad_thresholds() {
        assert!(matches!(
            Config::from_json_str(r#"{ "share_threshold": 1 }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_json_str(r#"{ "share_count": 3, "share_threshold": 4 }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_json_str(r#"{ "handshake_timeout_secs": 0 }"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Config::from_json_str(r#"{ "authority": "x" }"#).is_err());
    }
}
