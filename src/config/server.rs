//! Server configuration types
//!
//! Defines which SOCKS dialects the server accepts and who may use it.

use super::TcpConfig;
use crate::error::SocksError;
use crate::protocol::consts::MAX_FIELD_LEN;
use crate::protocol::ProtocolVersion;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn default_listen_addr() -> String {
    "127.0.0.1:1080".to_string()
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

/// SOCKS server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Version to serve; `None` accepts SOCKS4, 4a and 5
    #[serde(default)]
    pub protocol_version: Option<ProtocolVersion>,

    /// Bound on one client's handshake, including the target dial
    #[serde(default = "default_handshake_timeout", with = "humantime_serde")]
    pub handshake_timeout: Duration,

    /// Dial timeout toward targets
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Username to password map; non-empty means SOCKS5 auth is required
    #[serde(default)]
    pub users: HashMap<String, String>,

    /// Socket options for target connections
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: default_listen_addr(),
            protocol_version: None,
            handshake_timeout: default_handshake_timeout(),
            connect_timeout: default_connect_timeout(),
            users: HashMap::new(),
            tcp: TcpConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Check if authentication credentials are configured
    pub fn requires_auth(&self) -> bool {
        !self.users.is_empty()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SocksError> {
        for (username, password) in &self.users {
            if username.is_empty() || username.len() > MAX_FIELD_LEN {
                return Err(SocksError::InvalidConfig(format!(
                    "username {:?} must be 1 to {} bytes",
                    username, MAX_FIELD_LEN
                )));
            }
            if password.len() > MAX_FIELD_LEN {
                return Err(SocksError::InvalidConfig(format!(
                    "password of {:?} exceeds {} bytes",
                    username, MAX_FIELD_LEN
                )));
            }
        }
        if self.requires_auth() && self.protocol_version.is_some_and(|v| v != ProtocolVersion::Socks5) {
            return Err(SocksError::InvalidConfig(
                "authentication needs SOCKS5, SOCKS4 has no auth primitive".to_string(),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(SocksError::InvalidConfig(
                "handshake_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, "127.0.0.1:1080");
        assert!(config.protocol_version.is_none());
        assert!(!config.requires_auth());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_requires_auth() {
        let mut config = ServerConfig::default();
        config.users.insert("name".to_string(), "pass".to_string());
        assert!(config.requires_auth());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_auth_with_socks4_is_invalid() {
        let mut config = ServerConfig {
            protocol_version: Some(ProtocolVersion::Socks4),
            ..Default::default()
        };
        config.users.insert("name".to_string(), "pass".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_config_oversized_user() {
        let mut config = ServerConfig::default();
        config.users.insert("u".repeat(256), "pass".to_string());
        assert!(config.validate().is_err());
    }
}
