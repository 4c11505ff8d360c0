//! Client configuration types
//!
//! Defines how the client reaches the SOCKS server and negotiates with it.

use super::TcpConfig;
use crate::error::SocksError;
use crate::protocol::{Credentials, ProtocolVersion, ResolutionMode, Target};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default whole-attempt timeout
fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_resolve_local() -> bool {
    true
}

fn default_verify_peer() -> bool {
    true
}

/// SOCKS client configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    /// SOCKS server address (e.g., "127.0.0.1:1080")
    pub proxy_addr: String,

    /// SOCKS version to speak
    #[serde(default)]
    pub protocol_version: ProtocolVersion,

    /// Resolve target hostnames locally (true) or let the proxy do it
    #[serde(default = "default_resolve_local")]
    pub resolve_local: bool,

    /// Bound on the whole attempt, from dialing the proxy to the end of
    /// the handshake
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Username for SOCKS5 auth (SOCKS4 user id)
    #[serde(default)]
    pub username: Option<String>,

    /// Password for SOCKS5 auth
    #[serde(default)]
    pub password: Option<String>,

    /// TLS options for secure connections
    #[serde(default)]
    pub tls: TlsConfig,

    /// Socket options for the proxy connection
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl ClientConfig {
    /// Create a configuration with defaults for the given proxy
    pub fn new(proxy_addr: impl Into<String>) -> Self {
        ClientConfig {
            proxy_addr: proxy_addr.into(),
            protocol_version: ProtocolVersion::default(),
            resolve_local: default_resolve_local(),
            timeout: default_timeout(),
            username: None,
            password: None,
            tls: TlsConfig::default(),
            tcp: TcpConfig::default(),
        }
    }

    /// Resolution mode derived from `resolve_local`
    pub fn resolution_mode(&self) -> ResolutionMode {
        ResolutionMode::from_resolve_local(self.resolve_local)
    }

    /// Parsed proxy address
    pub fn proxy_target(&self) -> Result<Target, SocksError> {
        self.proxy_addr.parse()
    }

    /// Validated credentials, if configured
    pub fn credentials(&self) -> Result<Option<Credentials>, SocksError> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                Credentials::new(username.as_bytes(), password.as_bytes()).map(Some)
            }
            (None, None) => Ok(None),
            _ => Err(SocksError::InvalidConfig(
                "username and password must be configured together".to_string(),
            )),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SocksError> {
        self.proxy_target()?;
        self.credentials()?;

        if !self.resolve_local && !self.protocol_version.supports_remote_resolution() {
            return Err(SocksError::InvalidConfig(
                "SOCKS4 cannot resolve remotely, use 4a or 5".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(SocksError::InvalidConfig("timeout must be positive".to_string()));
        }

        Ok(())
    }
}

/// TLS verification options for the secure upgrade
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Verify the peer certificate chain and name
    #[serde(default = "default_verify_peer")]
    pub verify_peer: bool,

    /// Name used for SNI and verification instead of the target host
    #[serde(default)]
    pub server_name: Option<String>,

    /// Extra PEM file with trusted roots
    #[serde(default)]
    pub trusted_root: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            verify_peer: default_verify_peer(),
            server_name: None,
            trusted_root: None,
        }
    }
}
