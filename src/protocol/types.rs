//! SOCKS type definitions
//!
//! Address model and negotiation parameters shared by the client and
//! server negotiators.

use super::consts::*;
use crate::error::SocksError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// SOCKS protocol version used for one negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "VersionRepr", into = "String")]
pub enum ProtocolVersion {
    /// SOCKS4, IPv4 targets only
    Socks4,
    /// SOCKS4a, SOCKS4 plus proxy-side hostname resolution
    Socks4a,
    /// SOCKS5 (RFC 1928)
    #[default]
    Socks5,
}

impl ProtocolVersion {
    /// Version byte that opens a request in this dialect
    pub fn request_marker(self) -> u8 {
        match self {
            ProtocolVersion::Socks4 | ProtocolVersion::Socks4a => SOCKS4_VERSION,
            ProtocolVersion::Socks5 => SOCKS5_VERSION,
        }
    }

    /// Version byte that opens the server's first reply in this dialect
    pub fn reply_marker(self) -> u8 {
        match self {
            ProtocolVersion::Socks4 | ProtocolVersion::Socks4a => SOCKS4_REPLY_VERSION,
            ProtocolVersion::Socks5 => SOCKS5_VERSION,
        }
    }

    /// Whether the proxy can be handed an unresolved hostname
    pub fn supports_remote_resolution(self) -> bool {
        !matches!(self, ProtocolVersion::Socks4)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Socks4 => write!(f, "4"),
            ProtocolVersion::Socks4a => write!(f, "4a"),
            ProtocolVersion::Socks5 => write!(f, "5"),
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "4" | "socks4" => Ok(ProtocolVersion::Socks4),
            "4a" | "socks4a" => Ok(ProtocolVersion::Socks4a),
            "5" | "socks5" => Ok(ProtocolVersion::Socks5),
            other => Err(format!("Unsupported SOCKS version: {}", other)),
        }
    }
}

impl From<ProtocolVersion> for String {
    fn from(version: ProtocolVersion) -> Self {
        version.to_string()
    }
}

/// Accepts both `protocol_version = 5` and `protocol_version = "4a"`
#[derive(Deserialize)]
#[serde(untagged)]
enum VersionRepr {
    Number(u8),
    Text(String),
}

impl TryFrom<VersionRepr> for ProtocolVersion {
    type Error = String;

    fn try_from(repr: VersionRepr) -> Result<Self, Self::Error> {
        match repr {
            VersionRepr::Number(n) => n.to_string().parse(),
            VersionRepr::Text(s) => s.parse(),
        }
    }
}

/// Where the target hostname is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionMode {
    /// Client resolves before sending the request
    #[default]
    Local,
    /// Hostname is sent as-is for the proxy to resolve
    Remote,
}

impl ResolutionMode {
    /// Mode matching a `resolve_local` flag
    pub fn from_resolve_local(resolve_local: bool) -> Self {
        if resolve_local {
            ResolutionMode::Local
        } else {
            ResolutionMode::Remote
        }
    }
}

/// SOCKS5 authentication method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// Username/password authentication (RFC 1929)
    UsernamePassword,
}

impl AuthMethod {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::UsernamePassword => SOCKS5_AUTH_METHOD_PASSWORD,
        }
    }

    /// Parse from SOCKS5 method byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_AUTH_METHOD_NONE => Some(AuthMethod::None),
            SOCKS5_AUTH_METHOD_PASSWORD => Some(AuthMethod::UsernamePassword),
            _ => None,
        }
    }
}

/// Username and password for RFC 1929 sub-negotiation
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: Vec<u8>,
    password: Vec<u8>,
}

impl Credentials {
    /// Create credentials, each field limited to 255 bytes
    pub fn new(
        username: impl Into<Vec<u8>>,
        password: impl Into<Vec<u8>>,
    ) -> Result<Self, SocksError> {
        let username = username.into();
        let password = password.into();

        if username.len() > MAX_FIELD_LEN {
            return Err(SocksError::InvalidConfig(format!(
                "username is {} bytes, limit is {}",
                username.len(),
                MAX_FIELD_LEN
            )));
        }
        if password.len() > MAX_FIELD_LEN {
            return Err(SocksError::InvalidConfig(format!(
                "password is {} bytes, limit is {}",
                password.len(),
                MAX_FIELD_LEN
            )));
        }

        Ok(Credentials { username, password })
    }

    /// Raw username bytes
    pub fn username(&self) -> &[u8] {
        &self.username
    }

    /// Raw password bytes
    pub fn password(&self) -> &[u8] {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection target as given by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
    /// Create a validated target: non-empty host of at most 255 bytes, port 1-65535
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, SocksError> {
        let host = host.into();
        // Accept "[::1]" style literals as well
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .map(str::to_string)
            .unwrap_or(host);

        if port == 0 {
            return Err(SocksError::InvalidTarget("port 0 is not allowed".to_string()));
        }
        if host.is_empty() {
            return Err(SocksError::InvalidTarget("empty host".to_string()));
        }
        if host.len() > MAX_FIELD_LEN {
            return Err(SocksError::InvalidTarget(format!(
                "host is {} bytes, limit is {}",
                host.len(),
                MAX_FIELD_LEN
            )));
        }
        if host.as_bytes().contains(&0) {
            return Err(SocksError::InvalidTarget("host contains a NUL byte".to_string()));
        }

        Ok(Target { host, port })
    }

    /// Hostname or IP literal
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Destination port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The host parsed as an IP literal, if it is one
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }
}

impl FromStr for Target {
    type Err = SocksError;

    /// Parse `host:port` or `[v6]:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| SocksError::InvalidTarget(format!("missing port in {:?}", s)))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| SocksError::InvalidTarget(format!("invalid port in {:?}", s)))?;
        Target::new(host, port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Destination address as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl TargetAddr {
    /// Create a new TargetAddr from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create a new TargetAddr from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// Get the address type byte for SOCKS5 protocol
    pub fn addr_type(&self) -> u8 {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => SOCKS5_ADDR_TYPE_IPV4,
            TargetAddr::Ip(SocketAddr::V6(_)) => SOCKS5_ADDR_TYPE_IPV6,
            TargetAddr::Domain(_, _) => SOCKS5_ADDR_TYPE_DOMAIN,
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}

impl From<TargetAddr> for Target {
    fn from(addr: TargetAddr) -> Self {
        match addr {
            TargetAddr::Ip(sa) => Target {
                host: sa.ip().to_string(),
                port: sa.port(),
            },
            TargetAddr::Domain(host, port) => Target { host, port },
        }
    }
}
