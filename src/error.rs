//! Error types for Sockslink
//!
//! Every connection attempt resolves to either a tunnel or exactly one
//! [`SocksError`]. SOCKS4 and SOCKS5 reply codes are normalized into a
//! single [`ReplyOutcome`] taxonomy.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::consts::*;

/// Failure of a single SOCKS negotiation attempt
#[derive(Error, Debug)]
pub enum SocksError {
    /// Local resolution of the target hostname failed
    #[error("Failed to resolve {host}: {source}")]
    ResolutionFailed {
        /// Hostname that could not be resolved
        host: String,
        /// Underlying resolver error
        #[source]
        source: io::Error,
    },

    /// The proxy (or, server-side, the target) could not be dialed
    #[error("Failed to dial {addr}: {source}")]
    DialFailed {
        /// Address that was dialed
        addr: String,
        /// Underlying connect error
        #[source]
        source: io::Error,
    },

    /// Peer sent well-formed-length but structurally invalid bytes
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// Peer closed the stream before the handshake completed
    #[error("Connection closed during handshake")]
    ConnectionClosed,

    /// Peer speaks a different SOCKS version
    #[error("Protocol mismatch: expected version byte {expected:#04x}, got {actual:#04x}")]
    ProtocolMismatch {
        /// Version marker we expected
        expected: u8,
        /// Version marker the peer sent
        actual: u8,
    },

    /// Server refused every offered authentication method
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Username/password sub-negotiation failed
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// CONNECT request answered with a non-granted reply
    #[error("Request rejected: {0}")]
    Rejected(ReplyOutcome),

    /// The attempt did not settle within its deadline
    #[error("Timeout exceeded after {0:?}")]
    TimeoutExceeded(Duration),

    /// The attempt was cancelled by the caller
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// TLS handshake on the established tunnel failed
    #[error("Secure handshake failed: {0}")]
    SecureHandshakeFailed(String),

    /// Target failed validation before anything was sent
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Configuration cannot be used for a negotiation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Other IO error on the handshake stream
    #[error("IO error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for SocksError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => SocksError::ConnectionClosed,
            _ => SocksError::Io(err),
        }
    }
}

impl SocksError {
    /// The reply outcome carried by a [`SocksError::Rejected`] error
    pub fn reply_outcome(&self) -> Option<ReplyOutcome> {
        match self {
            SocksError::Rejected(outcome) => Some(*outcome),
            _ => None,
        }
    }
}

/// Normalized result of a CONNECT reply across SOCKS4 and SOCKS5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyOutcome {
    /// Request granted / succeeded
    Granted,
    /// SOCKS4: request rejected or failed
    RequestRejected,
    /// SOCKS4: client is not running identd
    IdentdUnreachable,
    /// SOCKS4: identd could not confirm the user id
    IdentdMismatch,
    /// General SOCKS server failure
    GeneralFailure,
    /// Connection not allowed by ruleset
    RulesetDenied,
    /// Network unreachable
    NetworkUnreachable,
    /// Host unreachable
    HostUnreachable,
    /// Connection refused
    ConnectionRefused,
    /// TTL expired
    TtlExpired,
    /// Command not supported
    CommandNotSupported,
    /// Address type not supported
    AddressTypeNotSupported,
}

impl ReplyOutcome {
    /// Map a SOCKS4 `CD` reply byte
    pub fn from_socks4(code: u8) -> Self {
        match code {
            SOCKS4_REPLY_GRANTED => ReplyOutcome::Granted,
            SOCKS4_REPLY_REJECTED => ReplyOutcome::RequestRejected,
            SOCKS4_REPLY_IDENTD_UNREACHABLE => ReplyOutcome::IdentdUnreachable,
            SOCKS4_REPLY_IDENTD_MISMATCH => ReplyOutcome::IdentdMismatch,
            _ => ReplyOutcome::GeneralFailure,
        }
    }

    /// Map a SOCKS5 `REP` reply byte, `None` for codes outside RFC 1928
    pub fn from_socks5(code: u8) -> Option<Self> {
        let outcome = match code {
            SOCKS5_REPLY_SUCCEEDED => ReplyOutcome::Granted,
            SOCKS5_REPLY_GENERAL_FAILURE => ReplyOutcome::GeneralFailure,
            SOCKS5_REPLY_CONNECTION_NOT_ALLOWED => ReplyOutcome::RulesetDenied,
            SOCKS5_REPLY_NETWORK_UNREACHABLE => ReplyOutcome::NetworkUnreachable,
            SOCKS5_REPLY_HOST_UNREACHABLE => ReplyOutcome::HostUnreachable,
            SOCKS5_REPLY_CONNECTION_REFUSED => ReplyOutcome::ConnectionRefused,
            SOCKS5_REPLY_TTL_EXPIRED => ReplyOutcome::TtlExpired,
            SOCKS5_REPLY_COMMAND_NOT_SUPPORTED => ReplyOutcome::CommandNotSupported,
            SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED => ReplyOutcome::AddressTypeNotSupported,
            _ => return None,
        };
        Some(outcome)
    }

    /// SOCKS4 has only "granted" and "rejected" for anything a server decides
    pub fn to_socks4(self) -> u8 {
        match self {
            ReplyOutcome::Granted => SOCKS4_REPLY_GRANTED,
            ReplyOutcome::IdentdUnreachable => SOCKS4_REPLY_IDENTD_UNREACHABLE,
            ReplyOutcome::IdentdMismatch => SOCKS4_REPLY_IDENTD_MISMATCH,
            _ => SOCKS4_REPLY_REJECTED,
        }
    }

    /// SOCKS5 `REP` byte for this outcome
    pub fn to_socks5(self) -> u8 {
        match self {
            ReplyOutcome::Granted => SOCKS5_REPLY_SUCCEEDED,
            ReplyOutcome::RulesetDenied => SOCKS5_REPLY_CONNECTION_NOT_ALLOWED,
            ReplyOutcome::NetworkUnreachable => SOCKS5_REPLY_NETWORK_UNREACHABLE,
            ReplyOutcome::HostUnreachable => SOCKS5_REPLY_HOST_UNREACHABLE,
            ReplyOutcome::ConnectionRefused => SOCKS5_REPLY_CONNECTION_REFUSED,
            ReplyOutcome::TtlExpired => SOCKS5_REPLY_TTL_EXPIRED,
            ReplyOutcome::CommandNotSupported => SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
            ReplyOutcome::AddressTypeNotSupported => SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
            ReplyOutcome::RequestRejected
            | ReplyOutcome::IdentdUnreachable
            | ReplyOutcome::IdentdMismatch
            | ReplyOutcome::GeneralFailure => SOCKS5_REPLY_GENERAL_FAILURE,
        }
    }

    /// Whether this outcome opens the tunnel
    pub fn is_granted(self) -> bool {
        self == ReplyOutcome::Granted
    }
}

impl std::fmt::Display for ReplyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ReplyOutcome::Granted => "request granted",
            ReplyOutcome::RequestRejected => "request rejected or failed",
            ReplyOutcome::IdentdUnreachable => "identd unreachable",
            ReplyOutcome::IdentdMismatch => "identd user id mismatch",
            ReplyOutcome::GeneralFailure => "general SOCKS server failure",
            ReplyOutcome::RulesetDenied => "connection not allowed by ruleset",
            ReplyOutcome::NetworkUnreachable => "network unreachable",
            ReplyOutcome::HostUnreachable => "host unreachable",
            ReplyOutcome::ConnectionRefused => "connection refused",
            ReplyOutcome::TtlExpired => "TTL expired",
            ReplyOutcome::CommandNotSupported => "command not supported",
            ReplyOutcome::AddressTypeNotSupported => "address type not supported",
        };
        f.write_str(text)
    }
}

impl From<&io::Error> for ReplyOutcome {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ReplyOutcome::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable => ReplyOutcome::NetworkUnreachable,
            io::ErrorKind::HostUnreachable => ReplyOutcome::HostUnreachable,
            io::ErrorKind::TimedOut => ReplyOutcome::HostUnreachable,
            io::ErrorKind::AddrNotAvailable => ReplyOutcome::HostUnreachable,
            io::ErrorKind::NotFound => ReplyOutcome::HostUnreachable,
            io::ErrorKind::PermissionDenied => ReplyOutcome::RulesetDenied,
            _ => ReplyOutcome::GeneralFailure,
        }
    }
}
