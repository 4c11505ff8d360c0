//! Transport module for Sockslink
//!
//! The negotiators never touch sockets directly. They talk to an abstract
//! duplex stream and reach the network through two seams:
//!
//! - [`Resolver`] turns a hostname into addresses
//! - [`Connector`] dials an address and yields a stream
//!
//! [`SystemResolver`] and [`TcpConnector`] are the production
//! implementations; tests plug in in-memory ones.

mod resolver;
mod tcp;
#[cfg(feature = "rustls-tls")]
pub mod tls;

pub use resolver::SystemResolver;
pub use tcp::TcpConnector;
#[cfg(feature = "rustls-tls")]
pub use tls::{SecureUpgrader, TlsStream};

use crate::config::TcpConfig;
use async_trait::async_trait;
use std::fmt::Debug;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Socket options for configuring connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: Some(config.keepalive_secs),
            keepalive_interval: Some(config.keepalive_interval),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Hostname lookup used when resolution happens locally
#[async_trait]
pub trait Resolver: Debug + Send + Sync + 'static {
    /// Resolve `host` to one or more addresses, in preference order
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Dialer producing the raw byte stream
///
/// Implementations must be usable concurrently from many attempts.
#[async_trait]
pub trait Connector: Debug + Send + Sync + 'static {
    /// The stream type produced by this connector
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync + Debug + 'static;

    /// Connect to a remote address
    async fn connect(&self, addr: SocketAddr) -> io::Result<Self::Stream>;

    /// Local address of a stream this connector produced, if it has one
    fn local_addr(&self, _stream: &Self::Stream) -> Option<SocketAddr> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_opts_default() {
        let opts = SocketOpts::default();
        assert!(opts.nodelay);
        assert_eq!(opts.keepalive_secs, Some(20));
        assert_eq!(opts.keepalive_interval, Some(8));
    }

    #[test]
    fn test_socket_opts_from_tcp_config() {
        let config = TcpConfig {
            nodelay: false,
            keepalive_secs: 60,
            keepalive_interval: 15,
        };
        let opts = SocketOpts::from_tcp_config(&config);
        assert!(!opts.nodelay);
        assert_eq!(opts.keepalive_secs, Some(60));
        assert_eq!(opts.keepalive_interval, Some(15));
    }

    #[tokio::test]
    async fn test_socket_opts_apply() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stream, _) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let stream = stream.unwrap();

        SocketOpts::default().apply(&stream).unwrap();
        assert!(stream.nodelay().unwrap());
    }
}
