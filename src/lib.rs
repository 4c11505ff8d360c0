//! # Sockslink - SOCKS4/4a/5 Client and Server
//!
//! Sockslink opens TCP tunnels through SOCKS proxies and serves SOCKS
//! clients. Both sides share one wire codec and one error taxonomy, so a
//! failed attempt always says precisely what went wrong: wrong
//! credentials, wrong dialect, unreachable target, timeout or
//! cancellation.
//!
//! ## Features
//!
//! - **Three dialects**: SOCKS4, SOCKS4a and SOCKS5 (RFC 1928) with
//!   username/password authentication (RFC 1929)
//! - **Resolution policy**: resolve locally, or hand the hostname to the proxy
//! - **Supervised attempts**: one deadline per attempt, cooperative
//!   cancellation, observable negotiation state
//! - **TLS upgrade**: run a TLS handshake over an established tunnel
//! - **Server**: version auto-detection, static users, full-duplex relay
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sockslink::client::Client;
//! use sockslink::config::ClientConfig;
//! use tokio::io::AsyncWriteExt;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::from_config(&ClientConfig::new("127.0.0.1:1080"))?;
//!     let mut tunnel = client.connect("example.com", 80).await?;
//!     tunnel.write_all(b"GET / HTTP/1.0\r\n\r\n").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Client ──(ConnectAttempt: dial, negotiate, [TLS])──> Proxy ──> Target
//! Client ──> Server (negotiate, dial via Connector) ──relay──> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

// Re-export commonly used items
pub use client::{Client, ConnectAttempt, NegotiationState, Tunnel};
pub use config::{load_config, Config};
pub use error::{ReplyOutcome, SocksError};
pub use server::Server;

/// Version of the Sockslink library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "sockslink");
    }
}
