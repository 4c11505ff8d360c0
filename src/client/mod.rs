//! Client module for Sockslink
//!
//! This module opens tunnels through a SOCKS proxy. Each call to
//! [`Client::connect`] starts an independent, supervised attempt: dial the
//! proxy, negotiate, and hand back a [`Tunnel`].

pub mod negotiator;
pub mod supervisor;
mod tunnel;

pub use negotiator::NegotiationParams;
pub use supervisor::{AttemptContext, AttemptHandle, ConnectAttempt, NegotiationState, StateTracker};
pub use tunnel::Tunnel;

use crate::config::ClientConfig;
use crate::error::SocksError;
use crate::protocol::Target;
use crate::transport::{Connector, Resolver, SystemResolver, TcpConnector};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[cfg(feature = "rustls-tls")]
use crate::transport::{SecureUpgrader, TlsStream};

/// SOCKS client
///
/// Cheap to clone; concurrent attempts share nothing but the resolver and
/// the connector.
#[derive(Debug)]
pub struct Client<C: Connector = TcpConnector> {
    /// Proxy address
    proxy: Target,
    /// Negotiation parameters
    params: Arc<NegotiationParams>,
    /// Default attempt timeout
    timeout: Duration,
    /// Resolver for local resolution and the proxy address
    resolver: Arc<dyn Resolver>,
    /// Dialer for the proxy connection
    connector: Arc<C>,
}

impl<C: Connector> Clone for Client<C> {
    fn clone(&self) -> Self {
        Client {
            proxy: self.proxy.clone(),
            params: self.params.clone(),
            timeout: self.timeout,
            resolver: self.resolver.clone(),
            connector: self.connector.clone(),
        }
    }
}

impl Client<TcpConnector> {
    /// Create a client using the system resolver and plain TCP
    pub fn from_config(config: &ClientConfig) -> Result<Self, SocksError> {
        let connector =
            TcpConnector::from_tcp_config(&config.tcp).with_connect_timeout(config.timeout);
        Client::new(config, Arc::new(SystemResolver), connector)
    }
}

impl<C: Connector> Client<C> {
    /// Create a client with explicit collaborators
    pub fn new(
        config: &ClientConfig,
        resolver: Arc<dyn Resolver>,
        connector: C,
    ) -> Result<Self, SocksError> {
        config.validate()?;

        Ok(Client {
            proxy: config.proxy_target()?,
            params: Arc::new(NegotiationParams::from_config(config)?),
            timeout: config.timeout,
            resolver,
            connector: Arc::new(connector),
        })
    }

    /// Open a tunnel to `host:port` with the configured timeout
    pub fn connect(&self, host: &str, port: u16) -> ConnectAttempt<Tunnel<C::Stream>> {
        self.connect_with(AttemptContext::new(self.timeout), host, port)
    }

    /// Open a tunnel under a caller-supplied context
    pub fn connect_with(
        &self,
        ctx: AttemptContext,
        host: &str,
        port: u16,
    ) -> ConnectAttempt<Tunnel<C::Stream>> {
        let client = self.clone();
        let host = host.to_string();

        supervisor::supervise(ctx, move |state| async move {
            let target = Target::new(host, port)?;
            client.establish(&target, &state).await
        })
    }

    /// Open a tunnel and run a TLS handshake over it, as one attempt
    #[cfg(feature = "rustls-tls")]
    pub fn connect_secure(
        &self,
        host: &str,
        port: u16,
        upgrader: &SecureUpgrader,
    ) -> ConnectAttempt<TlsStream<Tunnel<C::Stream>>> {
        self.connect_secure_with(AttemptContext::new(self.timeout), host, port, upgrader)
    }

    /// Secure variant of [`Client::connect_with`]
    #[cfg(feature = "rustls-tls")]
    pub fn connect_secure_with(
        &self,
        ctx: AttemptContext,
        host: &str,
        port: u16,
        upgrader: &SecureUpgrader,
    ) -> ConnectAttempt<TlsStream<Tunnel<C::Stream>>> {
        let client = self.clone();
        let upgrader = upgrader.clone();
        let host = host.to_string();

        supervisor::supervise(ctx, move |state| async move {
            let target = Target::new(host, port)?;
            let tunnel = client.establish(&target, &state).await?;
            upgrader.upgrade(tunnel, target.host()).await
        })
    }

    /// Proxy address
    pub fn proxy(&self) -> &Target {
        &self.proxy
    }

    /// Dial the proxy and negotiate
    async fn establish(
        &self,
        target: &Target,
        state: &StateTracker,
    ) -> Result<Tunnel<C::Stream>, SocksError> {
        state.advance(NegotiationState::Connecting);
        let mut stream = self.dial_proxy().await?;

        let bound = negotiator::negotiate(
            &mut stream,
            target,
            &self.params,
            self.resolver.as_ref(),
            state,
        )
        .await?;

        info!("Tunnel to {} established via {}", target, self.proxy);
        Ok(Tunnel::new(stream, target.clone(), bound))
    }

    async fn dial_proxy(&self) -> Result<C::Stream, SocksError> {
        let addrs: Vec<SocketAddr> = match self.proxy.ip() {
            Some(ip) => vec![SocketAddr::new(ip, self.proxy.port())],
            None => self
                .resolver
                .resolve(self.proxy.host())
                .await
                .map_err(|source| SocksError::ResolutionFailed {
                    host: self.proxy.host().to_string(),
                    source,
                })?
                .into_iter()
                .map(|ip| SocketAddr::new(ip, self.proxy.port()))
                .collect(),
        };

        let mut last_err = None;
        for addr in addrs {
            debug!("Connecting to proxy {}", addr);
            match self.connector.connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("Failed to connect to proxy {}: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(SocksError::DialFailed {
            addr: self.proxy.to_string(),
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "proxy has no addresses")
            }),
        })
    }
}
