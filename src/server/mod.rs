//! Server module for Sockslink
//!
//! Accepts SOCKS4, SOCKS4a and SOCKS5 clients, negotiates with them, dials
//! the requested target and relays bytes until either side closes.

pub mod auth;
pub mod negotiator;
mod relay;

pub use auth::{CredentialVerifier, StaticCredentials};
pub use negotiator::{Handshake, ServerNegotiator};
pub use relay::relay;

use crate::config::ServerConfig;
use crate::error::SocksError;
use crate::transport::{Connector, Resolver, SocketOpts, SystemResolver, TcpConnector};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// SOCKS server
#[derive(Debug)]
pub struct Server<C: Connector = TcpConnector> {
    /// Handshake logic, shared by every connection
    negotiator: Arc<ServerNegotiator<C>>,
    /// Bound on a single client's handshake
    handshake_timeout: Duration,
    /// Options applied to accepted client sockets
    socket_opts: SocketOpts,
}

impl<C: Connector> Clone for Server<C> {
    fn clone(&self) -> Self {
        Server {
            negotiator: self.negotiator.clone(),
            handshake_timeout: self.handshake_timeout,
            socket_opts: self.socket_opts.clone(),
        }
    }
}

impl Server<TcpConnector> {
    /// Create a server with the configured users, system resolver and TCP
    pub fn from_config(config: &ServerConfig) -> Result<Self, SocksError> {
        let verifier = StaticCredentials::new(
            config
                .users
                .iter()
                .map(|(user, pass)| (user.as_bytes(), pass.as_bytes())),
        );
        let connector = TcpConnector::from_tcp_config(&config.tcp)
            .with_connect_timeout(config.connect_timeout);

        Server::new(config, Arc::new(verifier), Arc::new(SystemResolver), connector)
    }
}

impl<C: Connector> Server<C> {
    /// Create a server with explicit collaborators
    pub fn new(
        config: &ServerConfig,
        verifier: Arc<dyn CredentialVerifier>,
        resolver: Arc<dyn Resolver>,
        connector: C,
    ) -> Result<Self, SocksError> {
        config.validate()?;

        Ok(Server {
            negotiator: Arc::new(ServerNegotiator::new(
                config.protocol_version,
                verifier,
                resolver,
                connector,
            )),
            handshake_timeout: config.handshake_timeout,
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
        })
    }

    /// Negotiate with a client and dial its target, without relaying
    pub async fn handshake<S>(&self, stream: S) -> Result<Handshake<S, C::Stream>, SocksError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        tokio::time::timeout(self.handshake_timeout, self.negotiator.negotiate(stream))
            .await
            .map_err(|_| SocksError::TimeoutExceeded(self.handshake_timeout))?
    }

    /// Serve one client: handshake, then relay until either side closes
    pub async fn handle<S>(&self, stream: S) -> Result<(), SocksError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let handshake = self.handshake(stream).await?;
        relay(handshake.client, handshake.upstream).await?;
        Ok(())
    }

    /// Accept clients until `shutdown` is cancelled
    ///
    /// Every connection runs in its own task; on shutdown they are
    /// cancelled and awaited.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), SocksError> {
        info!("Listening on {}", listener.local_addr()?);
        let tasks = TaskTracker::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    debug!("Accepted connection from {}", peer);

                    if let Err(e) = self.socket_opts.apply(&stream) {
                        warn!("Failed to apply socket options: {}", e);
                    }

                    let server = self.clone();
                    let cancel = shutdown.child_token();
                    tasks.spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                debug!("Connection from {} closed on shutdown", peer);
                            }
                            result = server.handle(stream) => match result {
                                Ok(()) => debug!("Connection from {} finished", peer),
                                Err(SocksError::ConnectionClosed) => {
                                    debug!("Connection from {} closed early", peer)
                                }
                                Err(e) => warn!("Connection from {} failed: {}", peer, e),
                            },
                        }
                    });
                }
            }
        }

        tasks.close();
        tasks.wait().await;
        info!("Server stopped");
        Ok(())
    }
}
