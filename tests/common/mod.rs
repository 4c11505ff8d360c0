//! Test utilities and mocks for Sockslink
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sockslink::client::Client;
use sockslink::config::{ClientConfig, ServerConfig};
use sockslink::protocol::ProtocolVersion;
use sockslink::server::{Server, StaticCredentials};
use sockslink::transport::{Resolver, TcpConnector};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Hostname every test resolver maps to loopback
pub const TEST_HOST: &str = "example.com";

/// Resolver backed by a fixed table, unknown names fail with NotFound
#[derive(Debug, Clone)]
pub struct MapResolver {
    hosts: HashMap<String, IpAddr>,
}

impl Default for MapResolver {
    fn default() -> Self {
        let mut hosts = HashMap::new();
        hosts.insert(TEST_HOST.to_string(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        MapResolver { hosts }
    }
}

#[async_trait]
impl Resolver for MapResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.hosts
            .get(host)
            .map(|ip| vec![*ip])
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown host {}", host)))
    }
}

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Spawn a TCP echo server
pub async fn spawn_echo_target() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Spawn a peer that answers every connection with plaintext and closes
pub async fn spawn_plaintext_target() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                    .await;
            });
        }
    });
    addr
}

/// Spawn a TLS echo server with a fresh self-signed certificate for `name`
///
/// Returns the address and the certificate as PEM.
#[cfg(feature = "rustls-tls")]
pub async fn spawn_tls_echo_target(name: &str) -> (SocketAddr, String) {
    use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use tokio_rustls::rustls::ServerConfig as TlsServerConfig;
    use tokio_rustls::TlsAcceptor;

    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec![name.to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    let config = TlsServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(stream) = acceptor.accept(stream).await {
                    let (mut reader, mut writer) = tokio::io::split(stream);
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                }
            });
        }
    });

    (addr, cert.pem())
}

/// Spawn a proxy that accepts one connection and never answers
///
/// The receiver fires once the client side of that connection is closed.
pub async fn spawn_silent_proxy() -> (SocketAddr, oneshot::Receiver<()>) {
    let (listener, addr) = create_test_listener().await;
    let (closed_tx, closed_rx) = oneshot::channel();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            let _ = closed_tx.send(());
        }
    });
    (addr, closed_rx)
}

/// Spawn a proxy that answers the first read with fixed bytes
pub async fn spawn_scripted_proxy(reply: &'static [u8]) -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(reply).await;
            let _ = stream.read(&mut buf).await;
        }
    });
    addr
}

/// Server configuration for tests
pub fn server_config(version: Option<ProtocolVersion>, users: &[(&str, &str)]) -> ServerConfig {
    ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        protocol_version: version,
        handshake_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        users: users
            .iter()
            .map(|(u, p)| (u.to_string(), p.to_string()))
            .collect(),
        ..Default::default()
    }
}

/// Spawn a SOCKS server using [`MapResolver`]; cancel the token to stop it
pub async fn spawn_server(config: ServerConfig) -> (SocketAddr, CancellationToken) {
    let verifier = StaticCredentials::new(
        config
            .users
            .iter()
            .map(|(u, p)| (u.as_bytes().to_vec(), p.as_bytes().to_vec())),
    );
    let connector = TcpConnector::default().with_connect_timeout(config.connect_timeout);
    let server = Server::new(
        &config,
        Arc::new(verifier),
        Arc::new(MapResolver::default()),
        connector,
    )
    .unwrap();

    let (listener, addr) = create_test_listener().await;
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move { server.serve(listener, token).await });

    (addr, shutdown)
}

/// Client configuration for tests
pub fn client_config(proxy: SocketAddr, version: ProtocolVersion, resolve_local: bool) -> ClientConfig {
    let mut config = ClientConfig::new(proxy.to_string());
    config.protocol_version = version;
    config.resolve_local = resolve_local;
    config.timeout = Duration::from_secs(5);
    config
}

/// Client using [`MapResolver`] and plain TCP
pub fn client(config: &ClientConfig) -> Client {
    Client::new(config, Arc::new(MapResolver::default()), TcpConnector::default()).unwrap()
}

/// Write `payload` through `stream` and expect it echoed back
pub async fn assert_echo<S>(stream: &mut S, payload: &[u8])
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    stream.write_all(payload).await.unwrap();
    stream.flush().await.unwrap();
    let mut echoed = vec![0u8; payload.len()];
    stream.read_exact(&mut echoed).await.unwrap();
    assert_eq!(echoed, payload);
}
