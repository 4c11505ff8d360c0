//! End-to-end tunnels through the SOCKS server

mod common;

use common::*;
use sockslink::protocol::{ProtocolVersion, TargetAddr};
use sockslink::{NegotiationState, ReplyOutcome, SocksError};

#[tokio::test]
async fn test_socks4_local_resolution() {
    let target = spawn_echo_target().await;
    let (proxy, _shutdown) = spawn_server(server_config(None, &[])).await;

    let client = client(&client_config(proxy, ProtocolVersion::Socks4, true));
    let attempt = client.connect(TEST_HOST, target.port());
    let handle = attempt.handle();

    let mut tunnel = attempt.await.unwrap();
    assert_eq!(handle.state(), NegotiationState::Established);
    assert_echo(&mut tunnel, b"socks4").await;
}

#[tokio::test]
async fn test_socks4a_remote_resolution() {
    let target = spawn_echo_target().await;
    let (proxy, _shutdown) = spawn_server(server_config(Some(ProtocolVersion::Socks4a), &[])).await;

    let client = client(&client_config(proxy, ProtocolVersion::Socks4a, false));
    let mut tunnel = client.connect(TEST_HOST, target.port()).await.unwrap();

    assert_eq!(tunnel.target().host(), TEST_HOST);
    assert_echo(&mut tunnel, b"socks4a").await;
}

#[tokio::test]
async fn test_socks5_local_resolution() {
    let target = spawn_echo_target().await;
    let (proxy, _shutdown) = spawn_server(server_config(Some(ProtocolVersion::Socks5), &[])).await;

    let client = client(&client_config(proxy, ProtocolVersion::Socks5, true));
    let mut tunnel = client.connect(TEST_HOST, target.port()).await.unwrap();

    // The server reports the local end of its target connection
    assert!(matches!(tunnel.bound_addr(), TargetAddr::Ip(addr) if addr.ip().is_loopback()));
    assert_echo(&mut tunnel, b"socks5").await;
}

#[tokio::test]
async fn test_socks5_remote_resolution() {
    let target = spawn_echo_target().await;
    let (proxy, _shutdown) = spawn_server(server_config(None, &[])).await;

    let client = client(&client_config(proxy, ProtocolVersion::Socks5, false));
    let mut tunnel = client.connect(TEST_HOST, target.port()).await.unwrap();
    assert_echo(&mut tunnel, b"socks5 remote").await;
}

#[tokio::test]
async fn test_socks5_matching_credentials() {
    let target = spawn_echo_target().await;
    let (proxy, _shutdown) = spawn_server(server_config(None, &[("name", "pass")])).await;

    let mut config = client_config(proxy, ProtocolVersion::Socks5, true);
    config.username = Some("name".to_string());
    config.password = Some("pass".to_string());

    let mut tunnel = client(&config).connect("127.0.0.1", target.port()).await.unwrap();
    assert_echo(&mut tunnel, b"authenticated").await;
}

#[tokio::test]
async fn test_socks5_credentials_unused_by_anonymous_server() {
    let target = spawn_echo_target().await;
    let (proxy, _shutdown) = spawn_server(server_config(None, &[])).await;

    let mut config = client_config(proxy, ProtocolVersion::Socks5, true);
    config.username = Some("name".to_string());
    config.password = Some("pass".to_string());

    let mut tunnel = client(&config).connect("127.0.0.1", target.port()).await.unwrap();
    assert_echo(&mut tunnel, b"anonymous").await;
}

#[tokio::test]
async fn test_socks5_missing_credentials() {
    let target = spawn_echo_target().await;
    let (proxy, _shutdown) = spawn_server(server_config(None, &[("name", "pass")])).await;

    let client = client(&client_config(proxy, ProtocolVersion::Socks5, true));
    let attempt = client.connect("127.0.0.1", target.port());
    let handle = attempt.handle();

    let err = attempt.await.unwrap_err();
    assert!(matches!(err, SocksError::NoAcceptableMethod));
    assert_eq!(handle.state(), NegotiationState::Failed);
}

#[tokio::test]
async fn test_socks5_wrong_credentials() {
    let target = spawn_echo_target().await;
    let (proxy, _shutdown) = spawn_server(server_config(None, &[("name", "pass")])).await;

    let mut config = client_config(proxy, ProtocolVersion::Socks5, true);
    config.username = Some("name".to_string());
    config.password = Some("wrong".to_string());

    let err = client(&config)
        .connect("127.0.0.1", target.port())
        .await
        .unwrap_err();
    assert!(matches!(err, SocksError::AuthenticationFailed));
}

#[tokio::test]
async fn test_version_mismatch_never_establishes() {
    let target = spawn_echo_target().await;

    let (proxy, _shutdown) = spawn_server(server_config(Some(ProtocolVersion::Socks5), &[])).await;
    let client4 = client(&client_config(proxy, ProtocolVersion::Socks4, true));
    let attempt = client4.connect("127.0.0.1", target.port());
    let handle = attempt.handle();
    assert!(attempt.await.is_err());
    assert_eq!(handle.state(), NegotiationState::Failed);

    let (proxy, _shutdown) = spawn_server(server_config(Some(ProtocolVersion::Socks4), &[])).await;
    let client5 = client(&client_config(proxy, ProtocolVersion::Socks5, true));
    assert!(client5.connect("127.0.0.1", target.port()).await.is_err());
}

#[tokio::test]
async fn test_socks4_reply_to_socks5_client_is_protocol_mismatch() {
    let proxy = spawn_scripted_proxy(&[0x00, 0x5B, 0, 0, 0, 0, 0, 0]).await;

    let client = client(&client_config(proxy, ProtocolVersion::Socks5, true));
    let err = client.connect("127.0.0.1", 80).await.unwrap_err();
    assert!(matches!(
        err,
        SocksError::ProtocolMismatch {
            expected: 0x05,
            actual: 0x00
        }
    ));
}

#[tokio::test]
async fn test_unreachable_target_is_rejected() {
    // Bind then drop to get a port nothing listens on
    let (listener, unused) = create_test_listener().await;
    drop(listener);
    let (proxy, _shutdown) = spawn_server(server_config(None, &[])).await;

    let socks5 = client(&client_config(proxy, ProtocolVersion::Socks5, true));
    let err = socks5.connect("127.0.0.1", unused.port()).await.unwrap_err();
    assert_eq!(err.reply_outcome(), Some(ReplyOutcome::ConnectionRefused));

    let socks4 = client(&client_config(proxy, ProtocolVersion::Socks4, true));
    let err = socks4.connect("127.0.0.1", unused.port()).await.unwrap_err();
    assert_eq!(err.reply_outcome(), Some(ReplyOutcome::RequestRejected));
}

#[tokio::test]
async fn test_invalid_domain_fails_resolution() {
    let (proxy, _shutdown) = spawn_server(server_config(None, &[])).await;

    let local = client(&client_config(proxy, ProtocolVersion::Socks5, true));
    let err = local.connect("invalid.invalid", 80).await.unwrap_err();
    assert!(matches!(err, SocksError::ResolutionFailed { .. }));

    // With remote resolution the proxy reports it instead
    let remote = client(&client_config(proxy, ProtocolVersion::Socks5, false));
    let err = remote.connect("invalid.invalid", 80).await.unwrap_err();
    assert_eq!(err.reply_outcome(), Some(ReplyOutcome::HostUnreachable));
}

#[tokio::test]
async fn test_concurrent_attempts_are_independent() {
    let target = spawn_echo_target().await;
    let (proxy, _shutdown) = spawn_server(server_config(None, &[])).await;
    let client = client(&client_config(proxy, ProtocolVersion::Socks5, false));

    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let attempt = client.connect(TEST_HOST, target.port());
        tasks.push(tokio::spawn(async move {
            let mut tunnel = attempt.await.unwrap();
            assert_echo(&mut tunnel, &[i; 16]).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_server_shutdown_closes_tunnels() {
    let target = spawn_echo_target().await;
    let (proxy, shutdown) = spawn_server(server_config(None, &[])).await;

    let client = client(&client_config(proxy, ProtocolVersion::Socks5, true));
    let mut tunnel = client.connect("127.0.0.1", target.port()).await.unwrap();
    assert_echo(&mut tunnel, b"before").await;

    shutdown.cancel();

    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(std::time::Duration::from_secs(2), tunnel.read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
}
