//! Server-side handshake
//!
//! Mirrors the client negotiator: detect the dialect from the first byte,
//! authenticate SOCKS5 clients if required, parse the CONNECT request,
//! dial the target and answer with a version-appropriate reply.
//!
//! Frames are decoded incrementally from a buffer, so a client that
//! pipelines its frames (or sends application data right after the
//! request) loses nothing: extra bytes are forwarded to the target.

use super::auth::{self, CredentialVerifier};
use crate::error::{ReplyOutcome, SocksError};
use crate::protocol::consts::*;
use crate::protocol::socks5::Socks5Request;
use crate::protocol::{socks4, socks5};
use crate::protocol::{AuthMethod, ProtocolVersion, Target, TargetAddr};
use crate::transport::{Connector, Resolver};
use bytes::{Buf, BytesMut};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Largest handshake frame a client may send
const MAX_FRAME_LEN: usize = 1024;

/// Result of a successful server handshake
#[derive(Debug)]
pub struct Handshake<S, T> {
    /// Client stream, positioned after its CONNECT request
    pub client: S,
    /// Stream to the requested target
    pub upstream: T,
    /// What the client asked for
    pub target: Target,
    /// Dialect the client spoke
    pub version: ProtocolVersion,
}

/// Server-side negotiation settings and collaborators
#[derive(Debug)]
pub struct ServerNegotiator<C: Connector> {
    /// Dialect to serve, `None` for all
    version: Option<ProtocolVersion>,
    verifier: Arc<dyn CredentialVerifier>,
    resolver: Arc<dyn Resolver>,
    connector: C,
}

impl<C: Connector> ServerNegotiator<C> {
    /// Create a negotiator
    pub fn new(
        version: Option<ProtocolVersion>,
        verifier: Arc<dyn CredentialVerifier>,
        resolver: Arc<dyn Resolver>,
        connector: C,
    ) -> Self {
        ServerNegotiator {
            version,
            verifier,
            resolver,
            connector,
        }
    }

    /// Run the handshake on an accepted client stream
    ///
    /// On failure the appropriate rejection (if any) has been sent and the
    /// client stream is dropped.
    pub async fn negotiate<S>(&self, mut client: S) -> Result<Handshake<S, C::Stream>, SocksError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut reader = FrameReader::new();
        let marker = reader.next(&mut client, peek_marker).await?;
        let version = self.detect_version(marker)?;
        debug!("Client speaks {}", version);

        let (mut upstream, target) = match version {
            ProtocolVersion::Socks4 | ProtocolVersion::Socks4a => {
                self.negotiate_socks4(&mut client, &mut reader, version).await?
            }
            ProtocolVersion::Socks5 => self.negotiate_socks5(&mut client, &mut reader).await?,
        };

        // Data the client sent ahead of the reply
        if reader.buf.has_remaining() {
            debug!("Forwarding {} early bytes to {}", reader.buf.len(), target);
            upstream.write_all(&reader.buf).await?;
        }

        info!("{} tunnel established to {}", version, target);
        Ok(Handshake {
            client,
            upstream,
            target,
            version,
        })
    }

    fn detect_version(&self, marker: u8) -> Result<ProtocolVersion, SocksError> {
        match (self.version, marker) {
            (Some(version), marker) if version.request_marker() == marker => Ok(version),
            (None, SOCKS4_VERSION) => Ok(ProtocolVersion::Socks4a),
            (None, SOCKS5_VERSION) => Ok(ProtocolVersion::Socks5),
            (version, actual) => {
                let expected = version.unwrap_or_default().request_marker();
                debug!("Closing client with version byte {:#04x}", actual);
                Err(SocksError::ProtocolMismatch { expected, actual })
            }
        }
    }

    async fn negotiate_socks4<S>(
        &self,
        client: &mut S,
        reader: &mut FrameReader,
        version: ProtocolVersion,
    ) -> Result<(C::Stream, Target), SocksError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let request = reader.next(client, socks4::decode_request).await?;
        debug!(
            "SOCKS4 request: cmd={:#04x} user_id={:?}",
            request.command,
            String::from_utf8_lossy(&request.user_id)
        );

        let rejected = if request.command != SOCKS4_CMD_CONNECT {
            Some(ReplyOutcome::CommandNotSupported)
        } else if self.verifier.requires_auth() {
            warn!("Refusing SOCKS4 client, authentication is required");
            Some(ReplyOutcome::RulesetDenied)
        } else if request.hostname.is_some() && version == ProtocolVersion::Socks4 {
            Some(ReplyOutcome::AddressTypeNotSupported)
        } else {
            None
        };
        if let Some(outcome) = rejected {
            send_socks4_reply(client, outcome, None).await?;
            return Err(SocksError::Rejected(outcome));
        }

        let target = match request.hostname {
            Some(host) => Target::new(host, request.port),
            None => Target::new(request.ip.to_string(), request.port),
        };
        let target = match target {
            Ok(target) => target,
            Err(e) => {
                send_socks4_reply(client, ReplyOutcome::RequestRejected, None).await?;
                return Err(e);
            }
        };
        if is_unspecified(&target) {
            warn!("Refusing CONNECT to unspecified address {}", target);
            send_socks4_reply(client, ReplyOutcome::RulesetDenied, None).await?;
            return Err(SocksError::Rejected(ReplyOutcome::RulesetDenied));
        }

        match self.dial(&target).await {
            Ok((upstream, addr)) => {
                let bound = match addr {
                    SocketAddr::V4(v4) => Some(v4),
                    SocketAddr::V6(_) => None,
                };
                send_socks4_reply(client, ReplyOutcome::Granted, bound).await?;
                Ok((upstream, target))
            }
            Err(e) => {
                send_socks4_reply(client, ReplyOutcome::RequestRejected, None).await?;
                Err(e)
            }
        }
    }

    async fn negotiate_socks5<S>(
        &self,
        client: &mut S,
        reader: &mut FrameReader,
    ) -> Result<(C::Stream, Target), SocksError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let offered = reader.next(client, socks5::decode_greeting).await?;
        let method = auth::select_method(&offered, self.verifier.requires_auth());
        debug!("Client offered {:02x?}, selected {:?}", offered, method);

        client
            .write_all(&socks5::encode_method_selection(method))
            .await?;
        client.flush().await?;

        match method {
            None => return Err(SocksError::NoAcceptableMethod),
            Some(AuthMethod::None) => {}
            Some(AuthMethod::UsernamePassword) => {
                let auth = reader.next(client, socks5::decode_user_pass_auth).await?;
                let accepted = self.verifier.verify(&auth.username, &auth.password);

                client.write_all(&socks5::encode_auth_status(accepted)).await?;
                client.flush().await?;

                if !accepted {
                    warn!(
                        "Authentication failed for user {:?}",
                        String::from_utf8_lossy(&auth.username)
                    );
                    return Err(SocksError::AuthenticationFailed);
                }
                debug!(
                    "Authenticated user {:?}",
                    String::from_utf8_lossy(&auth.username)
                );
            }
        }

        let request = match reader.next(client, socks5::decode_connect_request).await {
            Ok(request) => request,
            Err(SocksError::Rejected(outcome)) => {
                send_socks5_reply(client, outcome, None).await?;
                return Err(SocksError::Rejected(outcome));
            }
            Err(e) => return Err(e),
        };
        let Socks5Request { command, target } = request;
        debug!("SOCKS5 request: cmd={:#04x} target={}", command, target);

        if command != SOCKS5_CMD_TCP_CONNECT {
            send_socks5_reply(client, ReplyOutcome::CommandNotSupported, None).await?;
            return Err(SocksError::Rejected(ReplyOutcome::CommandNotSupported));
        }

        let target = match target_from_addr(target) {
            Ok(target) => target,
            Err(e) => {
                send_socks5_reply(client, ReplyOutcome::GeneralFailure, None).await?;
                return Err(e);
            }
        };
        if is_unspecified(&target) {
            warn!("Refusing CONNECT to unspecified address {}", target);
            send_socks5_reply(client, ReplyOutcome::RulesetDenied, None).await?;
            return Err(SocksError::Rejected(ReplyOutcome::RulesetDenied));
        }

        match self.dial(&target).await {
            Ok((upstream, _)) => {
                let bound = self.connector.local_addr(&upstream);
                send_socks5_reply(client, ReplyOutcome::Granted, bound).await?;
                Ok((upstream, target))
            }
            Err(e) => {
                send_socks5_reply(client, dial_outcome(&e), None).await?;
                Err(e)
            }
        }
    }

    /// Resolve if needed and dial the target, trying each address in turn
    async fn dial(&self, target: &Target) -> Result<(C::Stream, SocketAddr), SocksError> {
        let addrs: Vec<SocketAddr> = match target.ip() {
            Some(ip) => vec![SocketAddr::new(ip, target.port())],
            None => {
                debug!("Resolving {}", target.host());
                let ips = self
                    .resolver
                    .resolve(target.host())
                    .await
                    .map_err(|source| SocksError::ResolutionFailed {
                        host: target.host().to_string(),
                        source,
                    })?;
                ips.into_iter()
                    .map(|ip| SocketAddr::new(ip, target.port()))
                    .collect()
            }
        };

        let mut last_err = None;
        for addr in addrs {
            debug!("Connecting to target {}", addr);
            match self.connector.connect(addr).await {
                Ok(stream) => return Ok((stream, addr)),
                Err(e) => {
                    debug!("Failed to connect to {}: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(SocksError::DialFailed {
            addr: target.to_string(),
            source: last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "target has no addresses")
            }),
        })
    }
}

/// Reply code for a failed target dial
fn dial_outcome(err: &SocksError) -> ReplyOutcome {
    match err {
        SocksError::ResolutionFailed { .. } => ReplyOutcome::HostUnreachable,
        SocksError::DialFailed { source, .. } => ReplyOutcome::from(source),
        _ => ReplyOutcome::GeneralFailure,
    }
}

fn target_from_addr(addr: TargetAddr) -> Result<Target, SocksError> {
    match addr {
        TargetAddr::Ip(sa) => Target::new(sa.ip().to_string(), sa.port()),
        TargetAddr::Domain(host, port) => Target::new(host, port),
    }
}

/// `0.0.0.0` and `::` name no target; dialing them reaches the proxy host itself
fn is_unspecified(target: &Target) -> bool {
    target.ip().is_some_and(|ip| ip.is_unspecified())
}

fn peek_marker(buf: &[u8]) -> Result<Option<(u8, usize)>, SocksError> {
    Ok(buf.first().map(|marker| (*marker, 0)))
}

async fn send_socks4_reply<S>(
    client: &mut S,
    outcome: ReplyOutcome,
    bound: Option<SocketAddrV4>,
) -> Result<(), SocksError>
where
    S: AsyncWrite + Unpin,
{
    let bound = bound.unwrap_or_else(|| SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
    debug!("Sending SOCKS4 reply: {}", outcome);
    client.write_all(&socks4::encode_reply(outcome, bound)).await?;
    client.flush().await?;
    Ok(())
}

async fn send_socks5_reply<S>(
    client: &mut S,
    outcome: ReplyOutcome,
    bound: Option<SocketAddr>,
) -> Result<(), SocksError>
where
    S: AsyncWrite + Unpin,
{
    debug!("Sending SOCKS5 reply: {}", outcome);
    client.write_all(&socks5::encode_reply(outcome, bound)).await?;
    client.flush().await?;
    Ok(())
}

/// Accumulates client bytes until a decoder accepts a frame
struct FrameReader {
    buf: BytesMut,
}

impl FrameReader {
    fn new() -> Self {
        FrameReader {
            buf: BytesMut::with_capacity(512),
        }
    }

    async fn next<S, T, D>(&mut self, stream: &mut S, decode: D) -> Result<T, SocksError>
    where
        S: AsyncRead + Unpin,
        D: Fn(&[u8]) -> Result<Option<(T, usize)>, SocksError>,
    {
        loop {
            if let Some((frame, consumed)) = decode(&self.buf)? {
                self.buf.advance(consumed);
                return Ok(frame);
            }
            if self.buf.len() >= MAX_FRAME_LEN {
                return Err(SocksError::MalformedReply(format!(
                    "handshake frame exceeds {} bytes",
                    MAX_FRAME_LEN
                )));
            }
            if stream.read_buf(&mut self.buf).await? == 0 {
                return Err(SocksError::ConnectionClosed);
            }
        }
    }
}
