//! Client-side handshake
//!
//! Drives one SOCKS4, SOCKS4a or SOCKS5 negotiation over a stream that is
//! already connected to the proxy. Replies are read with exact sizes, so on
//! success the stream is positioned at the first byte of tunnel data.

use super::supervisor::{NegotiationState, StateTracker};
use crate::config::ClientConfig;
use crate::error::SocksError;
use crate::protocol::consts::*;
use crate::protocol::{socks4, socks5};
use crate::protocol::{AuthMethod, Credentials, ProtocolVersion, ResolutionMode, Target, TargetAddr};
use crate::transport::Resolver;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Per-client negotiation parameters, fixed for every attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationParams {
    /// Dialect to speak
    pub version: ProtocolVersion,
    /// Who resolves hostnames
    pub mode: ResolutionMode,
    /// SOCKS5 credentials, also the SOCKS4 user id
    pub credentials: Option<Credentials>,
}

impl NegotiationParams {
    /// Extract the parameters from a validated client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, SocksError> {
        Ok(NegotiationParams {
            version: config.protocol_version,
            mode: config.resolution_mode(),
            credentials: config.credentials()?,
        })
    }

    /// Methods offered in the SOCKS5 greeting
    pub fn auth_methods(&self) -> Vec<AuthMethod> {
        match self.credentials {
            Some(_) => vec![AuthMethod::None, AuthMethod::UsernamePassword],
            None => vec![AuthMethod::None],
        }
    }
}

/// Negotiate a CONNECT to `target`, returning the proxy's bound address
pub async fn negotiate<S>(
    stream: &mut S,
    target: &Target,
    params: &NegotiationParams,
    resolver: &dyn Resolver,
    state: &StateTracker,
) -> Result<TargetAddr, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    match params.version {
        ProtocolVersion::Socks4 | ProtocolVersion::Socks4a => {
            negotiate_socks4(stream, target, params, resolver, state).await
        }
        ProtocolVersion::Socks5 => negotiate_socks5(stream, target, params, resolver, state).await,
    }
}

async fn negotiate_socks4<S>(
    stream: &mut S,
    target: &Target,
    params: &NegotiationParams,
    resolver: &dyn Resolver,
    state: &StateTracker,
) -> Result<TargetAddr, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let resolved = match (target.ip(), params.mode) {
        (Some(_), _) => None,
        (None, ResolutionMode::Local) => {
            let addrs = resolve_local(target, resolver).await?;
            let ip = addrs
                .into_iter()
                .find_map(|ip| match ip {
                    IpAddr::V4(v4) => Some(v4),
                    IpAddr::V6(_) => None,
                })
                .ok_or_else(|| SocksError::ResolutionFailed {
                    host: target.host().to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no IPv4 address"),
                })?;
            Some(ip)
        }
        (None, ResolutionMode::Remote) if !params.version.supports_remote_resolution() => {
            return Err(SocksError::InvalidConfig(
                "SOCKS4 cannot resolve remotely, use 4a or 5".to_string(),
            ));
        }
        (None, ResolutionMode::Remote) => None,
    };

    let user_id = params
        .credentials
        .as_ref()
        .map(Credentials::username)
        .unwrap_or_default();
    let request = socks4::encode_request(target, resolved, user_id)?;

    state.advance(NegotiationState::ConnectRequesting);
    debug!("Sending {} CONNECT request for {}", params.version, target);
    stream.write_all(&request).await?;
    stream.flush().await?;

    state.advance(NegotiationState::ReplyAwaiting);
    let mut reply = [0u8; SOCKS4_REPLY_LEN];
    read_marker(stream, &mut reply, params.version).await?;
    stream.read_exact(&mut reply[1..]).await?;

    let reply = socks4::decode_reply(&reply)?;
    debug!("Received SOCKS4 reply: {}", reply.outcome);
    if !reply.outcome.is_granted() {
        return Err(SocksError::Rejected(reply.outcome));
    }

    Ok(TargetAddr::Ip(SocketAddr::V4(reply.bound)))
}

async fn negotiate_socks5<S>(
    stream: &mut S,
    target: &Target,
    params: &NegotiationParams,
    resolver: &dyn Resolver,
    state: &StateTracker,
) -> Result<TargetAddr, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    // Resolve before anything is written
    let request_target = match (target.ip(), params.mode) {
        (None, ResolutionMode::Local) => {
            let addrs = resolve_local(target, resolver).await?;
            Target::new(addrs[0].to_string(), target.port())?
        }
        _ => target.clone(),
    };
    let request = socks5::encode_connect_request(&request_target, params.mode)?;

    state.advance(NegotiationState::VersionGreeting);
    let methods = params.auth_methods();
    debug!("Sending SOCKS5 greeting offering {:?}", methods);
    stream.write_all(&socks5::encode_greeting(&methods)).await?;
    stream.flush().await?;

    state.advance(NegotiationState::AuthNegotiating);
    let mut selection = [0u8; 2];
    read_marker(stream, &mut selection, params.version).await?;
    stream.read_exact(&mut selection[1..]).await?;
    let method = socks5::decode_method_selection(&selection)?;
    debug!("Server selected auth method {:?}", method);

    match method {
        AuthMethod::None => {}
        AuthMethod::UsernamePassword => {
            let credentials = params.credentials.as_ref().ok_or_else(|| {
                SocksError::MalformedReply("server selected a method that was not offered".to_string())
            })?;
            state.advance(NegotiationState::AuthVerifying);
            debug!(
                "Authenticating as {}",
                String::from_utf8_lossy(credentials.username())
            );
            stream
                .write_all(&socks5::encode_user_pass_auth(credentials))
                .await?;
            stream.flush().await?;

            let mut status = [0u8; 2];
            stream.read_exact(&mut status).await?;
            socks5::decode_auth_status(&status)?;
            debug!("Authentication succeeded");
        }
    }

    state.advance(NegotiationState::ConnectRequesting);
    debug!("Sending SOCKS5 CONNECT request for {}", request_target);
    stream.write_all(&request).await?;
    stream.flush().await?;

    state.advance(NegotiationState::ReplyAwaiting);
    let reply = read_connect_reply(stream).await?;
    let reply = socks5::decode_connect_reply(&reply)?;
    debug!("Received SOCKS5 reply: {} (bound {})", reply.outcome, reply.bound);
    if !reply.outcome.is_granted() {
        return Err(SocksError::Rejected(reply.outcome));
    }

    Ok(reply.bound)
}

/// Read the first reply byte and check it against the dialect's marker
async fn read_marker<S>(
    stream: &mut S,
    buf: &mut [u8],
    version: ProtocolVersion,
) -> Result<(), SocksError>
where
    S: AsyncRead + Unpin,
{
    stream.read_exact(&mut buf[..1]).await?;
    let expected = version.reply_marker();
    if buf[0] != expected {
        return Err(SocksError::ProtocolMismatch {
            expected,
            actual: buf[0],
        });
    }
    Ok(())
}

/// Read exactly one variable-length CONNECT reply
async fn read_connect_reply<S>(stream: &mut S) -> Result<Vec<u8>, SocksError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; SOCKS5_HEADER_LEN];
    stream.read_exact(&mut buf).await?;

    if buf[3] == SOCKS5_ADDR_TYPE_DOMAIN {
        buf.push(0);
        stream.read_exact(&mut buf[SOCKS5_HEADER_LEN..]).await?;
    }

    let total = socks5::frame_len(&buf)?
        .ok_or_else(|| SocksError::MalformedReply("incomplete reply header".to_string()))?;
    let have = buf.len();
    buf.resize(total, 0);
    stream.read_exact(&mut buf[have..]).await?;

    Ok(buf)
}

async fn resolve_local(target: &Target, resolver: &dyn Resolver) -> Result<Vec<IpAddr>, SocksError> {
    debug!("Resolving {} locally", target.host());
    let addrs = resolver
        .resolve(target.host())
        .await
        .map_err(|source| SocksError::ResolutionFailed {
            host: target.host().to_string(),
            source,
        })?;

    if addrs.is_empty() {
        return Err(SocksError::ResolutionFailed {
            host: target.host().to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
        });
    }
    Ok(addrs)
}
