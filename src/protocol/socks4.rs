//! SOCKS4/4a frame codec
//!
//! Pure encode/decode of SOCKS4 and SOCKS4a frames, no IO.
//!
//! # Request Format
//!
//! ```text
//! +----+----+----+----+----+----+----+----+----+----+....+----+
//! | VN | CD | DSTPORT |      DSTIP        | USERID       |NULL|
//! +----+----+----+----+----+----+----+----+----+----+....+----+
//!    1    1      2              4           variable       1
//! ```
//!
//! SOCKS4a sets DSTIP to `0.0.0.x` (x != 0) and appends the hostname,
//! itself NUL terminated, after the user id.

use super::consts::*;
use super::types::Target;
use crate::error::{ReplyOutcome, SocksError};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::{Ipv4Addr, SocketAddrV4};

/// DSTIP sent when the proxy is asked to resolve the hostname
pub const SOCKS4A_MARKER_IP: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 1);

/// Upper bound of a request: header, user id, NUL, hostname, NUL
pub const SOCKS4_MAX_REQUEST_LEN: usize = 8 + MAX_FIELD_LEN + 1 + MAX_FIELD_LEN + 1;

/// Decoded SOCKS4 reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks4Reply {
    /// Normalized reply code
    pub outcome: ReplyOutcome,
    /// Address echoed by the server (often 0.0.0.0:0)
    pub bound: SocketAddrV4,
}

/// Decoded SOCKS4/4a request, as seen by a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks4Request {
    /// Command byte (only CONNECT is served)
    pub command: u8,
    /// Destination port
    pub port: u16,
    /// Destination IP, or the SOCKS4a marker range
    pub ip: Ipv4Addr,
    /// User id, accepted verbatim
    pub user_id: Vec<u8>,
    /// Hostname when the request is SOCKS4a
    pub hostname: Option<String>,
}

/// Whether `ip` lies in the SOCKS4a reserved range `0.0.0.x`, x != 0
pub fn is_socks4a_marker(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[..3] == [0, 0, 0] && octets[3] != 0
}

/// Build a CONNECT request
///
/// With `resolved` (or an IPv4 literal host) a plain SOCKS4 frame is built;
/// otherwise the SOCKS4a form carrying the hostname.
pub fn encode_request(
    target: &Target,
    resolved: Option<Ipv4Addr>,
    user_id: &[u8],
) -> Result<Bytes, SocksError> {
    if user_id.contains(&0) {
        return Err(SocksError::InvalidConfig(
            "SOCKS4 user id must not contain NUL".to_string(),
        ));
    }

    let literal = match target.ip() {
        Some(std::net::IpAddr::V4(ip)) => Some(ip),
        Some(std::net::IpAddr::V6(_)) => {
            return Err(SocksError::InvalidTarget(format!(
                "SOCKS4 cannot address IPv6 target {}",
                target
            )))
        }
        None => None,
    };
    let ip = resolved.or(literal);

    let mut buf = BytesMut::with_capacity(9 + user_id.len() + target.host().len() + 1);
    buf.put_u8(SOCKS4_VERSION);
    buf.put_u8(SOCKS4_CMD_CONNECT);
    buf.put_u16(target.port());
    buf.put_slice(&ip.unwrap_or(SOCKS4A_MARKER_IP).octets());
    buf.put_slice(user_id);
    buf.put_u8(0x00);

    if ip.is_none() {
        buf.put_slice(target.host().as_bytes());
        buf.put_u8(0x00);
    }

    Ok(buf.freeze())
}

/// Decode the 8-byte reply
pub fn decode_reply(buf: &[u8]) -> Result<Socks4Reply, SocksError> {
    if buf.len() < SOCKS4_REPLY_LEN {
        return Err(SocksError::MalformedReply(format!(
            "SOCKS4 reply is {} bytes, expected {}",
            buf.len(),
            SOCKS4_REPLY_LEN
        )));
    }
    if buf[0] != SOCKS4_REPLY_VERSION {
        return Err(SocksError::MalformedReply(format!(
            "SOCKS4 reply version {:#04x}",
            buf[0]
        )));
    }

    let port = u16::from_be_bytes([buf[2], buf[3]]);
    let ip = Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]);

    Ok(Socks4Reply {
        outcome: ReplyOutcome::from_socks4(buf[1]),
        bound: SocketAddrV4::new(ip, port),
    })
}

/// Try to decode a request from the front of `buf`
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the request and
/// the number of bytes it occupied.
pub fn decode_request(buf: &[u8]) -> Result<Option<(Socks4Request, usize)>, SocksError> {
    if buf.len() < 8 {
        return Ok(None);
    }
    if buf[0] != SOCKS4_VERSION {
        return Err(SocksError::ProtocolMismatch {
            expected: SOCKS4_VERSION,
            actual: buf[0],
        });
    }

    let command = buf[1];
    let port = u16::from_be_bytes([buf[2], buf[3]]);
    let ip = Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]);

    let Some(user_end) = find_nul(buf, 8, MAX_FIELD_LEN)? else {
        return Ok(None);
    };
    let user_id = buf[8..user_end].to_vec();
    let mut consumed = user_end + 1;

    let hostname = if is_socks4a_marker(ip) {
        let Some(host_end) = find_nul(buf, consumed, MAX_FIELD_LEN)? else {
            return Ok(None);
        };
        let host = std::str::from_utf8(&buf[consumed..host_end])
            .map_err(|_| SocksError::MalformedReply("SOCKS4a hostname is not UTF-8".to_string()))?
            .to_string();
        if host.is_empty() {
            return Err(SocksError::MalformedReply(
                "SOCKS4a hostname is empty".to_string(),
            ));
        }
        consumed = host_end + 1;
        Some(host)
    } else {
        None
    };

    Ok(Some((
        Socks4Request {
            command,
            port,
            ip,
            user_id,
            hostname,
        },
        consumed,
    )))
}

/// Build the 8-byte reply a server sends
pub fn encode_reply(outcome: ReplyOutcome, bound: SocketAddrV4) -> [u8; SOCKS4_REPLY_LEN] {
    let port = bound.port().to_be_bytes();
    let ip = bound.ip().octets();
    [
        SOCKS4_REPLY_VERSION,
        outcome.to_socks4(),
        port[0],
        port[1],
        ip[0],
        ip[1],
        ip[2],
        ip[3],
    ]
}

/// Position of the NUL terminating a field starting at `start`
fn find_nul(buf: &[u8], start: usize, max_len: usize) -> Result<Option<usize>, SocksError> {
    match buf[start..].iter().position(|b| *b == 0) {
        Some(offset) if offset > max_len => Err(SocksError::MalformedReply(format!(
            "SOCKS4 field exceeds {} bytes",
            max_len
        ))),
        Some(offset) => Ok(Some(start + offset)),
        None if buf.len() - start > max_len => Err(SocksError::MalformedReply(format!(
            "SOCKS4 field exceeds {} bytes",
            max_len
        ))),
        None => Ok(None),
    }
}
