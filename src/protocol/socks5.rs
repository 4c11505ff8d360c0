//! SOCKS5 frame codec
//!
//! Pure encode/decode of RFC 1928 / RFC 1929 frames, no IO. Client-side
//! frames come first, followed by the mirror frames a server reads and
//! writes.

use super::consts::*;
use super::types::{AuthMethod, Credentials, ResolutionMode, Target, TargetAddr};
use crate::error::{ReplyOutcome, SocksError};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Decoded CONNECT reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5Reply {
    /// Normalized reply code
    pub outcome: ReplyOutcome,
    /// BND.ADDR / BND.PORT
    pub bound: TargetAddr,
}

/// Decoded request, as seen by a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5Request {
    /// Command byte (only CONNECT is served)
    pub command: u8,
    /// DST.ADDR / DST.PORT
    pub target: TargetAddr,
}

/// Username/password sub-negotiation as received by a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPassAuth {
    /// UNAME
    pub username: Vec<u8>,
    /// PASSWD
    pub password: Vec<u8>,
}

/// Build the method-selection greeting
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
pub fn encode_greeting(methods: &[AuthMethod]) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + methods.len());
    buf.put_u8(SOCKS5_VERSION);
    buf.put_u8(methods.len() as u8);
    for method in methods {
        buf.put_u8(method.to_byte());
    }
    buf.freeze()
}

/// Decode the server's 2-byte method selection
pub fn decode_method_selection(buf: &[u8]) -> Result<AuthMethod, SocksError> {
    if buf.len() < 2 {
        return Err(SocksError::MalformedReply(format!(
            "method selection is {} bytes, expected 2",
            buf.len()
        )));
    }
    if buf[0] != SOCKS5_VERSION {
        return Err(SocksError::ProtocolMismatch {
            expected: SOCKS5_VERSION,
            actual: buf[0],
        });
    }

    match buf[1] {
        SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE => Err(SocksError::NoAcceptableMethod),
        byte => AuthMethod::from_byte(byte).ok_or_else(|| {
            SocksError::MalformedReply(format!("server selected unknown method {:#04x}", byte))
        }),
    }
}

/// Build the RFC 1929 sub-negotiation frame
///
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
pub fn encode_user_pass_auth(credentials: &Credentials) -> Bytes {
    let username = credentials.username();
    let password = credentials.password();

    let mut buf = BytesMut::with_capacity(3 + username.len() + password.len());
    buf.put_u8(SOCKS5_AUTH_VERSION);
    buf.put_u8(username.len() as u8);
    buf.put_slice(username);
    buf.put_u8(password.len() as u8);
    buf.put_slice(password);
    buf.freeze()
}

/// Decode the 2-byte sub-negotiation status
pub fn decode_auth_status(buf: &[u8]) -> Result<(), SocksError> {
    if buf.len() < 2 {
        return Err(SocksError::MalformedReply(format!(
            "auth status is {} bytes, expected 2",
            buf.len()
        )));
    }
    if buf[0] != SOCKS5_AUTH_VERSION {
        return Err(SocksError::MalformedReply(format!(
            "auth status version {:#04x}",
            buf[0]
        )));
    }
    if buf[1] != SOCKS5_AUTH_SUCCESS {
        return Err(SocksError::AuthenticationFailed);
    }
    Ok(())
}

/// Build a CONNECT request
///
/// An IP literal host is always sent as ATYP IPv4/IPv6. A hostname is sent
/// as ATYP domain in [`ResolutionMode::Remote`]; in [`ResolutionMode::Local`]
/// the caller must pass an already-resolved target.
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn encode_connect_request(target: &Target, mode: ResolutionMode) -> Result<Bytes, SocksError> {
    let addr = match (target.ip(), mode) {
        (Some(ip), _) => TargetAddr::Ip(SocketAddr::new(ip, target.port())),
        (None, ResolutionMode::Remote) => TargetAddr::Domain(target.host().to_string(), target.port()),
        (None, ResolutionMode::Local) => {
            return Err(SocksError::InvalidTarget(format!(
                "{} must be resolved before a local-resolution request",
                target
            )))
        }
    };

    let mut buf = BytesMut::with_capacity(SOCKS5_HEADER_LEN + 1 + MAX_FIELD_LEN + 2);
    buf.put_u8(SOCKS5_VERSION);
    buf.put_u8(SOCKS5_CMD_TCP_CONNECT);
    buf.put_u8(SOCKS5_RESERVED);
    put_addr(&mut buf, &addr);
    Ok(buf.freeze())
}

/// Total length of a reply/request given its first bytes
///
/// Needs the 4-byte header, plus the length byte for a domain address.
/// Returns `Ok(None)` when that is not yet available.
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, SocksError> {
    if buf.len() < SOCKS5_HEADER_LEN {
        return Ok(None);
    }
    let addr_len = match buf[3] {
        SOCKS5_ADDR_TYPE_IPV4 => 4,
        SOCKS5_ADDR_TYPE_IPV6 => 16,
        SOCKS5_ADDR_TYPE_DOMAIN => match buf.get(SOCKS5_HEADER_LEN) {
            Some(len) => 1 + *len as usize,
            None => return Ok(None),
        },
        other => {
            return Err(SocksError::MalformedReply(format!(
                "unknown address type {:#04x}",
                other
            )))
        }
    };
    Ok(Some(SOCKS5_HEADER_LEN + addr_len + 2))
}

/// Decode a complete CONNECT reply
pub fn decode_connect_reply(buf: &[u8]) -> Result<Socks5Reply, SocksError> {
    let total = frame_len(buf)?.ok_or_else(|| truncated("connect reply", buf.len()))?;
    if buf.len() < total {
        return Err(truncated("connect reply", buf.len()));
    }
    if buf[0] != SOCKS5_VERSION {
        return Err(SocksError::MalformedReply(format!(
            "connect reply version {:#04x}",
            buf[0]
        )));
    }

    let outcome = ReplyOutcome::from_socks5(buf[1]).ok_or_else(|| {
        SocksError::MalformedReply(format!("unknown reply code {:#04x}", buf[1]))
    })?;
    let bound = read_addr(&buf[3..total])?;

    Ok(Socks5Reply { outcome, bound })
}

/// Try to decode a client greeting, returning the offered methods
pub fn decode_greeting(buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, SocksError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    if buf[0] != SOCKS5_VERSION {
        return Err(SocksError::ProtocolMismatch {
            expected: SOCKS5_VERSION,
            actual: buf[0],
        });
    }
    let count = buf[1] as usize;
    if count == 0 {
        return Err(SocksError::MalformedReply(
            "greeting offers no methods".to_string(),
        ));
    }
    if buf.len() < 2 + count {
        return Ok(None);
    }
    Ok(Some((buf[2..2 + count].to_vec(), 2 + count)))
}

/// Build the method-selection reply; `None` means no acceptable method
pub fn encode_method_selection(method: Option<AuthMethod>) -> [u8; 2] {
    [
        SOCKS5_VERSION,
        method
            .map(AuthMethod::to_byte)
            .unwrap_or(SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE),
    ]
}

/// Try to decode a username/password sub-negotiation frame
pub fn decode_user_pass_auth(buf: &[u8]) -> Result<Option<(UserPassAuth, usize)>, SocksError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    if buf[0] != SOCKS5_AUTH_VERSION {
        return Err(SocksError::MalformedReply(format!(
            "auth version {:#04x}",
            buf[0]
        )));
    }
    let ulen = buf[1] as usize;
    let Some(&plen) = buf.get(2 + ulen) else {
        return Ok(None);
    };
    let total = 3 + ulen + plen as usize;
    if buf.len() < total {
        return Ok(None);
    }

    Ok(Some((
        UserPassAuth {
            username: buf[2..2 + ulen].to_vec(),
            password: buf[3 + ulen..total].to_vec(),
        },
        total,
    )))
}

/// Build the 2-byte sub-negotiation status
pub fn encode_auth_status(success: bool) -> [u8; 2] {
    [
        SOCKS5_AUTH_VERSION,
        if success {
            SOCKS5_AUTH_SUCCESS
        } else {
            SOCKS5_AUTH_FAILURE
        },
    ]
}

/// Try to decode a client request
///
/// An unknown ATYP cannot be skipped, so it surfaces as
/// `Rejected(AddressTypeNotSupported)` for the server to echo back.
pub fn decode_connect_request(buf: &[u8]) -> Result<Option<(Socks5Request, usize)>, SocksError> {
    if buf.len() < SOCKS5_HEADER_LEN {
        return Ok(None);
    }
    if buf[0] != SOCKS5_VERSION {
        return Err(SocksError::MalformedReply(format!(
            "request version {:#04x}",
            buf[0]
        )));
    }
    let total = match frame_len(buf) {
        Ok(Some(total)) => total,
        Ok(None) => return Ok(None),
        Err(_) => return Err(SocksError::Rejected(ReplyOutcome::AddressTypeNotSupported)),
    };
    if buf.len() < total {
        return Ok(None);
    }

    let target = read_addr(&buf[3..total])?;
    Ok(Some((
        Socks5Request {
            command: buf[1],
            target,
        },
        total,
    )))
}

/// Build a reply a server sends
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn encode_reply(outcome: ReplyOutcome, bound: Option<SocketAddr>) -> Bytes {
    let bound =
        bound.unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));

    let mut buf = BytesMut::with_capacity(SOCKS5_HEADER_LEN + 16 + 2);
    buf.put_u8(SOCKS5_VERSION);
    buf.put_u8(outcome.to_socks5());
    buf.put_u8(SOCKS5_RESERVED);
    put_addr(&mut buf, &TargetAddr::Ip(bound));
    buf.freeze()
}

fn put_addr(buf: &mut BytesMut, addr: &TargetAddr) {
    buf.put_u8(addr.addr_type());
    match addr {
        TargetAddr::Ip(SocketAddr::V4(sa)) => buf.put_slice(&sa.ip().octets()),
        TargetAddr::Ip(SocketAddr::V6(sa)) => buf.put_slice(&sa.ip().octets()),
        TargetAddr::Domain(domain, _) => {
            buf.put_u8(domain.len() as u8);
            buf.put_slice(domain.as_bytes());
        }
    }
    buf.put_u16(addr.port());
}

/// Read `ATYP ADDR PORT`; `buf` is exactly that long
fn read_addr(buf: &[u8]) -> Result<TargetAddr, SocksError> {
    let port_at = buf.len() - 2;
    let port = u16::from_be_bytes([buf[port_at], buf[port_at + 1]]);
    let addr = &buf[1..port_at];

    match buf[0] {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let octets: [u8; 4] = addr
                .try_into()
                .map_err(|_| SocksError::MalformedReply("bad IPv4 address".to_string()))?;
            Ok(TargetAddr::ipv4(Ipv4Addr::from(octets), port))
        }
        SOCKS5_ADDR_TYPE_IPV6 => {
            let octets: [u8; 16] = addr
                .try_into()
                .map_err(|_| SocksError::MalformedReply("bad IPv6 address".to_string()))?;
            Ok(TargetAddr::ipv6(Ipv6Addr::from(octets), port))
        }
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let domain = &addr[1..];
            if domain.is_empty() {
                return Err(SocksError::MalformedReply("empty domain name".to_string()));
            }
            let domain = std::str::from_utf8(domain)
                .map_err(|_| SocksError::MalformedReply("domain name is not UTF-8".to_string()))?;
            Ok(TargetAddr::Domain(domain.to_string(), port))
        }
        other => Err(SocksError::MalformedReply(format!(
            "unknown address type {:#04x}",
            other
        ))),
    }
}

fn truncated(what: &str, len: usize) -> SocksError {
    SocksError::MalformedReply(format!("{} truncated at {} bytes", what, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_greeting() {
        assert_eq!(&encode_greeting(&[AuthMethod::None])[..], &[0x05, 0x01, 0x00]);
        assert_eq!(
            &encode_greeting(&[AuthMethod::None, AuthMethod::UsernamePassword])[..],
            &[0x05, 0x02, 0x00, 0x02]
        );
    }

    #[test]
    fn test_decode_method_selection() {
        assert_eq!(decode_method_selection(&[0x05, 0x00]).unwrap(), AuthMethod::None);
        assert_eq!(
            decode_method_selection(&[0x05, 0x02]).unwrap(),
            AuthMethod::UsernamePassword
        );
        assert!(matches!(
            decode_method_selection(&[0x05, 0xFF]),
            Err(SocksError::NoAcceptableMethod)
        ));
        assert!(matches!(
            decode_method_selection(&[0x05, 0x01]),
            Err(SocksError::MalformedReply(_))
        ));
        assert!(matches!(
            decode_method_selection(&[0x00, 0x5A]),
            Err(SocksError::ProtocolMismatch { expected: 0x05, actual: 0x00 })
        ));
        assert!(matches!(
            decode_method_selection(&[0x05]),
            Err(SocksError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_encode_user_pass_auth() {
        let creds = Credentials::new("name", "pass").unwrap();
        let frame = encode_user_pass_auth(&creds);
        assert_eq!(&frame[..], b"\x01\x04name\x04pass");

        let (decoded, consumed) = decode_user_pass_auth(&frame).unwrap().unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(decoded.username, b"name");
        assert_eq!(decoded.password, b"pass");
    }

    #[test]
    fn test_decode_user_pass_auth_incomplete() {
        let frame = b"\x01\x04name\x04pass";
        for cut in [0, 1, 2, 5, 6, 9] {
            assert!(decode_user_pass_auth(&frame[..cut]).unwrap().is_none());
        }
        assert!(decode_user_pass_auth(b"\x05\x04name").is_err());
    }

    #[test]
    fn test_decode_auth_status() {
        assert!(decode_auth_status(&[0x01, 0x00]).is_ok());
        assert!(matches!(
            decode_auth_status(&[0x01, 0x01]),
            Err(SocksError::AuthenticationFailed)
        ));
        assert!(matches!(
            decode_auth_status(&[0x01]),
            Err(SocksError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_encode_connect_request_remote_domain() {
        let target = Target::new("example.com", 80).unwrap();
        let frame = encode_connect_request(&target, ResolutionMode::Remote).unwrap();

        assert_eq!(&frame[..5], &[0x05, 0x01, 0x00, 0x03, 11]);
        assert_eq!(&frame[5..16], b"example.com");
        assert_eq!(&frame[16..], &[0x00, 0x50]);
    }

    #[test]
    fn test_encode_connect_request_ip_literals() {
        let target = Target::new("192.168.1.1", 8080).unwrap();
        let frame = encode_connect_request(&target, ResolutionMode::Remote).unwrap();
        assert_eq!(&frame[..], &[0x05, 0x01, 0x00, 0x01, 192, 168, 1, 1, 0x1F, 0x90]);

        let target = Target::new("::1", 443).unwrap();
        let frame = encode_connect_request(&target, ResolutionMode::Local).unwrap();
        assert_eq!(frame[3], SOCKS5_ADDR_TYPE_IPV6);
        assert_eq!(frame.len(), 4 + 16 + 2);
    }

    #[test]
    fn test_encode_connect_request_local_requires_resolution() {
        let target = Target::new("example.com", 80).unwrap();
        assert!(matches!(
            encode_connect_request(&target, ResolutionMode::Local),
            Err(SocksError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_connect_request_roundtrip_through_server_decoder() {
        let target = Target::new("example.com", 443).unwrap();
        let frame = encode_connect_request(&target, ResolutionMode::Remote).unwrap();

        let (request, consumed) = decode_connect_request(&frame).unwrap().unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(request.command, SOCKS5_CMD_TCP_CONNECT);
        assert_eq!(request.target, TargetAddr::Domain("example.com".to_string(), 443));
        assert!(decode_connect_request(&frame[..frame.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn test_connect_request_roundtrip_boundaries() {
        let long_host = "a".repeat(MAX_FIELD_LEN);
        for port in [1u16, 80, 65535] {
            let cases = [
                ("192.0.2.1", TargetAddr::ipv4(Ipv4Addr::new(192, 0, 2, 1), port)),
                ("2001:db8::1", TargetAddr::ipv6("2001:db8::1".parse().unwrap(), port)),
                ("a", TargetAddr::Domain("a".to_string(), port)),
                (long_host.as_str(), TargetAddr::Domain(long_host.clone(), port)),
            ];
            for (host, expected) in cases {
                let target = Target::new(host, port).unwrap();
                let frame = encode_connect_request(&target, ResolutionMode::Remote).unwrap();

                let (request, consumed) = decode_connect_request(&frame).unwrap().unwrap();
                assert_eq!(consumed, frame.len());
                assert_eq!(request.target, expected);
            }

            for bound in ["192.0.2.1", "2001:db8::1"] {
                let bound = SocketAddr::new(bound.parse().unwrap(), port);
                let reply = decode_connect_reply(&encode_reply(ReplyOutcome::Granted, Some(bound))).unwrap();
                assert_eq!(reply.bound, TargetAddr::Ip(bound));
            }
        }
    }

    #[test]
    fn test_decode_connect_request_unknown_atyp() {
        let frame = [0x05, 0x01, 0x00, 0x09, 1, 2, 3, 4, 0, 80];
        let err = decode_connect_request(&frame).unwrap_err();
        assert_eq!(err.reply_outcome(), Some(ReplyOutcome::AddressTypeNotSupported));
    }

    #[test]
    fn test_decode_connect_reply_ipv4() {
        let reply =
            decode_connect_reply(&[0x05, 0x00, 0x00, 0x01, 10, 0, 0, 1, 0x04, 0x38]).unwrap();
        assert_eq!(reply.outcome, ReplyOutcome::Granted);
        assert_eq!(reply.bound, TargetAddr::ipv4(Ipv4Addr::new(10, 0, 0, 1), 1080));
    }

    #[test]
    fn test_decode_connect_reply_domain_and_ipv6() {
        let mut frame = vec![0x05, 0x04, 0x00, 0x03, 4];
        frame.extend_from_slice(b"host");
        frame.extend_from_slice(&[0x00, 0x50]);
        let reply = decode_connect_reply(&frame).unwrap();
        assert_eq!(reply.outcome, ReplyOutcome::HostUnreachable);
        assert_eq!(reply.bound, TargetAddr::Domain("host".to_string(), 80));

        let bound: SocketAddr = "[::1]:9000".parse().unwrap();
        let frame = encode_reply(ReplyOutcome::ConnectionRefused, Some(bound));
        let reply = decode_connect_reply(&frame).unwrap();
        assert_eq!(reply.outcome, ReplyOutcome::ConnectionRefused);
        assert_eq!(reply.bound, TargetAddr::Ip(bound));
    }

    #[test]
    fn test_decode_connect_reply_malformed() {
        // truncated
        assert!(matches!(
            decode_connect_reply(&[0x05, 0x00, 0x00, 0x01, 10, 0]),
            Err(SocksError::MalformedReply(_))
        ));
        // bad ATYP
        assert!(matches!(
            decode_connect_reply(&[0x05, 0x00, 0x00, 0x07, 0, 0, 0, 0, 0, 0]),
            Err(SocksError::MalformedReply(_))
        ));
        // unknown REP
        assert!(matches!(
            decode_connect_reply(&[0x05, 0x09, 0x00, 0x01, 0, 0, 0, 0, 0, 0]),
            Err(SocksError::MalformedReply(_))
        ));
        // wrong version
        assert!(matches!(
            decode_connect_reply(&[0x04, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]),
            Err(SocksError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(frame_len(&[0x05, 0x00, 0x00]).unwrap(), None);
        assert_eq!(frame_len(&[0x05, 0x00, 0x00, 0x01]).unwrap(), Some(10));
        assert_eq!(frame_len(&[0x05, 0x00, 0x00, 0x04]).unwrap(), Some(22));
        assert_eq!(frame_len(&[0x05, 0x00, 0x00, 0x03]).unwrap(), None);
        assert_eq!(frame_len(&[0x05, 0x00, 0x00, 0x03, 7]).unwrap(), Some(4 + 1 + 7 + 2));
    }

    #[test]
    fn test_greeting_server_side() {
        let frame = encode_greeting(&[AuthMethod::None, AuthMethod::UsernamePassword]);
        let (methods, consumed) = decode_greeting(&frame).unwrap().unwrap();
        assert_eq!(methods, vec![0x00, 0x02]);
        assert_eq!(consumed, 4);

        assert!(decode_greeting(&[0x05, 0x02, 0x00]).unwrap().is_none());
        assert!(matches!(
            decode_greeting(&[0x04, 0x01]),
            Err(SocksError::ProtocolMismatch { .. })
        ));
        assert!(decode_greeting(&[0x05, 0x00]).is_err());
    }

    #[test]
    fn test_encode_method_selection_and_status() {
        assert_eq!(encode_method_selection(Some(AuthMethod::None)), [0x05, 0x00]);
        assert_eq!(encode_method_selection(None), [0x05, 0xFF]);
        assert_eq!(encode_auth_status(true), [0x01, 0x00]);
        assert_eq!(encode_auth_status(false), [0x01, 0x01]);
    }
}
