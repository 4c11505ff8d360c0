//! SOCKS wire protocol
//!
//! Address model and the pure SOCKS4/4a and SOCKS5 codecs. Nothing in this
//! module performs IO; the negotiators in [`crate::client`] and
//! [`crate::server`] drive these codecs over a stream.

pub mod consts;
pub mod socks4;
pub mod socks5;
mod types;

pub use types::{AuthMethod, Credentials, ProtocolVersion, ResolutionMode, Target, TargetAddr};
