//! Byte relay between a client and its target

use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Relay data bidirectionally until both directions finish
///
/// EOF on one side is forwarded as a write shutdown on the other; an error
/// on either side ends the relay and both streams are dropped.
pub async fn relay<A, B>(mut client: A, mut target: B) -> io::Result<(u64, u64)>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::io::copy_bidirectional(&mut client, &mut target).await {
        Ok((up, down)) => {
            debug!("Relay finished: {} bytes up, {} bytes down", up, down);
            Ok((up, down))
        }
        Err(e) => {
            debug!("Relay error: {}", e);
            Err(e)
        }
    }
}
