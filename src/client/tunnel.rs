//! Established tunnel stream

use crate::protocol::{Target, TargetAddr};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Byte stream to the target through the proxy
///
/// Reads and writes pass straight through to the proxy connection; the
/// handshake has already been consumed.
#[derive(Debug)]
pub struct Tunnel<S> {
    stream: S,
    target: Target,
    bound: TargetAddr,
}

impl<S> Tunnel<S> {
    pub(crate) fn new(stream: S, target: Target, bound: TargetAddr) -> Self {
        Tunnel {
            stream,
            target,
            bound,
        }
    }

    /// Target the tunnel leads to
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Address the proxy reported as bound for this connection
    pub fn bound_addr(&self) -> &TargetAddr {
        &self.bound
    }

    /// Get a reference to the proxy connection
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwrap the proxy connection
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Tunnel<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Tunnel<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.stream.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}
