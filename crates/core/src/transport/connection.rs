use super::{CapableConn, MuxedStream, RawConnection};
use multiaddr::Multiaddr;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Remote address of an accepted connection.
///
/// Empty until the dialer has announced a parseable address; set at most
/// once. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct RemoteAddr(Arc<OnceLock<Multiaddr>>);

impl RemoteAddr {
    pub fn get(&self) -> Option<Multiaddr> {
        self.0.get().cloned()
    }

    pub fn is_known(&self) -> bool {
        self.0.get().is_some()
    }

    /// Returns false if an address was already set
    pub(crate) fn set(&self, addr: Multiaddr) -> bool {
        self.0.set(addr).is_ok()
    }
}

/// Raw onion connection as handed to the upgrader
pub struct ListenConn {
    inner: RawConnection,
    local: Multiaddr,
    remote: RemoteAddr,
}

impl ListenConn {
    pub(crate) fn new(inner: RawConnection, local: Multiaddr, remote: RemoteAddr) -> Self {
        Self {
            inner,
            local,
            remote,
        }
    }

    pub fn local_multiaddr(&self) -> &Multiaddr {
        &self.local
    }

    /// `None` until the address exchange has completed
    pub fn remote_multiaddr(&self) -> Option<Multiaddr> {
        self.remote.get()
    }

    pub fn remote_addr(&self) -> &RemoteAddr {
        &self.remote
    }

    pub fn into_inner(self) -> RawConnection {
        self.inner
    }
}

impl fmt::Debug for ListenConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenConn")
            .field("local", &self.local)
            .field("remote", &self.remote.get())
            .finish()
    }
}

impl AsyncRead for ListenConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for ListenConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Upgraded inbound connection returned by `Listener::accept`
pub struct InboundConn {
    conn: Box<dyn CapableConn>,
    remote: RemoteAddr,
}

impl InboundConn {
    pub(crate) fn new(conn: Box<dyn CapableConn>, remote: RemoteAddr) -> Self {
        Self { conn, remote }
    }

    /// Address announced by the dialer, if it sent a valid one
    pub fn remote_multiaddr(&self) -> Option<Multiaddr> {
        self.remote.get()
    }

    pub fn local_multiaddr(&self) -> Multiaddr {
        self.conn.local_multiaddr()
    }

    pub async fn accept_stream(&self) -> anyhow::Result<MuxedStream> {
        self.conn.accept_stream().await
    }

    pub async fn close(&self) -> anyhow::Result<()> {
        self.conn.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    pub fn connection(&self) -> &dyn CapableConn {
        self.conn.as_ref()
    }

    pub fn into_inner(self) -> Box<dyn CapableConn> {
        self.conn
    }
}

impl fmt::Debug for InboundConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundConn")
            .field("local", &self.conn.local_multiaddr())
            .field("remote", &self.remote.get())
            .finish()
    }
}
