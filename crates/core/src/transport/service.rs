use crate::address::ServiceInfo;
use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// Byte stream carried by an onion-service connection or a muxed stream
pub trait IoStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> IoStream for T {}

/// Raw connection handed out by an onion service, before any upgrade
pub type RawConnection = Box<dyn IoStream>;

/// Handle to a live, published onion service.
///
/// Provided by the tor controller; the transport only accepts on it and
/// closes it.
#[async_trait]
pub trait OnionService: Send + Sync {
    /// Wait for the next incoming connection
    async fn accept(&self) -> io::Result<RawConnection>;

    /// Stop the service. An `UnexpectedEof` here means it was already gone.
    async fn close(&self) -> io::Result<()>;

    fn info(&self) -> &ServiceInfo;
}
