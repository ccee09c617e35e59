use super::{ConnectionScope, IoStream, ListenConn, OnionTransport};
use async_trait::async_trait;
use multiaddr::Multiaddr;
use onion_transport_common::{Direction, PeerId};

/// A stream opened on an upgraded connection
pub type MuxedStream = Box<dyn IoStream>;

/// Connection after encryption and multiplexing have been negotiated
#[async_trait]
pub trait CapableConn: Send + Sync {
    /// Accept the next stream opened by the remote side
    async fn accept_stream(&self) -> anyhow::Result<MuxedStream>;

    async fn close(&self) -> anyhow::Result<()>;

    fn local_multiaddr(&self) -> Multiaddr;

    fn is_closed(&self) -> bool;
}

/// Negotiates security and multiplexing on a raw connection.
///
/// On failure the upgrader owns `conn` and is responsible for dropping it.
#[async_trait]
pub trait Upgrader: Send + Sync {
    async fn upgrade(
        &self,
        transport: &OnionTransport,
        conn: ListenConn,
        direction: Direction,
        peer: Option<PeerId>,
        scope: Box<dyn ConnectionScope>,
    ) -> anyhow::Result<Box<dyn CapableConn>>;
}
