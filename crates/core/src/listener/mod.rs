/// Onion listeners
///
/// A listener accepts connections on one onion service, runs them through
/// the resource manager and the upgrader, then reads the address the dialer
/// announces for itself.
pub mod exchange;
mod registry;

pub use registry::{ListenRecord, ListenerId, ListenerRegistry};

use crate::address::{AddressError, OnionSocketAddr, ServiceInfo};
use crate::transport::{
    CapableConn, InboundConn, ListenConn, OnionService, OnionTransport, RemoteAddr,
    ResourceManager, Upgrader,
};
use multiaddr::Multiaddr;
use onion_transport_common::Direction;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Listening endpoint on one onion service.
///
/// Open until the first `close`; afterwards `accept` fails with
/// [`ListenerError::Closed`] and further `close` calls do nothing.
pub struct Listener {
    id: ListenerId,
    service: Box<dyn OnionService>,
    info: ServiceInfo,
    multiaddr: Multiaddr,
    addr: OnionSocketAddr,
    transport: OnionTransport,
    rcmgr: Arc<dyn ResourceManager>,
    upgrader: Arc<dyn Upgrader>,
    cancel: CancellationToken,
    closed: Mutex<bool>,
}

impl Listener {
    pub(crate) fn new(
        transport: OnionTransport,
        service: Box<dyn OnionService>,
        rcmgr: Arc<dyn ResourceManager>,
        upgrader: Arc<dyn Upgrader>,
    ) -> Result<Self, ListenerError> {
        let info = service.info().clone();
        let multiaddr = info.multiaddr()?;
        let addr = info.socket_addr()?;

        let id = transport.registry().insert(ListenRecord {
            service: info.clone(),
            multiaddr: multiaddr.clone(),
        });

        Ok(Self {
            id,
            service,
            info,
            multiaddr,
            addr,
            transport,
            rcmgr,
            upgrader,
            cancel: CancellationToken::new(),
            closed: Mutex::new(false),
        })
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// External address, `/onion3/<id>:<port>` or `/onion/<id>:<port>`
    pub fn multiaddr(&self) -> &Multiaddr {
        &self.multiaddr
    }

    /// Local endpoint as `<id>:<port>`
    pub fn addr(&self) -> &OnionSocketAddr {
        &self.addr
    }

    pub fn service_info(&self) -> &ServiceInfo {
        &self.info
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Accept the next connection.
    ///
    /// Failing to read the dialer's announced address fails the connection;
    /// an announcement that can't be used only leaves the remote address
    /// unset.
    pub async fn accept(&self) -> Result<InboundConn, ListenerError> {
        if self.cancel.is_cancelled() {
            return Err(ListenerError::Closed);
        }

        let raw = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ListenerError::Closed),
            accepted = self.service.accept() => accepted.map_err(|e| {
                debug!("Accept on {} failed: {}", self.multiaddr, e);
                ListenerError::Closed
            })?,
        };

        let remote = RemoteAddr::default();
        let conn = ListenConn::new(raw, self.multiaddr.clone(), remote.clone());

        // The dialer's address is only learned after the upgrade
        let scope = self
            .rcmgr
            .open_connection(Direction::Inbound, true, None)
            .map_err(ListenerError::ResourceBlocked)?;

        let upgraded = self
            .upgrader
            .upgrade(&self.transport, conn, Direction::Inbound, None, scope)
            .await
            .map_err(ListenerError::Upgrade)?;

        let mut stream = match upgraded.accept_stream().await {
            Ok(stream) => stream,
            Err(e) => {
                close_quietly(upgraded.as_ref()).await;
                return Err(ListenerError::AcceptStream(e));
            }
        };

        let announced = exchange::read_remote_addr(&mut stream).await;
        if let Err(e) = stream.shutdown().await {
            debug!("Closing address exchange stream failed: {}", e);
        }

        match announced {
            Ok(Some(addr)) => {
                debug!("Accepted connection on {} from {}", self.multiaddr, addr);
                remote.set(addr);
            }
            Ok(None) => {
                debug!("Accepted connection on {} from an unknown address", self.multiaddr);
            }
            Err(e) => {
                close_quietly(upgraded.as_ref()).await;
                return Err(ListenerError::Exchange(e));
            }
        }

        Ok(InboundConn::new(upgraded, remote))
    }

    /// Stop listening. Only the first call does anything; concurrent callers
    /// wait for it to finish.
    pub async fn close(&self) -> Result<(), ListenerError> {
        let mut closed = self.closed.lock().await;
        if *closed {
            return Ok(());
        }
        *closed = true;

        self.transport.registry().remove(self.id);
        self.cancel.cancel();

        match self.service.close().await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
            Err(e) => return Err(ListenerError::ServiceClose(e)),
        }

        info!("Stopped listening on {}", self.multiaddr);
        Ok(())
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("multiaddr", &self.multiaddr)
            .field("is_closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if !*self.closed.get_mut() {
            warn!("Listener on {} dropped without being closed", self.multiaddr);
            self.transport.registry().remove(self.id);
            self.cancel.cancel();
        }
    }
}

async fn close_quietly(conn: &dyn CapableConn) {
    if let Err(e) = conn.close().await {
        debug!("Closing failed connection: {}", e);
    }
}

/// Listener errors
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Listener is closed")]
    Closed,

    #[error("Resource manager blocked incoming tor connection: {0}")]
    ResourceBlocked(#[source] anyhow::Error),

    #[error("Can't upgrade raddr exchange connection: {0}")]
    Upgrade(#[source] anyhow::Error),

    #[error("Can't accept raddr exchange stream: {0}")]
    AcceptStream(#[source] anyhow::Error),

    #[error("Can't read raddr exchange stream: {0}")]
    Exchange(#[source] io::Error),

    #[error("Failed to close onion service: {0}")]
    ServiceClose(#[source] io::Error),

    #[error(transparent)]
    Address(#[from] AddressError),
}
