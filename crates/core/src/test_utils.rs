//! Test doubles for the tor controller, the resource manager and the upgrader

use crate::address::ServiceInfo;
use crate::transport::{
    CapableConn, ConnectionScope, ListenConn, MuxedStream, NullScope, OnionService,
    OnionTransport, RawConnection, RemoteAddr, ResourceManager, Upgrader,
};
use async_trait::async_trait;
use multiaddr::Multiaddr;
use onion_transport_common::{Direction, PeerId};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

pub(crate) fn v3_id() -> String {
    format!("abc{}xyz", "q".repeat(50))
}

pub(crate) fn v2_id() -> String {
    format!("abc{}xyz", "q".repeat(10))
}

pub(crate) fn v3_service(port: u16) -> ServiceInfo {
    ServiceInfo::new(true, v3_id(), vec![port])
}

pub(crate) fn v2_service(port: u16) -> ServiceInfo {
    ServiceInfo::new(false, v2_id(), vec![port])
}

/// Onion service fed by [`ServiceHandle::dial`]
pub(crate) struct MockService {
    info: ServiceInfo,
    incoming: tokio::sync::Mutex<mpsc::Receiver<RawConnection>>,
    close_calls: Arc<AtomicUsize>,
    close_error: Arc<Mutex<Option<io::ErrorKind>>>,
}

pub(crate) struct ServiceHandle {
    sender: mpsc::Sender<RawConnection>,
    close_calls: Arc<AtomicUsize>,
    close_error: Arc<Mutex<Option<io::ErrorKind>>>,
}

pub(crate) fn mock_service(info: ServiceInfo) -> (MockService, ServiceHandle) {
    let (sender, receiver) = mpsc::channel(16);
    let close_calls = Arc::new(AtomicUsize::new(0));
    let close_error = Arc::new(Mutex::new(None));

    let service = MockService {
        info,
        incoming: tokio::sync::Mutex::new(receiver),
        close_calls: close_calls.clone(),
        close_error: close_error.clone(),
    };
    let handle = ServiceHandle {
        sender,
        close_calls,
        close_error,
    };
    (service, handle)
}

impl ServiceHandle {
    /// Open a connection to the service, returning the dialer's end
    pub(crate) async fn dial(&self) -> DuplexStream {
        let (client, server) = tokio::io::duplex(1024);
        self.sender
            .send(Box::new(server))
            .await
            .unwrap_or_else(|_| panic!("service receiver dropped"));
        client
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_close_with(&self, kind: io::ErrorKind) {
        *self.close_error.lock().unwrap() = Some(kind);
    }
}

#[async_trait]
impl OnionService for MockService {
    async fn accept(&self) -> io::Result<RawConnection> {
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionAborted, "service gone"))
    }

    async fn close(&self) -> io::Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        match *self.close_error.lock().unwrap() {
            Some(kind) => Err(io::Error::new(kind, "close failed")),
            None => Ok(()),
        }
    }

    fn info(&self) -> &ServiceInfo {
        &self.info
    }
}

#[derive(Default)]
struct UpgraderState {
    upgrades: AtomicUsize,
    closed_conns: Arc<AtomicUsize>,
    last_remote: Mutex<Option<RemoteAddr>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum UpgradeMode {
    Ok,
    FailUpgrade,
    FailStreams,
}

/// Upgrader that skips negotiation and hands the raw connection back as
/// the first accepted stream
pub(crate) struct MockUpgrader {
    mode: UpgradeMode,
    state: UpgraderState,
}

impl MockUpgrader {
    fn with_mode(mode: UpgradeMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            state: UpgraderState::default(),
        })
    }

    pub(crate) fn new() -> Arc<Self> {
        Self::with_mode(UpgradeMode::Ok)
    }

    pub(crate) fn failing_upgrade() -> Arc<Self> {
        Self::with_mode(UpgradeMode::FailUpgrade)
    }

    pub(crate) fn failing_streams() -> Arc<Self> {
        Self::with_mode(UpgradeMode::FailStreams)
    }

    pub(crate) fn upgrades(&self) -> usize {
        self.state.upgrades.load(Ordering::SeqCst)
    }

    pub(crate) fn closed_conns(&self) -> usize {
        self.state.closed_conns.load(Ordering::SeqCst)
    }

    pub(crate) fn last_remote(&self) -> Option<RemoteAddr> {
        self.state.last_remote.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upgrader for MockUpgrader {
    async fn upgrade(
        &self,
        _transport: &OnionTransport,
        conn: ListenConn,
        direction: Direction,
        peer: Option<PeerId>,
        scope: Box<dyn ConnectionScope>,
    ) -> anyhow::Result<Box<dyn CapableConn>> {
        self.state.upgrades.fetch_add(1, Ordering::SeqCst);
        assert_eq!(direction, Direction::Inbound);
        assert!(peer.is_none());

        if self.mode == UpgradeMode::FailUpgrade {
            scope.done();
            anyhow::bail!("handshake failed");
        }

        *self.state.last_remote.lock().unwrap() = Some(conn.remote_addr().clone());

        Ok(Box::new(MockConn {
            local: conn.local_multiaddr().clone(),
            stream: Mutex::new(Some(conn)),
            fail_streams: self.mode == UpgradeMode::FailStreams,
            closed: AtomicBool::new(false),
            closed_count: self.state.closed_conns.clone(),
            scope,
        }))
    }
}

struct MockConn {
    local: Multiaddr,
    stream: Mutex<Option<ListenConn>>,
    fail_streams: bool,
    closed: AtomicBool,
    closed_count: Arc<AtomicUsize>,
    scope: Box<dyn ConnectionScope>,
}

#[async_trait]
impl CapableConn for MockConn {
    async fn accept_stream(&self) -> anyhow::Result<MuxedStream> {
        if self.fail_streams {
            anyhow::bail!("stream limit reached");
        }
        let stream = self.stream.lock().unwrap().take();
        match stream {
            Some(conn) => Ok(Box::new(conn)),
            None => anyhow::bail!("no more streams"),
        }
    }

    async fn close(&self) -> anyhow::Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closed_count.fetch_add(1, Ordering::SeqCst);
            self.scope.done();
        }
        Ok(())
    }

    fn local_multiaddr(&self) -> Multiaddr {
        self.local.clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

type ScopeRequest = (Direction, bool, Option<Multiaddr>);

/// Resource manager that records requests and admits or denies all of them
pub(crate) struct MockResourceManager {
    deny: bool,
    requests: Mutex<Vec<ScopeRequest>>,
}

impl MockResourceManager {
    pub(crate) fn admitting() -> Arc<Self> {
        Arc::new(Self {
            deny: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn denying() -> Arc<Self> {
        Arc::new(Self {
            deny: true,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn last_request(&self) -> Option<ScopeRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl ResourceManager for MockResourceManager {
    fn open_connection(
        &self,
        direction: Direction,
        transient: bool,
        remote: Option<&Multiaddr>,
    ) -> anyhow::Result<Box<dyn ConnectionScope>> {
        self.requests
            .lock()
            .unwrap()
            .push((direction, transient, remote.cloned()));

        if self.deny {
            anyhow::bail!("connection limit exceeded");
        }
        Ok(Box::new(NullScope))
    }
}
