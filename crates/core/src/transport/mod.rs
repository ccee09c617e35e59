/// Onion transport
///
/// Turns onion-service handles from the tor controller into listeners.
/// The controller, the resource manager and the upgrader are external and
/// plugged in through the traits below.
mod connection;
mod resource;
mod service;
mod upgrade;

pub use connection::{InboundConn, ListenConn, RemoteAddr};
pub use resource::{ConnectionScope, NullResourceManager, NullScope, ResourceManager};
pub use service::{IoStream, OnionService, RawConnection};
pub use upgrade::{CapableConn, MuxedStream, Upgrader};

use crate::listener::{Listener, ListenerError, ListenerRegistry};
use crate::resolver::ProxyResolver;
use multiaddr::Multiaddr;
use onion_transport_common::TransportConfig;
use std::sync::Arc;
use tracing::info;

/// Multiaddress protocols this transport listens on
pub const PROTOCOLS: &[&str] = &["onion", "onion3"];

/// Onion transport; cheap to clone, clones share listeners
#[derive(Clone)]
pub struct OnionTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    config: TransportConfig,
    registry: ListenerRegistry,
    rcmgr: Arc<dyn ResourceManager>,
    upgrader: Arc<dyn Upgrader>,
}

impl OnionTransport {
    /// Create a transport that admits every connection
    pub fn new(config: TransportConfig, upgrader: Arc<dyn Upgrader>) -> Self {
        Self::with_resource_manager(config, upgrader, Arc::new(NullResourceManager))
    }

    pub fn with_resource_manager(
        config: TransportConfig,
        upgrader: Arc<dyn Upgrader>,
        rcmgr: Arc<dyn ResourceManager>,
    ) -> Self {
        Self {
            inner: Arc::new(TransportInner {
                config,
                registry: ListenerRegistry::new(),
                rcmgr,
                upgrader,
            }),
        }
    }

    /// Start listening on a published onion service
    pub fn listen(&self, service: Box<dyn OnionService>) -> Result<Listener, ListenerError> {
        let listener = Listener::new(
            self.clone(),
            service,
            self.inner.rcmgr.clone(),
            self.inner.upgrader.clone(),
        )?;

        info!("Listening on {}", listener.multiaddr());
        Ok(listener)
    }

    pub fn protocols(&self) -> &'static [&'static str] {
        PROTOCOLS
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Addresses of all open listeners, newest first
    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.inner.registry.listen_addrs()
    }

    /// Address a dialer should announce: the newest open listener's
    pub fn announce_addr(&self) -> Option<Multiaddr> {
        self.inner.registry.newest().map(|record| record.multiaddr)
    }

    /// Resolver going through tor's DNS port, if one is configured
    pub fn resolver(&self) -> Option<ProxyResolver> {
        let config = &self.inner.config;
        config
            .dns_proxy_addr()
            .map(|proxy| ProxyResolver::with_timeout(proxy, config.resolver_dial_timeout()))
    }

    pub(crate) fn registry(&self) -> &ListenerRegistry {
        &self.inner.registry
    }
}
