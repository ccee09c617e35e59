use multiaddr::Multiaddr;
use onion_transport_common::Direction;

/// Admission scope of one connection, released through `done`
pub trait ConnectionScope: Send + Sync {
    fn done(&self);
}

/// Admission control for new connections
pub trait ResourceManager: Send + Sync {
    /// Reserve resources for a connection. `remote` is `None` when the
    /// remote address is not known yet, which is always the case for
    /// inbound onion connections.
    fn open_connection(
        &self,
        direction: Direction,
        transient: bool,
        remote: Option<&Multiaddr>,
    ) -> anyhow::Result<Box<dyn ConnectionScope>>;
}

/// Resource manager that admits every connection
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResourceManager;

#[derive(Debug, Clone, Copy, Default)]
pub struct NullScope;

impl ConnectionScope for NullScope {
    fn done(&self) {}
}

impl ResourceManager for NullResourceManager {
    fn open_connection(
        &self,
        _direction: Direction,
        _transient: bool,
        _remote: Option<&Multiaddr>,
    ) -> anyhow::Result<Box<dyn ConnectionScope>> {
        Ok(Box::new(NullScope))
    }
}
