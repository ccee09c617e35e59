pub mod address;
pub mod listener;
pub mod resolver;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use address::{AddressError, ExchangeTag, OnionSocketAddr, ServiceInfo};

// Re-export listener types
pub use listener::exchange::{read_remote_addr, write_local_addr};
pub use listener::{ListenRecord, Listener, ListenerError, ListenerId, ListenerRegistry};

pub use resolver::{ProxyResolver, ResolverError};

// Re-export transport types
pub use transport::{
    CapableConn, ConnectionScope, InboundConn, IoStream, ListenConn, MuxedStream,
    NullResourceManager, OnionService, OnionTransport, RawConnection, RemoteAddr,
    ResourceManager, Upgrader, PROTOCOLS,
};
