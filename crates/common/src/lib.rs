use std::fmt;

pub mod config;

pub use config::{protocol, ConfigError, TorStartConfig, TransportConfig};

/// Which side opened a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => write!(f, "inbound"),
            Self::Outbound => write!(f, "outbound"),
        }
    }
}

/// Identity of a remote peer as known to the upgrader.
///
/// Opaque to the transport: it never derives or parses one, only hands it
/// through when the caller already knows who it is talking to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
