//! Onion address codec
//!
//! Onion services are exposed to callers as multiaddresses
//! (`/onion3/<id>:<port>` or `/onion/<id>:<port>`) and as a plain
//! `<id>:<port>` socket-style address. Dialers announce their own address
//! to the acceptor as a tagged, fixed-length binary multiaddress.

use multiaddr::{Multiaddr, Protocol};
use onion_transport_common::protocol::{
    ENCODE_ONION, ENCODE_ONION3, ONION3_PREFIX, ONION_PREFIX,
};
use std::fmt;
use std::str::FromStr;

/// Payload length announced by [`ENCODE_ONION`]
pub const ONION_FRAME_LEN: usize = 39;

/// Payload length announced by [`ENCODE_ONION3`]
pub const ONION3_FRAME_LEN: usize = 14;

/// Type tag of an address exchange frame.
///
/// The tag only fixes how many payload bytes follow; the payload is decoded
/// as whatever multiaddress it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeTag {
    Onion,
    Onion3,
}

impl ExchangeTag {
    /// Unknown tags come from peers that don't announce an address
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            ENCODE_ONION => Some(Self::Onion),
            ENCODE_ONION3 => Some(Self::Onion3),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Onion => ENCODE_ONION,
            Self::Onion3 => ENCODE_ONION3,
        }
    }

    pub fn payload_len(self) -> usize {
        match self {
            Self::Onion => ONION_FRAME_LEN,
            Self::Onion3 => ONION3_FRAME_LEN,
        }
    }

    pub fn for_payload_len(len: usize) -> Option<Self> {
        match len {
            ONION_FRAME_LEN => Some(Self::Onion),
            ONION3_FRAME_LEN => Some(Self::Onion3),
            _ => None,
        }
    }
}

/// Static metadata of a published onion service
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceInfo {
    /// Whether the service lives in the version 3 address space
    pub version3: bool,

    /// Service identifier (base32, without `.onion`)
    pub id: String,

    /// Ports the service is published on
    pub remote_ports: Vec<u16>,
}

impl ServiceInfo {
    pub fn new(version3: bool, id: impl Into<String>, remote_ports: Vec<u16>) -> Self {
        Self {
            version3,
            id: id.into(),
            remote_ports,
        }
    }

    /// The first published port
    pub fn primary_port(&self) -> Result<u16, AddressError> {
        self.remote_ports
            .first()
            .copied()
            .ok_or(AddressError::NoRemotePort)
    }

    /// External multiaddress of the service
    pub fn multiaddr(&self) -> Result<Multiaddr, AddressError> {
        onion_multiaddr(self.version3, &self.id, self.primary_port()?)
    }

    pub fn socket_addr(&self) -> Result<OnionSocketAddr, AddressError> {
        Ok(OnionSocketAddr::new(self.id.clone(), self.primary_port()?))
    }
}

/// Build `/onion3/<id>:<port>` (version 3) or `/onion/<id>:<port>`
pub fn onion_multiaddr(version3: bool, id: &str, port: u16) -> Result<Multiaddr, AddressError> {
    let base = if version3 { ONION3_PREFIX } else { ONION_PREFIX };

    format!("{}{}:{}", base, id, port)
        .parse()
        .map_err(|e: multiaddr::Error| AddressError::InvalidMultiaddr(e.to_string()))
}

/// Decode the payload of an exchange frame
pub fn decode_payload(bytes: &[u8]) -> Result<Multiaddr, AddressError> {
    Multiaddr::try_from(bytes.to_vec())
        .map_err(|e| AddressError::InvalidMultiaddr(e.to_string()))
}

/// Encode `addr` as a complete exchange frame (tag followed by payload)
pub fn encode_frame(addr: &Multiaddr) -> Result<Vec<u8>, AddressError> {
    let payload = addr.to_vec();
    let tag = ExchangeTag::for_payload_len(payload.len())
        .ok_or(AddressError::FrameLength(payload.len()))?;

    let mut frame = Vec::with_capacity(1 + payload.len());
    frame.push(tag.as_byte());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Socket-style onion address: `<id>:<port>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OnionSocketAddr {
    id: String,
    port: u16,
}

impl OnionSocketAddr {
    pub fn new(id: impl Into<String>, port: u16) -> Self {
        Self { id: id.into(), port }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Extract the service id and port from an onion or onion3 multiaddress
    pub fn from_multiaddr(addr: &Multiaddr) -> Result<Self, AddressError> {
        match addr.iter().next() {
            Some(Protocol::Onion(hash, port)) => Ok(Self::new(encode_id(&hash[..]), port)),
            Some(Protocol::Onion3(onion)) => Ok(Self::new(encode_id(onion.hash()), onion.port())),
            _ => Err(AddressError::NotOnion(addr.to_string())),
        }
    }

    pub fn to_multiaddr(&self, version3: bool) -> Result<Multiaddr, AddressError> {
        onion_multiaddr(version3, &self.id, self.port)
    }
}

fn encode_id(key: &[u8]) -> String {
    data_encoding::BASE32_NOPAD.encode(key).to_lowercase()
}

impl fmt::Display for OnionSocketAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.port)
    }
}

impl FromStr for OnionSocketAddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let (id, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressError::InvalidSocketAddr(s.clone()))?;
        let id = id.strip_suffix(".onion").unwrap_or(id);

        if id.is_empty() {
            return Err(AddressError::InvalidSocketAddr(s.clone()));
        }
        let port = port
            .parse()
            .map_err(|_| AddressError::InvalidSocketAddr(s.clone()))?;

        Ok(Self::new(id, port))
    }
}

/// Address codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Invalid multiaddress: {0}")]
    InvalidMultiaddr(String),

    #[error("Not an onion address: {0}")]
    NotOnion(String),

    #[error("Onion service has no remote port")]
    NoRemotePort,

    #[error("Address encodes to {0} bytes, which fits no exchange frame")]
    FrameLength(usize),

    #[error("Invalid onion socket address: {0}")]
    InvalidSocketAddr(String),
}
