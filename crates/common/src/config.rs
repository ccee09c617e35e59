use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Transport protocol constants
pub mod protocol {
    /// Time allowed for bootstrapping the tor node and publishing a service (5 minutes)
    pub const DEFAULT_SETUP_TIMEOUT_SECS: u64 = 300;

    /// Dial timeout used for every query of the proxy resolver
    pub const RESOLVER_DIAL_TIMEOUT_MS: u64 = 10_000;

    /// Address exchange tag: a 39-byte binary address follows
    pub const ENCODE_ONION: u8 = 0x00;

    /// Address exchange tag: a 14-byte binary address follows
    pub const ENCODE_ONION3: u8 = 0x01;

    /// Address exchange tag written by a dialer with nothing to announce
    pub const NO_ADDRESS: u8 = 0xff;

    /// Text prefix of a version 2 onion multiaddress
    pub const ONION_PREFIX: &str = "/onion/";

    /// Text prefix of a version 3 onion multiaddress
    pub const ONION3_PREFIX: &str = "/onion3/";
}

/// Options handed to the external tor controller when it starts the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorStartConfig {
    /// Bootstrap the network immediately instead of on first dial/listen
    pub enable_network: bool,

    /// Tor binary to run instead of the embedded node
    pub exe_path: Option<PathBuf>,

    /// Data directory; a temporary one is used when unset
    pub data_dir: Option<PathBuf>,

    /// torrc file to use instead of a blank one
    pub torrc_file: Option<PathBuf>,

    /// File receiving the tor node's debug output
    pub debug_log: Option<PathBuf>,

    /// Extra command line arguments
    pub extra_args: Vec<String>,
}

impl Default for TorStartConfig {
    fn default() -> Self {
        Self {
            enable_network: true,
            exe_path: None,
            data_dir: None,
            torrc_file: None,
            debug_log: None,
            extra_args: Vec::new(),
        }
    }
}

/// Transport configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Whether the transport may dial plain tcp addresses
    pub allow_tcp_dial: bool,

    /// Bootstrap and publication timeout, in milliseconds
    setup_timeout_ms: u64,

    /// Local tor DNS port, when DNS over tor is enabled
    pub dns_port: Option<u16>,

    /// Tor node start options
    pub tor: TorStartConfig,

    /// Key of the onion services; random when unset
    #[serde(skip)]
    private_key: Option<SigningKey>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            allow_tcp_dial: false,
            setup_timeout_ms: protocol::DEFAULT_SETUP_TIMEOUT_SECS * 1000,
            dns_port: None,
            tor: TorStartConfig::default(),
            private_key: None,
        }
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("allow_tcp_dial", &self.allow_tcp_dial)
            .field("setup_timeout", &self.setup_timeout())
            .field("dns_port", &self.dns_port)
            .field("tor", &self.tor)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow the transport to dial tcp addresses (off by default)
    pub fn allow_tcp_dial(mut self) -> Self {
        self.allow_tcp_dial = true;
        self
    }

    /// Only bootstrap the tor node once a dial or listen is issued
    pub fn slow_start(mut self) -> Self {
        self.tor.enable_network = false;
        self
    }

    /// Enable DNS over tor on the given local port
    pub fn with_dns_port(mut self, port: u16) -> Self {
        self.dns_port = Some(port);
        self.tor.extra_args = vec!["--DNSPort".to_string(), port.to_string()];
        self
    }

    /// Ed25519 key used when creating onion addresses
    pub fn with_private_key(mut self, key: SigningKey) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn with_setup_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.setup_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1);
        Ok(self)
    }

    pub fn with_node_debug(mut self, log: impl Into<PathBuf>) -> Self {
        self.tor.debug_log = Some(log.into());
        self
    }

    /// Path to the tor binary, if the embedded node is not used
    pub fn with_binary_path(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        self.tor.exe_path = Some(resolve_path(path.as_ref())?);
        Ok(self)
    }

    pub fn with_data_dir(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        self.tor.data_dir = Some(resolve_path(path.as_ref())?);
        Ok(self)
    }

    pub fn with_torrc_path(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        self.tor.torrc_file = Some(resolve_path(path.as_ref())?);
        Ok(self)
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_timeout_ms)
    }

    pub fn private_key(&self) -> Option<&SigningKey> {
        self.private_key.as_ref()
    }

    /// Local endpoint of tor's DNS port, the proxy for the resolver
    pub fn dns_proxy_addr(&self) -> Option<SocketAddr> {
        self.dns_port
            .map(|port| SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    /// Command line arguments for the tor node. A DNS port set in a config
    /// file, rather than through `with_dns_port`, is added here.
    pub fn tor_args(&self) -> Vec<String> {
        let mut args = self.tor.extra_args.clone();
        if let Some(port) = self.dns_port {
            if !args.iter().any(|arg| arg == "--DNSPort") {
                args.extend(["--DNSPort".to_string(), port.to_string()]);
            }
        }
        args
    }

    pub fn resolver_dial_timeout(&self) -> Duration {
        Duration::from_millis(protocol::RESOLVER_DIAL_TIMEOUT_MS)
    }

    /// Check values that a config file may carry but the builder rejects
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.setup_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file. The private key is never written.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }
}

fn resolve_path(path: &Path) -> Result<PathBuf, ConfigError> {
    std::fs::canonicalize(path).map_err(|source| ConfigError::UnresolvablePath {
        path: path.to_path_buf(),
        source,
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Timeout can't be 0")]
    ZeroTimeout,

    #[error("Can't resolve path {}: {source}", path.display())]
    UnresolvablePath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),
}
