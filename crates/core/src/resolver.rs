//! Name resolution through tor's DNS port
//!
//! When the transport is configured with a DNS port, tor answers DNS
//! queries on `127.0.0.1:<port>` and every lookup goes over the anonymity
//! network instead of the system resolver.

use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveError;
use hickory_resolver::TokioAsyncResolver;
use onion_transport_common::protocol::RESOLVER_DIAL_TIMEOUT_MS;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;

/// DNS resolver bound to a single proxy
pub struct ProxyResolver {
    proxy: SocketAddr,
    timeout: Duration,
    inner: TokioAsyncResolver,
}

impl ProxyResolver {
    pub fn new(proxy: SocketAddr) -> Self {
        Self::with_timeout(proxy, Duration::from_millis(RESOLVER_DIAL_TIMEOUT_MS))
    }

    pub fn with_timeout(proxy: SocketAddr, timeout: Duration) -> Self {
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(proxy, Protocol::Udp));
        config.add_name_server(NameServerConfig::new(proxy, Protocol::Tcp));

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        // Answers must come from tor, never from /etc/hosts
        opts.use_hosts_file = false;

        Self {
            proxy,
            timeout,
            inner: TokioAsyncResolver::tokio(config, opts),
        }
    }

    pub fn proxy(&self) -> SocketAddr {
        self.proxy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve `host` to its IPv4 and IPv6 addresses
    pub async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ResolverError> {
        let lookup = self
            .inner
            .lookup_ip(host)
            .await
            .map_err(|source| ResolverError::Lookup {
                host: host.to_string(),
                proxy: self.proxy,
                source,
            })?;

        let addrs: Vec<IpAddr> = lookup.iter().collect();
        debug!("Resolved {} via {}: {:?}", host, self.proxy, addrs);
        Ok(addrs)
    }
}

impl fmt::Debug for ProxyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyResolver")
            .field("proxy", &self.proxy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Resolver errors
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("Failed to resolve {host} via {proxy}: {source}")]
    Lookup {
        host: String,
        proxy: SocketAddr,
        #[source]
        source: ResolveError,
    },
}
