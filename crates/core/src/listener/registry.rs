//! Registry of the open listeners of one transport

use crate::address::ServiceInfo;
use multiaddr::Multiaddr;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Stable identifier of a registered listener, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// What the registry knows about an open listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenRecord {
    pub service: ServiceInfo,
    pub multiaddr: Multiaddr,
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    records: HashMap<ListenerId, ListenRecord>,
}

/// Open listeners of a transport.
///
/// Ids grow monotonically, so the newest record is the one with the
/// highest id. The lock is only held for map operations.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    state: Mutex<RegistryState>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic elsewhere while holding the lock leaves the map consistent,
    // every mutation is a single insert or remove.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener; it becomes the newest record
    pub fn insert(&self, record: ListenRecord) -> ListenerId {
        let mut state = self.lock();
        let id = ListenerId(state.next_id);
        state.next_id += 1;

        debug!("Registered {} for {}", id, record.multiaddr);
        state.records.insert(id, record);
        id
    }

    /// Unregister a listener. Returns false if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let removed = self.lock().records.remove(&id);

        match removed {
            Some(record) => {
                debug!("Unregistered {} for {}", id, record.multiaddr);
                true
            }
            None => {
                warn!("Tried to unregister unknown {}", id);
                false
            }
        }
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.lock().records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Most recently registered open listener
    pub fn newest(&self) -> Option<ListenRecord> {
        let state = self.lock();
        state
            .records
            .iter()
            .max_by_key(|(id, _)| **id)
            .map(|(_, record)| record.clone())
    }

    /// All records, newest first
    pub fn records(&self) -> Vec<(ListenerId, ListenRecord)> {
        let mut records: Vec<_> = self
            .lock()
            .records
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect();
        records.sort_by(|a, b| b.0.cmp(&a.0));
        records
    }

    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.records()
            .into_iter()
            .map(|(_, record)| record.multiaddr)
            .collect()
    }
}
