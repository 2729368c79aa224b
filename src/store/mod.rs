//! Collaborator interfaces
//!
//! The WAN interface records and the shared system-event values are owned by
//! other parts of the WAN manager. This module only defines how the relay
//! reaches them, plus in-memory implementations used by the daemon and tests.

use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;

/// Well-known event store keys and values.
pub mod keys {
    pub const IPV4_CONNECTION_STATE: &str = "ipv4_connection_state";
    pub const IPV6_CONNECTION_STATE: &str = "ipv6_connection_state";
    pub const IPV6_PREFIX: &str = "ipv6_prefix";

    pub const STATUS_UP: &str = "up";
    pub const STATUS_DOWN: &str = "down";

    /// Literal written by producers when a value was never set.
    pub const NULL_PLACEHOLDER: &str = "(null)";

    /// Key holding the current IPv4 address of `if_name`.
    pub fn ipv4_address(if_name: &str) -> String {
        format!("ipv4_{}_ipaddr", if_name)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("Interface '{0}' not found")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterfaceStatus {
    #[default]
    Initialising,
    ConnectionUp,
    ConnectionDown,
    Ipv6ConnectionUp,
    Ipv6ConnectionDown,
}

impl fmt::Display for InterfaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterfaceStatus::Initialising => "Initialising",
            InterfaceStatus::ConnectionUp => "ConnectionUp",
            InterfaceStatus::ConnectionDown => "ConnectionDown",
            InterfaceStatus::Ipv6ConnectionUp => "Ipv6ConnectionUp",
            InterfaceStatus::Ipv6ConnectionDown => "Ipv6ConnectionDown",
        };
        f.write_str(name)
    }
}

/// A locked interface record. Dropping the handle releases the lock.
pub trait InterfaceHandle {
    fn name(&self) -> &str;
    fn status(&self) -> InterfaceStatus;
    fn set_status(&mut self, status: InterfaceStatus);
}

/// Lock-protected lookup of WAN interface records by name.
pub trait InterfaceStore: Send + Sync {
    fn lookup_by_name(&self, name: &str) -> Result<Box<dyn InterfaceHandle + '_>, StoreError>;
}

/// Key/value store for connection state flags and addresses.
pub trait EventStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// Requests a status change on `if_name`.
///
/// The record lock is held only while the status is written.
pub fn set_interface_status(
    store: &dyn InterfaceStore,
    if_name: &str,
    status: InterfaceStatus,
) -> Result<(), StoreError> {
    let mut handle = store.lookup_by_name(if_name)?;
    tracing::info!(
        "Interface {}: {} -> {}",
        handle.name(),
        handle.status(),
        status
    );
    handle.set_status(status);
    Ok(())
}

/// Flips a connection state flag from down to up.
///
/// Returns `true` when the flag was changed. Any value other than
/// [`keys::STATUS_DOWN`] is left untouched.
pub fn mark_connection_up(store: &dyn EventStore, key: &str) -> bool {
    match store.get(key) {
        Some(state) if state == keys::STATUS_DOWN => {
            store.set(key, keys::STATUS_UP);
            true
        }
        _ => false,
    }
}

#[derive(Debug, Default)]
pub struct MemoryInterfaceStore {
    interfaces: Mutex<HashMap<String, InterfaceStatus>>,
}

impl MemoryInterfaceStore {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let interfaces = names
            .into_iter()
            .map(|name| (name.into(), InterfaceStatus::default()))
            .collect();
        Self {
            interfaces: Mutex::new(interfaces),
        }
    }

    pub fn status(&self, name: &str) -> Option<InterfaceStatus> {
        self.lock().get(name).copied()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, InterfaceStatus>> {
        self.interfaces.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct MemoryInterfaceHandle<'a> {
    guard: MutexGuard<'a, HashMap<String, InterfaceStatus>>,
    name: String,
}

impl InterfaceHandle for MemoryInterfaceHandle<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> InterfaceStatus {
        self.guard.get(&self.name).copied().unwrap_or_default()
    }

    fn set_status(&mut self, status: InterfaceStatus) {
        self.guard.insert(self.name.clone(), status);
    }
}

impl InterfaceStore for MemoryInterfaceStore {
    fn lookup_by_name(&self, name: &str) -> Result<Box<dyn InterfaceHandle + '_>, StoreError> {
        let guard = self.lock();
        if !guard.contains_key(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(Box::new(MemoryInterfaceHandle {
            guard,
            name: name.to_string(),
        }))
    }
}

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for MemoryEventStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}
