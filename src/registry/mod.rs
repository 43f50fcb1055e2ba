//! Process-wide table of serial port handles.
//!
//! The registry guarantees that at any moment a port is held by at most one
//! owner, and that every caller of that owner asking for the port receives
//! the same [`Connection`]. Entries hold their handle weakly: once the last
//! caller drops it, or calls [`Connection::finalize`], the port is free again.
//!
//! # Locking
//!
//! The table lock is held only to look up and insert entries. Opening the
//! transport happens outside it, so a slow device never blocks callers on
//! other ports. Callers racing for a port that is still being opened wait on
//! that handle alone. A handle being finalized keeps its entry until its
//! transport is closed; callers wanting that port wait for the entry to go.
//! When both are needed, the table lock is taken before a handle's lifecycle
//! lock; finalization releases the lifecycle lock before touching the table.

mod handle;
mod owner;

pub use handle::Connection;
pub use owner::OwnerTag;

use crate::config::{Config, SerialConfig};
use crate::discovery::{self, PortDiscovery, SystemDiscovery};
use crate::error::{Error, Result};
use crate::port::{PortConfiguration, SerialTransportFactory, TransportFactory};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Registry key: the port path, or `None` for handles created without one.
pub type PortKey = Option<String>;

struct Entry {
    owner: OwnerTag,
    handle: Weak<Connection>,
}

/// Table shared between a registry and the handles it created.
pub(crate) struct Shared {
    table: Mutex<HashMap<PortKey, Entry>>,
    /// Signalled whenever an entry is removed.
    released: Condvar,
}

impl Shared {
    /// Remove the entry for `key` if it still refers to `handle`.
    pub(crate) fn detach(&self, key: &PortKey, handle: *const Connection) {
        let mut table = self.table.lock();
        let current = table
            .get(key)
            .is_some_and(|entry| std::ptr::eq(entry.handle.as_ptr(), handle));
        if current {
            table.remove(key);
            self.released.notify_all();
        }
    }
}

/// What to open when acquiring a handle.
///
/// An explicit port wins over a serial number. A request naming neither
/// yields a handle registered under the unbound key.
#[derive(Debug, Clone, Default)]
pub struct OpenRequest {
    port: Option<String>,
    serial_number: Option<String>,
    connect: Option<bool>,
    config: Option<PortConfiguration>,
}

impl OpenRequest {
    pub fn port(port: impl Into<String>) -> Self {
        Self {
            port: Some(port.into()),
            ..Self::default()
        }
    }

    pub fn serial_number(serial_number: impl Into<String>) -> Self {
        Self {
            serial_number: Some(serial_number.into()),
            ..Self::default()
        }
    }

    /// A request for a handle with no port.
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Fall back to this serial number when no port is given.
    pub fn or_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Whether a newly created handle opens its transport right away.
    pub fn connect(mut self, connect: bool) -> Self {
        self.connect = Some(connect);
        self
    }

    /// Line settings for a newly created handle. Ignored when the handle
    /// already exists.
    pub fn config(mut self, config: PortConfiguration) -> Self {
        self.config = Some(config);
        self
    }
}

/// Defaults applied to handles the registry creates.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub default_config: PortConfiguration,
    pub connect_on_acquire: bool,
    /// Friendly names resolved to port paths before lookup.
    pub port_aliases: HashMap<String, String>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_config: PortConfiguration::default(),
            connect_on_acquire: true,
            port_aliases: HashMap::new(),
        }
    }
}

impl RegistrySettings {
    /// Map an alias to its port path; any other name is returned unchanged.
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

impl From<&SerialConfig> for RegistrySettings {
    fn from(serial: &SerialConfig) -> Self {
        Self {
            default_config: serial.port_configuration(),
            connect_on_acquire: serial.connect_on_acquire,
            port_aliases: serial.port_aliases.clone(),
        }
    }
}

/// One live registration, as reported by [`Registry::registrations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub port: PortKey,
    pub owner: OwnerTag,
}

/// Port-exclusive handle registry.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<Shared>,
    discovery: Arc<dyn PortDiscovery>,
    factory: Arc<dyn TransportFactory>,
    settings: RegistrySettings,
}

static GLOBAL: OnceCell<Registry> = OnceCell::new();

impl Registry {
    pub fn new(discovery: Arc<dyn PortDiscovery>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(HashMap::new()),
                released: Condvar::new(),
            }),
            discovery,
            factory,
            settings: RegistrySettings::default(),
        }
    }

    /// Registry over the operating system's ports.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemDiscovery), Arc::new(SerialTransportFactory))
    }

    /// System registry using the `[serial]` section of `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::system().with_settings(RegistrySettings::from(&config.serial))
    }

    pub fn with_settings(mut self, settings: RegistrySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn discovery(&self) -> &dyn PortDiscovery {
        self.discovery.as_ref()
    }

    /// The process-wide registry, created over the system ports on first use
    /// unless one was installed earlier.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::system)
    }

    /// Make `registry` the process-wide registry.
    ///
    /// Fails, handing the registry back, once a global registry exists.
    pub fn install_global(registry: Registry) -> std::result::Result<&'static Registry, Registry> {
        GLOBAL.try_insert(registry).map_err(|(_, rejected)| rejected)
    }

    /// Get the handle for the requested port, creating it if needed.
    ///
    /// Callers with the same `owner` asking for the same port share one
    /// handle. A port held by a different owner yields [`Error::PortInUse`].
    /// If the transport fails to open, the error is returned and the port is
    /// left free.
    pub fn acquire(&self, owner: impl Into<OwnerTag>, request: OpenRequest) -> Result<Arc<Connection>> {
        let owner = owner.into();
        let key = self.resolve_key(&request);

        loop {
            let (handle, created) = self.lookup_or_insert(&owner, &key, &request)?;
            if created {
                self.initialize(&handle, &request)?;
                return Ok(handle);
            }
            if handle.wait_ready() {
                debug!(
                    "Using existing {} instance on {}",
                    owner,
                    Error::port_label(key.as_deref())
                );
                return Ok(handle);
            }
            // Construction failed or the handle was finalized meanwhile.
        }
    }

    fn resolve_key(&self, request: &OpenRequest) -> PortKey {
        if let Some(port) = &request.port {
            return Some(self.settings.resolve_port(port));
        }

        let serial_number = request.serial_number.as_deref()?;
        match discovery::resolve_port_from_serial(self.discovery.as_ref(), serial_number) {
            Ok(port) => {
                if port.is_none() {
                    debug!("No port reports serial number {}", serial_number);
                }
                port
            }
            Err(e) => {
                warn!("Could not resolve serial number {}: {}", serial_number, e);
                None
            }
        }
    }

    fn lookup_or_insert(
        &self,
        owner: &OwnerTag,
        key: &PortKey,
        request: &OpenRequest,
    ) -> Result<(Arc<Connection>, bool)> {
        let mut table = self.shared.table.lock();
        loop {
            let existing = table
                .get(key)
                .map(|entry| (entry.owner.clone(), entry.handle.upgrade()));

            match existing {
                None => break,
                Some((holder, Some(handle))) if !handle.is_finalized() => {
                    if holder == *owner {
                        return Ok((handle, false));
                    }
                    // The upgraded handle may be the last reference; dropping it
                    // finalizes, which needs the table lock.
                    drop(table);
                    drop(handle);
                    return Err(Error::PortInUse {
                        port: Error::port_label(key.as_deref()),
                        owner: holder,
                    });
                }
                Some((_, closing)) => {
                    // Still closing its transport. Dropping our reference here
                    // is safe: finalization has already started, so it cannot
                    // re-enter the table.
                    drop(closing);
                    debug!(
                        "Waiting for {} to be released",
                        Error::port_label(key.as_deref())
                    );
                    self.shared.released.wait(&mut table);
                }
            }
        }

        let config = request
            .config
            .clone()
            .unwrap_or_else(|| self.settings.default_config.clone());
        let handle = Arc::new(Connection::new(
            key.clone(),
            owner.clone(),
            config,
            self.factory.create(),
            Arc::downgrade(&self.shared),
        ));
        table.insert(
            key.clone(),
            Entry {
                owner: owner.clone(),
                handle: Arc::downgrade(&handle),
            },
        );
        Ok((handle, true))
    }

    fn initialize(&self, handle: &Arc<Connection>, request: &OpenRequest) -> Result<()> {
        let key = handle.key().clone();
        debug!(
            "Creating new {} instance on {}",
            handle.owner(),
            Error::port_label(key.as_deref())
        );

        let Some(port) = key else {
            handle.mark_ready(None);
            return Ok(());
        };

        if let Err(e) = handle.bind_port(port.clone()) {
            handle.finalize();
            return Err(e);
        }

        if request.connect.unwrap_or(self.settings.connect_on_acquire) {
            if let Err(e) = handle.open() {
                warn!("Failed to open {}: {}", port, e);
                handle.finalize();
                return Err(e);
            }
        }

        let port_info = match discovery::find_port(self.discovery.as_ref(), &port) {
            Ok(info) => info,
            Err(e) => {
                warn!("Could not enumerate ports for {}: {}", port, e);
                None
            }
        };
        handle.mark_ready(port_info);
        Ok(())
    }

    /// The live handle for `port`, if one is registered.
    ///
    /// A handle still being constructed is waited for; one that fails to
    /// open, or is being finalized, yields `None`.
    pub fn get(&self, port: Option<&str>) -> Option<Arc<Connection>> {
        let key = port.map(str::to_string);
        let handle = self
            .shared
            .table
            .lock()
            .get(&key)
            .and_then(|entry| entry.handle.upgrade())?;
        if handle.wait_ready() {
            Some(handle)
        } else {
            None
        }
    }

    /// Owner currently holding `port`.
    pub fn owner_of(&self, port: Option<&str>) -> Option<OwnerTag> {
        self.get(port).map(|handle| handle.owner().clone())
    }

    /// Snapshot of all live registrations, sorted by port.
    pub fn registrations(&self) -> Vec<Registration> {
        let handles = self.live_handles();
        let mut registrations: Vec<Registration> = handles
            .iter()
            .map(|handle| Registration {
                port: handle.key().clone(),
                owner: handle.owner().clone(),
            })
            .collect();
        drop(handles);
        registrations.sort_by(|a, b| a.port.cmp(&b.port));
        registrations
    }

    pub fn len(&self) -> usize {
        self.registrations().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finalize every live handle. Outstanding `Arc`s stay valid but refer to
    /// closed, unregistered handles.
    pub fn shutdown(&self) {
        let handles = self.live_handles();
        debug!("Shutting down registry with {} handles", handles.len());
        for handle in &handles {
            handle.finalize();
        }
    }

    /// Handles that are neither dropped nor finalized. Entries of handles
    /// still closing are left for `detach` to remove.
    fn live_handles(&self) -> Vec<Arc<Connection>> {
        let handles: Vec<Arc<Connection>> = self
            .shared
            .table
            .lock()
            .values()
            .filter_map(|entry| entry.handle.upgrade())
            .collect();
        handles
            .into_iter()
            .filter(|handle| !handle.is_finalized())
            .collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
