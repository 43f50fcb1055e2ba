//! Shared per-port connection handle.

use super::owner::OwnerTag;
use super::{PortKey, Shared};
use crate::discovery::PortInfo;
use crate::error::{Error, Result};
use crate::port::{PortConfiguration, PortError, Transport};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::Weak;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Created and registered; the creating caller is still opening it.
    Initializing,
    Ready,
    /// Closing the transport; the registry entry is still in place.
    Finalizing,
    Finalized,
}

#[derive(Debug)]
struct Lifecycle {
    phase: Phase,
    port: Option<String>,
    port_info: Option<PortInfo>,
    config: PortConfiguration,
}

/// A connection to one serial port, shared by every caller of the same owner
/// that asks for that port.
///
/// Handles are obtained from [`Registry::acquire`](super::Registry::acquire)
/// and live as long as any `Arc` to them does. Dropping the last `Arc`, or
/// calling [`finalize`](Connection::finalize), closes the transport and frees
/// the port for other owners.
pub struct Connection {
    key: PortKey,
    owner: OwnerTag,
    lifecycle: Mutex<Lifecycle>,
    ready: Condvar,
    transport: Mutex<Box<dyn Transport>>,
    registry: Weak<Shared>,
}

impl Connection {
    pub(crate) fn new(
        key: PortKey,
        owner: OwnerTag,
        config: PortConfiguration,
        transport: Box<dyn Transport>,
        registry: Weak<Shared>,
    ) -> Self {
        Self {
            key,
            owner,
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::Initializing,
                port: None,
                port_info: None,
                config,
            }),
            ready: Condvar::new(),
            transport: Mutex::new(transport),
            registry,
        }
    }

    /// Port this handle is bound to, if any.
    pub fn port(&self) -> Option<String> {
        self.lifecycle.lock().port.clone()
    }

    pub fn owner(&self) -> &OwnerTag {
        &self.owner
    }

    /// Registry key the handle was created under.
    pub(crate) fn key(&self) -> &PortKey {
        &self.key
    }

    /// Port description captured when the handle was created.
    pub fn port_info(&self) -> Option<PortInfo> {
        self.lifecycle.lock().port_info.clone()
    }

    /// Serial number of the bound port, as enumerated at creation.
    pub fn serial_number(&self) -> Option<String> {
        self.lifecycle
            .lock()
            .port_info
            .as_ref()
            .and_then(|info| info.serial_number.clone())
    }

    pub fn config(&self) -> PortConfiguration {
        self.lifecycle.lock().config.clone()
    }

    pub fn is_open(&self) -> bool {
        self.transport.lock().is_open()
    }

    /// Whether finalization has started.
    pub fn is_finalized(&self) -> bool {
        matches!(
            self.lifecycle.lock().phase,
            Phase::Finalizing | Phase::Finalized
        )
    }

    /// Rebind the handle to another port.
    ///
    /// The registry binds the port while constructing the handle, and a handle
    /// keeps that port for life, so this always fails with
    /// [`Error::PortAlreadyBound`].
    pub fn set_port(&self, _port: impl Into<String>) -> Result<()> {
        Err(Error::PortAlreadyBound {
            port: Error::port_label(self.lifecycle.lock().port.as_deref()),
        })
    }

    /// Bind the port during construction.
    pub(crate) fn bind_port(&self, port: impl Into<String>) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.phase != Phase::Initializing || lifecycle.port.is_some() {
            return Err(Error::PortAlreadyBound {
                port: Error::port_label(lifecycle.port.as_deref()),
            });
        }
        lifecycle.port = Some(port.into());
        Ok(())
    }

    /// Open the transport on the bound port.
    pub fn open(&self) -> Result<()> {
        let (port, config) = {
            let lifecycle = self.lifecycle.lock();
            if matches!(lifecycle.phase, Phase::Finalizing | Phase::Finalized) {
                return Err(PortError::NotOpen.into());
            }
            let port = lifecycle
                .port
                .clone()
                .ok_or_else(|| PortError::config("no port bound to this handle"))?;
            (port, lifecycle.config.clone())
        };

        self.transport.lock().open(&port, &config)?;
        debug!("{} opened {}", self.owner, port);
        Ok(())
    }

    /// Close the transport without giving up the registration.
    pub fn close(&self) -> Result<()> {
        self.transport.lock().close()?;
        Ok(())
    }

    /// Change the read timeout, applying it to the transport if it is open.
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.lifecycle.lock().config.timeout = timeout;
        let mut transport = self.transport.lock();
        if transport.is_open() {
            transport.set_timeout(timeout)?;
        }
        Ok(())
    }

    /// Discard anything buffered in either direction.
    pub fn clear_buffers(&self) -> Result<()> {
        self.transport.lock().clear_buffers()?;
        Ok(())
    }

    /// Bytes waiting in the input buffer, when the transport can tell.
    pub fn bytes_waiting(&self) -> Option<usize> {
        self.transport.lock().bytes_to_read()
    }

    /// Close the transport and remove the handle from its registry.
    ///
    /// Safe to call any number of times; only the first call does anything.
    /// Close failures are logged, never returned. The registry entry stays in
    /// place until the transport is closed, so no replacement handle can open
    /// the port before then.
    pub fn finalize(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if matches!(lifecycle.phase, Phase::Finalizing | Phase::Finalized) {
                return;
            }
            lifecycle.phase = Phase::Finalizing;
            self.ready.notify_all();
        }

        debug!(
            "Deleting {} instance on {}",
            self.owner,
            Error::port_label(self.key.as_deref())
        );

        if let Err(e) = self.transport.lock().close() {
            warn!(
                "Failed to close {}: {}",
                Error::port_label(self.key.as_deref()),
                e
            );
        }

        if let Some(shared) = self.registry.upgrade() {
            shared.detach(&self.key, self as *const Connection);
        }

        self.lifecycle.lock().phase = Phase::Finalized;
        self.ready.notify_all();
    }

    /// Publish the handle to waiting callers.
    pub(crate) fn mark_ready(&self, port_info: Option<PortInfo>) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.phase == Phase::Initializing {
            lifecycle.phase = Phase::Ready;
            lifecycle.port_info = port_info;
        }
        self.ready.notify_all();
    }

    /// Block until construction finishes. Returns `false` if the handle was
    /// finalized instead of becoming ready, or is being finalized.
    pub(crate) fn wait_ready(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        while lifecycle.phase == Phase::Initializing {
            self.ready.wait(&mut lifecycle);
        }
        lifecycle.phase == Phase::Ready
    }

    pub(crate) fn transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.lifecycle.lock();
        f.debug_struct("Connection")
            .field("owner", &self.owner)
            .field("port", &lifecycle.port)
            .field("phase", &lifecycle.phase)
            .finish()
    }
}
