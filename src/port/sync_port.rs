//! Synchronous serial port transport.
//!
//! Wraps the `serialport` crate's `SerialPort` trait object behind our own
//! `Transport` trait so the registry can create it closed and open it later.

use super::error::PortError;
use super::traits::{PortConfiguration, Transport, TransportFactory};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Serial transport backed by `serialport`.
#[derive(Default)]
pub struct SyncSerialPort {
    /// The underlying serial port, present while open.
    port: Option<Box<dyn serialport::SerialPort>>,
    /// The port name/path the transport was last opened on.
    name: Option<String>,
}

impl SyncSerialPort {
    /// Create a closed transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a serial port with the given configuration.
    ///
    /// # Example
    /// ```no_run
    /// use serial_registry::port::{PortConfiguration, SyncSerialPort};
    ///
    /// let port = SyncSerialPort::open_with("/dev/ttyUSB0", &PortConfiguration::default())?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open_with(port_name: &str, config: &PortConfiguration) -> Result<Self, PortError> {
        let mut port = Self::new();
        port.open(port_name, config)?;
        Ok(port)
    }

    /// Get a reference to the underlying serialport implementation, if open.
    pub fn as_raw(&self) -> Option<&dyn serialport::SerialPort> {
        self.port.as_deref()
    }

    fn inner(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, PortError> {
        self.port.as_mut().ok_or(PortError::NotOpen)
    }
}

impl Transport for SyncSerialPort {
    fn open(&mut self, port_name: &str, config: &PortConfiguration) -> Result<(), PortError> {
        if self.port.is_some() {
            return Err(PortError::AlreadyOpen);
        }

        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(config.data_bits.into())
            .flow_control(config.flow_control.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(config.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        debug!("Serial connection to {} opened", port_name);
        self.port = Some(port);
        self.name = Some(port_name.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<(), PortError> {
        // Dropping the serialport handle releases the device.
        if self.port.take().is_some() {
            debug!(
                "Serial connection to {} closed",
                self.name.as_deref().unwrap_or("<unbound>")
            );
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port(&self) -> Option<String> {
        self.name.clone()
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.inner()?.write(data).map_err(PortError::Io)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.inner()?.read(buffer).map_err(PortError::Io)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.inner()?.set_timeout(timeout).map_err(PortError::Serial)
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        self.inner()?
            .clear(serialport::ClearBuffer::All)
            .map_err(PortError::Serial)
    }

    fn bytes_to_read(&self) -> Option<usize> {
        self.port
            .as_ref()
            .and_then(|p| p.bytes_to_read().ok())
            .map(|n| n as usize)
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.as_ref().and_then(|p| p.baud_rate().ok()))
            .finish()
    }
}

/// Factory producing closed [`SyncSerialPort`] transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialTransportFactory;

impl TransportFactory for SerialTransportFactory {
    fn create(&self) -> Box<dyn Transport> {
        Box::new(SyncSerialPort::new())
    }
}
