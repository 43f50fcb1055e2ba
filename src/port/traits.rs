//! Core traits for the transport abstraction.
//!
//! Defines the `Transport` trait that lets the registry drive both real serial
//! ports and in-memory mocks through the same open/close/read/write surface.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration parameters for a serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Read/write timeout. Also bounds how long a framed read waits for data.
    pub timeout: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_secs(1),
        }
    }
}

impl PortConfiguration {
    /// Same configuration with a different baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Same configuration with a different timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Line settings that map one-to-one onto `serialport`'s enums.
macro_rules! line_setting {
    ($(#[$doc:meta] $name:ident { $($variant:ident),+ $(,)? })+) => {$(
        #[$doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl From<$name> for serialport::$name {
            fn from(value: $name) -> Self {
                match value {
                    $($name::$variant => serialport::$name::$variant),+
                }
            }
        }
    )+};
}

line_setting! {
    /// Number of data bits per character.
    DataBits { Five, Six, Seven, Eight }
    /// Flow control mode.
    FlowControl { None, Software, Hardware }
    /// Parity checking mode.
    Parity { None, Odd, Even }
    /// Number of stop bits.
    StopBits { One, Two }
}

/// A serial transport session.
///
/// Transports are created closed by a [`TransportFactory`] and opened by the
/// registry once the owning handle has bound its port.
pub trait Transport: Send + fmt::Debug {
    /// Open the transport on `port` with the given configuration.
    fn open(&mut self, port: &str, config: &PortConfiguration) -> Result<(), PortError>;

    /// Close the transport. Closing a closed transport is a no-op.
    fn close(&mut self) -> Result<(), PortError>;

    /// Whether the transport is currently open.
    fn is_open(&self) -> bool;

    /// The port the transport was last opened on, if any.
    fn port(&self) -> Option<String>;

    /// Write bytes to the port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the port into the provided buffer.
    ///
    /// Returns the number of bytes actually read.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Set the read/write timeout for this port.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Discard unread input and unsent output.
    fn clear_buffers(&mut self) -> Result<(), PortError>;

    /// Bytes available to read, if the transport can tell.
    fn bytes_to_read(&self) -> Option<usize> {
        None
    }
}

/// Creates fresh, unopened transports for new registry handles.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Box<dyn Transport> + Send + Sync,
{
    fn create(&self) -> Box<dyn Transport> {
        self()
    }
}
