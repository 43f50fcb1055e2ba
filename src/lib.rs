//! Serial Registry Library
//!
//! Shares serial port connections across a process. Every port is held by at
//! most one owner at a time, and all callers of that owner asking for the
//! port receive the same [`Connection`]. Handles carry typed I/O: payloads are
//! turned into bytes on write, and reads can unpack fixed-layout binary
//! records described by a [`FormatSpec`].
//!
//! # Modules
//!
//! - `registry`: Port-exclusive handle table and the [`Connection`] handle
//! - `framing`: Payload conversion, format specs and framed reads
//! - `discovery`: Port enumeration, serial-number lookup and filtering
//! - `port`: Transport abstraction over `serialport`, plus mocks
//! - `config`: Configuration management with TOML support
//! - `logging`: Tracing subscriber setup
//! - `error`: Unified error handling
//!
//! # Example
//!
//! ```no_run
//! use serial_registry::{FormatSpec, OpenRequest, OwnerTag, Registry};
//!
//! struct PowerMeter;
//!
//! let meter = Registry::global().acquire(OwnerTag::of::<PowerMeter>(), OpenRequest::port("/dev/ttyUSB0"))?;
//! meter.write("MEAS?\n")?;
//! let reading = meter.read_values(&FormatSpec::new("<f")?)?;
//! println!("{:?}", reading);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod framing;
pub mod logging;
pub mod port;
pub mod registry;

// Re-export commonly used types for convenience
pub use discovery::{
    filter_ports, resolve_port_from_serial, resolve_serial_from_port, DiscoveryError,
    PortDiscovery, PortFilter, PortInfo, StaticDiscovery, SystemDiscovery,
};
pub use error::{Error, Result};
pub use framing::{FormatError, FormatSpec, NumericArray, Payload, ReadSpec, Reply, Value};
pub use port::{
    DataBits, FlowControl, MockSerialPort, MockTransportFactory, Parity, PortConfiguration,
    PortError, StopBits, Transport, TransportFactory,
};
pub use registry::{Connection, OpenRequest, OwnerTag, Registration, Registry, RegistrySettings};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};

use std::sync::Arc;

/// Acquire a handle from the process-wide registry.
pub fn acquire(owner: impl Into<OwnerTag>, request: OpenRequest) -> Result<Arc<Connection>> {
    Registry::global().acquire(owner, request)
}
