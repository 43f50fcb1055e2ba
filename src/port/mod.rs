//! Transport abstraction for serial communication.
//!
//! Provides the `Transport` trait consumed by the registry, a real
//! implementation over `serialport`, and mocks for testing.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockSerialPort, MockTransportFactory};
pub use sync_port::{SerialTransportFactory, SyncSerialPort};
pub use traits::*;
