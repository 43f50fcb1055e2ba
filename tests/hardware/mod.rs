//! Tests against real serial devices.
//!
//! Ignored by default. Point them at a device with `TEST_PORT` (plus the
//! optional `TEST_BAUD` and `TEST_LOOPBACK=1`) and run with `--ignored`.

pub mod loopback_tests;
pub mod port_discovery_tests;
pub mod utils;
