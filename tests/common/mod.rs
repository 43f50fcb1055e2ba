//! Shared test utilities for the registry integration tests.
//!
//! This module provides common test infrastructure including:
//! - Registries backed by mock transports and a fixed port list
//! - Owner types standing in for device drivers

#![allow(dead_code)]

use serial_registry::{
    MockTransportFactory, OwnerTag, PortInfo, Registry, RegistrySettings, StaticDiscovery,
};
use std::sync::Arc;
use std::time::Duration;

/// First stand-in driver type.
pub struct Child1;

/// Second stand-in driver type.
pub struct Child2;

pub fn child1() -> OwnerTag {
    OwnerTag::of::<Child1>()
}

pub fn child2() -> OwnerTag {
    OwnerTag::of::<Child2>()
}

/// Ports the fixture discovery reports.
pub fn fixture_ports() -> Vec<PortInfo> {
    vec![
        PortInfo::new("/dev/ttyUSB0")
            .with_usb(0x0403, 0x6001)
            .with_serial_number("FT0001")
            .with_manufacturer("FTDI")
            .with_product("FT232R USB UART"),
        PortInfo::new("/dev/ttyUSB1")
            .with_usb(0x0403, 0x6001)
            .with_serial_number("FT0002")
            .with_manufacturer("FTDI"),
        PortInfo::new("/dev/ttyACM0")
            .with_usb(0x2341, 0x0043)
            .with_serial_number("ARD0042")
            .with_manufacturer("Arduino LLC"),
        PortInfo::new("/dev/ttyS0").with_description("ttyS0"),
    ]
}

/// A registry over [`fixture_ports`] whose transports echo every write.
pub struct Harness {
    pub registry: Registry,
    pub factory: Arc<MockTransportFactory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_factory(MockTransportFactory::loopback())
    }

    /// Every transport sleeps for `delay` while opening.
    pub fn slow(delay: Duration) -> Self {
        Self::with_factory(MockTransportFactory::loopback().with_open_delay(delay))
    }

    pub fn with_factory(factory: MockTransportFactory) -> Self {
        serial_registry::logging::init_for_tests();
        let factory = Arc::new(factory);
        let registry = Registry::new(
            Arc::new(StaticDiscovery::new(fixture_ports())),
            factory.clone(),
        );
        Self { registry, factory }
    }

    pub fn with_settings(mut self, settings: RegistrySettings) -> Self {
        self.registry = self.registry.with_settings(settings);
        self
    }
}
