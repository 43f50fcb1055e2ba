//! Helpers for hardware runs: the target port from the environment and a
//! registry bound to the real system.

use serial_registry::config::TestingConfig;
use serial_registry::{
    ConfigLoader, PortConfiguration, PortDiscovery, PortInfo, Registry, SystemDiscovery,
};

/// The `[testing]` section after environment overrides, if a port is set.
pub fn testing_config() -> Option<TestingConfig> {
    let testing = ConfigLoader::with_defaults().ok()?.into_config().testing;
    if testing.port.is_none() {
        println!("Skipping hardware test: TEST_PORT not set");
        return None;
    }
    Some(testing)
}

pub fn port_configuration(testing: &TestingConfig) -> PortConfiguration {
    PortConfiguration {
        baud_rate: testing.baud,
        timeout: testing.timeout(),
        ..PortConfiguration::default()
    }
}

pub fn system_registry() -> Registry {
    Registry::system()
}

pub fn available_ports() -> Vec<PortInfo> {
    SystemDiscovery.list_ports().unwrap_or_default()
}

pub fn print_available_ports() {
    let ports = available_ports();
    if ports.is_empty() {
        println!("No serial ports detected on this system");
        return;
    }
    println!("Available serial ports ({}):", ports.len());
    for port in &ports {
        println!(
            "  {} [{}] {}",
            port.device,
            port.kind.as_str(),
            port.hwid.as_deref().unwrap_or("-")
        );
    }
}
