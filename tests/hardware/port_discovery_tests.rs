//! Discovery against whatever the host actually has attached.

use super::utils::{available_ports, print_available_ports, system_registry, testing_config};
use serial_registry::{resolve_port_from_serial, resolve_serial_from_port, SystemDiscovery};

#[test]
#[ignore]
fn test_enumerate_system_ports() {
    print_available_ports();
    for port in available_ports() {
        assert!(!port.device.is_empty());
        assert!(!port.name.is_empty());
    }
}

#[test]
#[ignore]
fn test_usb_serial_numbers_resolve_both_ways() {
    for port in available_ports() {
        let Some(serial) = port.serial_number.clone() else {
            continue;
        };
        let device = resolve_port_from_serial(&SystemDiscovery, &serial)
            .unwrap()
            .expect("listed serial number should resolve");
        // Two adapters may share a serial number; only the first is returned.
        if device == port.device {
            assert_eq!(
                resolve_serial_from_port(&SystemDiscovery, &device).unwrap(),
                Some(serial)
            );
        }
    }
}

#[test]
#[ignore]
fn test_acquire_records_port_info() {
    let Some(testing) = testing_config() else {
        return;
    };
    let port = testing.port.clone().unwrap_or_default();
    let registry = system_registry();

    struct Meter;
    let handle = registry
        .acquire(
            serial_registry::OwnerTag::of::<Meter>(),
            serial_registry::OpenRequest::port(&port).connect(false),
        )
        .unwrap();

    let listed = available_ports().into_iter().find(|p| p.device == port);
    assert_eq!(handle.port_info(), listed);
}
