//! Open, write and read on a real port. The echo tests need TX bridged to RX
//! and `TEST_LOOPBACK=1`.

use super::utils::{port_configuration, system_registry, testing_config};
use serial_registry::{Error, FormatSpec, OpenRequest, OwnerTag, Payload, Value};

struct HardwareRig;
struct OtherDriver;

fn owner() -> OwnerTag {
    OwnerTag::of::<HardwareRig>()
}

#[test]
#[ignore]
fn test_open_close_reopen() {
    let Some(testing) = testing_config() else {
        return;
    };
    let port = testing.port.clone().unwrap_or_default();
    let registry = system_registry();

    let handle = registry
        .acquire(
            owner(),
            OpenRequest::port(&port).config(port_configuration(&testing)),
        )
        .unwrap();
    assert!(handle.is_open());

    handle.close().unwrap();
    assert!(!handle.is_open());
    handle.open().unwrap();
    assert!(handle.is_open());
}

#[test]
#[ignore]
fn test_second_owner_is_refused() {
    let Some(testing) = testing_config() else {
        return;
    };
    let port = testing.port.clone().unwrap_or_default();
    let registry = system_registry();

    let _held = registry
        .acquire(
            owner(),
            OpenRequest::port(&port).config(port_configuration(&testing)),
        )
        .unwrap();
    assert!(matches!(
        registry.acquire(OwnerTag::of::<OtherDriver>(), OpenRequest::port(&port)),
        Err(Error::PortInUse { .. })
    ));
}

#[test]
#[ignore]
fn test_loopback_echo_bytes() {
    let Some(testing) = testing_config() else {
        return;
    };
    if !testing.loopback_enabled {
        println!("Skipping: TEST_LOOPBACK not enabled");
        return;
    }
    let port = testing.port.clone().unwrap_or_default();
    let registry = system_registry();
    let handle = registry
        .acquire(
            owner(),
            OpenRequest::port(&port).config(port_configuration(&testing)),
        )
        .unwrap();
    handle.clear_buffers().unwrap();

    let message = b"loopback\r\n";
    assert_eq!(handle.write(message).unwrap(), message.len());
    assert_eq!(handle.read_bytes(message.len()).unwrap(), message);
}

#[test]
#[ignore]
fn test_loopback_echo_record() {
    let Some(testing) = testing_config() else {
        return;
    };
    if !testing.loopback_enabled {
        println!("Skipping: TEST_LOOPBACK not enabled");
        return;
    }
    let port = testing.port.clone().unwrap_or_default();
    let registry = system_registry();
    let handle = registry
        .acquire(
            owner(),
            OpenRequest::port(&port).config(port_configuration(&testing)),
        )
        .unwrap();
    handle.clear_buffers().unwrap();

    let spec = FormatSpec::new("<HhI").unwrap();
    let values = vec![Value::Int(513), Value::Int(-2), Value::Int(70_000)];
    handle
        .write(Payload::packed(values.clone(), spec.clone()))
        .unwrap();
    assert_eq!(handle.read_values(&spec).unwrap(), values);
}
