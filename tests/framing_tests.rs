//! Framed I/O over loopback handles and format-spec properties.

mod common;

use common::{child1, Harness};
use pretty_assertions::assert_eq;
use proptest::collection::vec;
use proptest::prelude::*;
use serial_registry::{
    Error, FormatSpec, MockTransportFactory, NumericArray, OpenRequest, Payload, ReadSpec, Reply,
    Value,
};

#[test]
fn test_packed_write_then_formatted_read() {
    let h = Harness::new();
    let handle = h.registry.acquire(child1(), OpenRequest::port("LOOP")).unwrap();
    let spec = FormatSpec::new("<3B").unwrap();

    let written = handle
        .write(Payload::packed([1u8, 2, 3], spec.clone()))
        .unwrap();
    assert_eq!(written, 3);

    let reply = handle.read(spec).unwrap();
    assert_eq!(
        reply,
        Reply::Values(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
}

#[test]
fn test_mixed_record_over_loopback() {
    let h = Harness::new();
    let handle = h.registry.acquire(child1(), OpenRequest::port("LOOP")).unwrap();
    let spec = FormatSpec::new(">H?4sd").unwrap();
    let values = vec![
        Value::from(0xBEEFu16),
        Value::from(true),
        Value::from(b"abcd".to_vec()),
        Value::from(-2.5f64),
    ];

    handle.write((values.clone(), spec.clone())).unwrap();
    assert_eq!(handle.read_values(&spec).unwrap(), values);
}

#[test]
fn test_query_with_text_command() {
    let h = Harness::with_factory(MockTransportFactory::new());
    let handle = h.registry.acquire(child1(), OpenRequest::port("DEV")).unwrap();
    let port = h.factory.port_named("DEV").unwrap();
    port.enqueue_read(&[0x10, 0x27]);

    let reply = handle
        .query("READ?\n", FormatSpec::new("<H").unwrap())
        .unwrap();
    assert_eq!(reply.into_values().unwrap(), vec![Value::Int(10_000)]);
    assert_eq!(port.written_bytes(), b"READ?\n");
}

#[test]
fn test_read_spec_from_string() {
    let h = Harness::new();
    let handle = h.registry.acquire(child1(), OpenRequest::port("LOOP")).unwrap();
    handle.write(vec![Payload::from("ok"), Payload::Integer(0)]).unwrap();

    let spec: ReadSpec = "3".parse().unwrap();
    assert_eq!(handle.read(spec).unwrap().into_bytes().unwrap(), b"ok\0");
}

#[test]
fn test_formatted_read_short_of_data() {
    let h = Harness::new();
    let handle = h.registry.acquire(child1(), OpenRequest::port("LOOP")).unwrap();
    handle.write(b"\x01\x02").unwrap();

    match handle.read(FormatSpec::new("<I").unwrap()) {
        Err(Error::Timeout { expected, received }) => {
            assert_eq!((expected, received), (4, 2));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[test]
fn test_pack_mismatch_writes_nothing() {
    let h = Harness::new();
    let handle = h.registry.acquire(child1(), OpenRequest::port("LOOP")).unwrap();

    let too_big = Payload::packed([300u16], FormatSpec::new("<B").unwrap());
    assert!(matches!(handle.write(too_big), Err(Error::FormatMismatch(_))));
    assert!(h.factory.port_named("LOOP").unwrap().get_write_log().is_empty());
}

#[test]
fn test_invalid_format_string() {
    assert!(matches!(
        FormatSpec::new("<3Z").map_err(Error::from),
        Err(Error::InvalidFormat(_))
    ));
}

#[test]
fn test_shared_handle_serves_both_callers() {
    let h = Harness::new();
    let first = h.registry.acquire(child1(), OpenRequest::port("LOOP")).unwrap();
    let second = h.registry.acquire(child1(), OpenRequest::port("LOOP")).unwrap();

    first.write("xy").unwrap();
    assert_eq!(second.read_bytes(2).unwrap(), b"xy");
}

/// One field of a record: its format code and the value that fits it. Pad
/// fields carry no value.
fn field(native: bool) -> BoxedStrategy<(String, Option<Value>)> {
    let integers = prop_oneof![
        any::<u8>().prop_map(|v| ("B".to_string(), Some(Value::from(v)))),
        any::<i8>().prop_map(|v| ("b".to_string(), Some(Value::from(v)))),
        any::<u16>().prop_map(|v| ("H".to_string(), Some(Value::from(v)))),
        any::<i16>().prop_map(|v| ("h".to_string(), Some(Value::from(v)))),
        any::<u32>().prop_map(|v| ("I".to_string(), Some(Value::from(v)))),
        any::<i32>().prop_map(|v| ("i".to_string(), Some(Value::from(v)))),
        // 32-bit values fit `l`/`L` in every mode.
        any::<i32>().prop_map(|v| ("l".to_string(), Some(Value::from(v)))),
        any::<u32>().prop_map(|v| ("L".to_string(), Some(Value::from(v)))),
        any::<u64>().prop_map(|v| ("Q".to_string(), Some(Value::from(v)))),
        any::<i64>().prop_map(|v| ("q".to_string(), Some(Value::from(v)))),
    ];
    let others = prop_oneof![
        any::<bool>().prop_map(|v| ("?".to_string(), Some(Value::from(v)))),
        (-1.0e6f32..1.0e6f32).prop_map(|v| ("f".to_string(), Some(Value::from(v)))),
        (-1.0e300f64..1.0e300f64).prop_map(|v| ("d".to_string(), Some(Value::from(v)))),
        any::<u8>().prop_map(|v| ("c".to_string(), Some(Value::from(vec![v])))),
        vec(any::<u8>(), 1..8).prop_map(|v| (format!("{}s", v.len()), Some(Value::from(v)))),
        (1usize..10)
            .prop_flat_map(|n| (Just(n), vec(any::<u8>(), 0..n)))
            .prop_map(|(n, v)| (format!("{n}p"), Some(Value::from(v)))),
        (1usize..4).prop_map(|n| (format!("{n}x"), None)),
    ];
    if native {
        let sizes = prop_oneof![
            any::<isize>().prop_map(|v| ("n".to_string(), Some(Value::from(v)))),
            any::<usize>().prop_map(|v| ("N".to_string(), Some(Value::from(v)))),
        ];
        prop_oneof![integers, others, sizes].boxed()
    } else {
        prop_oneof![integers, others].boxed()
    }
}

fn record() -> impl Strategy<Value = (String, Vec<Value>)> {
    prop_oneof![
        Just(""),
        Just("@"),
        Just("="),
        Just("<"),
        Just(">"),
        Just("!")
    ]
    .prop_flat_map(|order| {
        let native = matches!(order, "" | "@");
        (Just(order), vec(field(native), 1..10))
    })
    .prop_map(|(order, fields)| {
        let mut format = order.to_string();
        let mut values = Vec::with_capacity(fields.len());
        for (code, value) in fields {
            format.push_str(&code);
            values.extend(value);
        }
        (format, values)
    })
}

fn small_payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        vec(any::<u8>(), 0..16).prop_map(Payload::from),
        "[a-zA-Zµ°0-9 ]{0,12}".prop_map(Payload::from),
        (0i64..=255).prop_map(Payload::Integer),
        vec(any::<i16>(), 0..8).prop_map(|v| Payload::from(NumericArray::from(v))),
        vec(any::<f32>(), 0..4).prop_map(|v| Payload::from(NumericArray::from(v))),
    ]
}

proptest! {
    #[test]
    fn prop_pack_unpack_round_trip((format, values) in record()) {
        let spec = FormatSpec::new(&format).unwrap();
        let bytes = spec.pack(&values).unwrap();
        prop_assert_eq!(bytes.len(), spec.size());
        prop_assert_eq!(spec.unpack(&bytes).unwrap(), values);
    }

    #[test]
    fn prop_byte_conversion_is_total_and_deterministic(
        items in vec(small_payload(), 0..6)
    ) {
        let sequence = Payload::Sequence(items.clone());
        let first = sequence.to_bytes().unwrap();
        let second = sequence.to_bytes().unwrap();
        prop_assert_eq!(&first, &second);

        let concatenated: Vec<u8> = items
            .iter()
            .flat_map(|item| item.to_bytes().unwrap())
            .collect();
        prop_assert_eq!(first, concatenated);
    }

    #[test]
    fn prop_loopback_returns_what_was_written(data in vec(any::<u8>(), 1..64)) {
        let h = Harness::new();
        let handle = h.registry.acquire(child1(), OpenRequest::port("LOOP")).unwrap();
        let written = handle.write(data.clone()).unwrap();
        prop_assert_eq!(written, data.len());
        prop_assert_eq!(handle.read_bytes(data.len()).unwrap(), data);
    }
}
