//! Framed reads and writes on a [`Connection`].
//!
//! Payloads are converted to bytes before writing; reads either return raw
//! bytes or unpack a fixed-size record described by a [`FormatSpec`].

pub mod format;
pub mod payload;
pub mod value;

pub use format::{ByteOrder, FormatError, FormatSpec};
pub use payload::{NumericArray, Payload};
pub use value::Value;

use crate::error::{Error, Result};
use crate::port::Transport;
use crate::registry::Connection;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::trace;

/// What a read should return.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadSpec {
    /// Up to this many raw bytes.
    Count(usize),
    /// Exactly one record of this format, unpacked.
    Format(FormatSpec),
}

impl Default for ReadSpec {
    fn default() -> Self {
        Self::Count(1)
    }
}

impl From<usize> for ReadSpec {
    fn from(n: usize) -> Self {
        Self::Count(n)
    }
}

impl From<FormatSpec> for ReadSpec {
    fn from(spec: FormatSpec) -> Self {
        Self::Format(spec)
    }
}

impl FromStr for ReadSpec {
    type Err = FormatError;

    /// A bare number is a byte count; anything else is a format string.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().parse::<usize>() {
            Ok(n) => Ok(Self::Count(n)),
            Err(_) => Ok(Self::Format(s.parse()?)),
        }
    }
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Bytes(Vec<u8>),
    Values(Vec<Value>),
}

impl Reply {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::Values(_) => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::Values(_) => None,
        }
    }

    pub fn into_values(self) -> Option<Vec<Value>> {
        match self {
            Self::Values(v) => Some(v),
            Self::Bytes(_) => None,
        }
    }
}

impl Connection {
    /// Convert `payload` to bytes and write them.
    ///
    /// Returns the number of bytes the transport accepted, which may be fewer
    /// than the payload holds.
    pub fn write(&self, payload: impl Into<Payload>) -> Result<usize> {
        let bytes = payload.into().to_bytes()?;
        let mut transport = self.transport();
        write_locked(&mut **transport, &bytes)
    }

    /// Read according to `spec`.
    pub fn read(&self, spec: impl Into<ReadSpec>) -> Result<Reply> {
        let spec = spec.into();
        let timeout = self.config().timeout;
        let mut transport = self.transport();
        read_locked(&mut **transport, &spec, timeout)
    }

    /// Read up to `n` bytes, stopping early when the transport times out.
    pub fn read_bytes(&self, n: usize) -> Result<Vec<u8>> {
        let timeout = self.config().timeout;
        let mut transport = self.transport();
        read_up_to(&mut **transport, n, timeout)
    }

    /// Read one record of `spec` and unpack it.
    pub fn read_values(&self, spec: &FormatSpec) -> Result<Vec<Value>> {
        let timeout = self.config().timeout;
        let mut transport = self.transport();
        read_record(&mut **transport, spec, timeout)
    }

    /// Write `payload`, then read according to `spec`.
    ///
    /// The transport stays locked between the two steps, so no other caller
    /// sharing this handle can interleave its own exchange.
    pub fn query(&self, payload: impl Into<Payload>, spec: impl Into<ReadSpec>) -> Result<Reply> {
        let bytes = payload.into().to_bytes()?;
        let spec = spec.into();
        let timeout = self.config().timeout;
        let mut transport = self.transport();
        write_locked(&mut **transport, &bytes)?;
        read_locked(&mut **transport, &spec, timeout)
    }
}

fn write_locked(transport: &mut dyn Transport, bytes: &[u8]) -> Result<usize> {
    let written = transport.write_bytes(bytes)?;
    trace!("Wrote {}/{} bytes", written, bytes.len());
    Ok(written)
}

fn read_locked(transport: &mut dyn Transport, spec: &ReadSpec, timeout: Duration) -> Result<Reply> {
    match spec {
        ReadSpec::Count(n) => read_up_to(transport, *n, timeout).map(Reply::Bytes),
        ReadSpec::Format(format) => read_record(transport, format, timeout).map(Reply::Values),
    }
}

fn read_record(transport: &mut dyn Transport, spec: &FormatSpec, timeout: Duration) -> Result<Vec<Value>> {
    let expected = spec.size();
    let data = read_up_to(transport, expected, timeout)?;
    if data.len() < expected {
        return Err(Error::Timeout {
            expected,
            received: data.len(),
        });
    }
    Ok(spec.unpack(&data)?)
}

/// Largest single transport read. Callers may ask for far more than will
/// ever arrive, so the buffer grows with the data instead of with `n`.
const READ_CHUNK: usize = 4096;

/// Accumulate up to `n` bytes. A read that times out or returns nothing ends
/// the loop with whatever has arrived; `timeout` bounds the whole call.
fn read_up_to(transport: &mut dyn Transport, n: usize, timeout: Duration) -> Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut chunk = vec![0u8; n.min(READ_CHUNK)];
    let mut data = Vec::with_capacity(n.min(READ_CHUNK));

    while data.len() < n {
        let want = (n - data.len()).min(chunk.len());
        match transport.read_bytes(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(k) => data.extend_from_slice(&chunk[..k]),
            Err(e) if e.is_timeout() => break,
            Err(e) => return Err(e.into()),
        }
        if Instant::now() >= deadline {
            break;
        }
    }

    trace!("Read {}/{} bytes", data.len(), n);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::StaticDiscovery;
    use crate::port::{MockTransportFactory, PortError};
    use crate::registry::{OpenRequest, Registry};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn open(factory: MockTransportFactory) -> (Arc<Connection>, Arc<MockTransportFactory>) {
        let factory = Arc::new(factory);
        let registry = Registry::new(Arc::new(StaticDiscovery::empty()), factory.clone());
        let conn = registry.acquire("tester", OpenRequest::port("LOOP0")).unwrap();
        (conn, factory)
    }

    #[test]
    fn test_write_text_and_read_count() {
        let (conn, _) = open(MockTransportFactory::loopback());
        assert_eq!(conn.write("hello").unwrap(), 5);
        assert_eq!(conn.read(5usize).unwrap(), Reply::Bytes(b"hello".to_vec()));
    }

    #[test]
    fn test_short_count_read_returns_what_arrived() {
        let (conn, _) = open(MockTransportFactory::loopback());
        conn.write(b"ab").unwrap();
        assert_eq!(conn.read_bytes(8).unwrap(), b"ab");
        assert_eq!(conn.read_bytes(4).unwrap(), b"");
    }

    #[test]
    fn test_huge_count_read_allocates_only_what_arrives() {
        let (conn, _) = open(MockTransportFactory::loopback());
        conn.write(b"ok").unwrap();
        assert_eq!(conn.read_bytes(usize::MAX / 2).unwrap(), b"ok");
    }

    #[test]
    fn test_count_read_spans_several_chunks() {
        let (conn, _) = open(MockTransportFactory::loopback());
        let sent: Vec<u8> = (0..READ_CHUNK * 2 + 17).map(|i| i as u8).collect();
        conn.write(sent.clone()).unwrap();
        assert_eq!(conn.read_bytes(sent.len()).unwrap(), sent);
    }

    #[test]
    fn test_read_zero_bytes() {
        let (conn, _) = open(MockTransportFactory::loopback());
        assert_eq!(conn.read(0usize).unwrap(), Reply::Bytes(Vec::new()));
    }

    #[test]
    fn test_packed_round_trip() {
        let (conn, _) = open(MockTransportFactory::loopback());
        let spec = FormatSpec::new("<3B").unwrap();
        conn.write(Payload::packed([1u8, 2, 3], spec.clone())).unwrap();
        assert_eq!(
            conn.read(spec).unwrap().into_values().unwrap(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn test_short_format_read_times_out() {
        let (conn, _) = open(MockTransportFactory::loopback());
        conn.write(b"\x01").unwrap();
        let spec = FormatSpec::new("<H").unwrap();
        assert!(matches!(
            conn.read_values(&spec),
            Err(Error::Timeout { expected: 2, received: 1 })
        ));
    }

    #[test]
    fn test_query_writes_then_reads() {
        let (conn, factory) = open(MockTransportFactory::new());
        let port = factory.port_named("LOOP0").unwrap();
        port.enqueue_read(b"OK\r\n");

        let reply = conn.query("AT\r\n", 4usize).unwrap();
        assert_eq!(reply.as_bytes(), Some(&b"OK\r\n"[..]));
        assert_eq!(port.written_bytes(), b"AT\r\n");
    }

    #[test]
    fn test_partial_write_reports_count() {
        let (conn, factory) = open(MockTransportFactory::new());
        factory.port_named("LOOP0").unwrap().set_write_limit(Some(2));
        assert_eq!(conn.write("abcd").unwrap(), 2);
    }

    #[test]
    fn test_unsupported_payload_writes_nothing() {
        let (conn, factory) = open(MockTransportFactory::new());
        assert!(matches!(
            conn.write(Payload::Integer(300)),
            Err(Error::UnsupportedPayload(_))
        ));
        assert!(factory.port_named("LOOP0").unwrap().get_write_log().is_empty());
    }

    #[test]
    fn test_transport_errors_pass_through() {
        let (conn, _) = open(MockTransportFactory::loopback());
        conn.close().unwrap();
        assert!(matches!(
            conn.write("x"),
            Err(Error::Transport(PortError::NotOpen))
        ));
        assert!(matches!(
            conn.read(1usize),
            Err(Error::Transport(PortError::NotOpen))
        ));
    }

    #[test]
    fn test_read_spec_parsing() {
        assert_eq!("12".parse::<ReadSpec>().unwrap(), ReadSpec::Count(12));
        assert_eq!(
            "<2H".parse::<ReadSpec>().unwrap(),
            ReadSpec::Format(FormatSpec::new("<2H").unwrap())
        );
        assert!("<2Z".parse::<ReadSpec>().is_err());
        assert_eq!(ReadSpec::default(), ReadSpec::Count(1));
    }
}
