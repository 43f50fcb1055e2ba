//! Mock serial transport for testing.
//!
//! Provides a `MockSerialPort` that simulates serial port behavior without
//! requiring actual hardware, and a `MockTransportFactory` that hands such
//! ports to the registry while keeping clones around for inspection.

use super::error::PortError;
use super::traits::{PortConfiguration, Transport, TransportFactory};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Inner state of the mock port, shared between clones.
#[derive(Debug, Default)]
struct MockPortState {
    /// Port name set on open.
    name: Option<String>,
    /// Whether the port is open.
    open: bool,
    /// Number of successful `open` calls.
    open_count: usize,
    /// Queue of bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all writes.
    write_log: Vec<Vec<u8>>,
    /// Written bytes are fed back into the read queue.
    loopback: bool,
    /// Whether the next read/write should time out.
    should_timeout: bool,
    /// Configured timeout duration.
    timeout: Duration,
    /// Artificial delay applied inside `open`.
    open_delay: Duration,
    /// Whether `open` should fail.
    fail_open: bool,
    /// Whether `close` should fail.
    fail_close: bool,
    /// Upper bound on bytes accepted per write, to simulate partial writes.
    write_limit: Option<usize>,
}

/// Mock serial transport.
///
/// This implementation allows you to:
/// - Enqueue data to be returned by read operations
/// - Inspect what data was written
/// - Loop writes back into the read queue
/// - Simulate timeouts, failed opens and partial writes
///
/// # Example
/// ```
/// use serial_registry::port::{MockSerialPort, Transport};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"Hello, World!");
///
/// let mut buffer = [0u8; 13];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello, World!");
///
/// port.write_bytes(b"Response").unwrap();
/// assert_eq!(port.get_write_log(), vec![b"Response".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create an open mock port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let port = Self::unopened();
        {
            let mut state = port.state.lock();
            state.name = Some(name.into());
            state.open = true;
        }
        port
    }

    /// Create a closed mock port, as a factory would.
    pub fn unopened() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_secs(1),
                ..Default::default()
            })),
        }
    }

    /// Create an open mock port whose writes come back on read.
    pub fn loopback(name: impl Into<String>) -> Self {
        let port = Self::new(name);
        port.set_loopback(true);
        port
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// All written bytes concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    /// Clear the write log.
    pub fn clear_write_log(&self) {
        self.state.lock().write_log.clear();
    }

    pub fn set_loopback(&self, loopback: bool) {
        self.state.lock().loopback = loopback;
    }

    /// Set whether the next read/write operation should time out.
    pub fn set_should_timeout(&self, should_timeout: bool) {
        self.state.lock().should_timeout = should_timeout;
    }

    /// Make `open` sleep before succeeding.
    pub fn set_open_delay(&self, delay: Duration) {
        self.state.lock().open_delay = delay;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.state.lock().fail_close = fail;
    }

    /// Accept at most `limit` bytes per write.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.state.lock().write_limit = limit;
    }

    /// Number of times the port has been opened.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }

    /// Name the port was opened with.
    pub fn name(&self) -> Option<String> {
        self.state.lock().name.clone()
    }
}

impl Transport for MockSerialPort {
    fn open(&mut self, port: &str, config: &PortConfiguration) -> Result<(), PortError> {
        let delay = self.state.lock().open_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if state.open {
            return Err(PortError::AlreadyOpen);
        }
        if state.fail_open {
            return Err(PortError::not_found(port));
        }
        state.name = Some(port.to_string());
        state.timeout = config.timeout;
        state.open = true;
        state.open_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.open = false;
        if state.fail_close {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device vanished",
            )));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn port(&self) -> Option<String> {
        self.name()
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }
        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }

        let accepted = state.write_limit.map_or(data.len(), |n| n.min(data.len()));
        let chunk = data[..accepted].to_vec();
        if state.loopback {
            state.read_queue.extend(&chunk);
        }
        state.write_log.push(chunk);
        Ok(accepted)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }
        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 && !buffer.is_empty() {
            Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "No data available",
            )))
        } else {
            Ok(bytes_read)
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state.lock().timeout = timeout;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        self.state.lock().read_queue.clear();
        Ok(())
    }

    fn bytes_to_read(&self) -> Option<usize> {
        Some(self.available_bytes())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockSerialPort")
            .field("name", &state.name)
            .field("open", &state.open)
            .field("available_bytes", &state.read_queue.len())
            .finish()
    }
}

/// Factory handing out [`MockSerialPort`]s and remembering every one it made.
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    loopback: bool,
    open_delay: Duration,
    failing_ports: Mutex<HashSet<String>>,
    created: Mutex<Vec<MockSerialPort>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every created port echoes its writes.
    pub fn loopback() -> Self {
        Self {
            loopback: true,
            ..Self::default()
        }
    }

    /// Every created port sleeps for `delay` inside `open`.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Opening `port` will fail with `PortError::NotFound`.
    pub fn fail_port(&self, port: impl Into<String>) {
        self.failing_ports.lock().insert(port.into());
    }

    /// Number of transports created so far.
    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    /// Clones of all transports created so far.
    pub fn created(&self) -> Vec<MockSerialPort> {
        self.created.lock().clone()
    }

    /// The most recent transport opened on `port`.
    pub fn port_named(&self, port: &str) -> Option<MockSerialPort> {
        self.created
            .lock()
            .iter()
            .rev()
            .find(|p| p.name().as_deref() == Some(port))
            .cloned()
    }
}

/// Transport produced by [`MockTransportFactory`]; fails `open` for ports the
/// factory was told to reject.
#[derive(Debug)]
struct FactoryMock {
    inner: MockSerialPort,
    failing_ports: HashSet<String>,
}

impl Transport for FactoryMock {
    fn open(&mut self, port: &str, config: &PortConfiguration) -> Result<(), PortError> {
        if self.failing_ports.contains(port) {
            self.inner.set_fail_open(true);
        }
        self.inner.open(port, config)
    }

    fn close(&mut self) -> Result<(), PortError> {
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn port(&self) -> Option<String> {
        self.inner.port()
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.inner.write_bytes(data)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.inner.read_bytes(buffer)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.inner.set_timeout(timeout)
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        self.inner.clear_buffers()
    }

    fn bytes_to_read(&self) -> Option<usize> {
        self.inner.bytes_to_read()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self) -> Box<dyn Transport> {
        let port = MockSerialPort::unopened();
        port.set_loopback(self.loopback);
        port.set_open_delay(self.open_delay);
        self.created.lock().push(port.clone());
        Box::new(FactoryMock {
            inner: port,
            failing_ports: self.failing_ports.lock().clone(),
        })
    }
}
