//! Unified error type for registry and framing operations.

use crate::discovery::DiscoveryError;
use crate::framing::FormatError;
use crate::port::PortError;
use crate::registry::OwnerTag;
use thiserror::Error;

/// A specialized `Result` type for registry and framing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the registry and by framed I/O on a handle.
///
/// Nothing is retried internally; every variant reaches the immediate caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The port is already held by a handle of a different owner.
    #[error("{port} is already in use by an instance of {owner}")]
    PortInUse { port: String, owner: OwnerTag },

    /// The handle's port was already bound during construction.
    #[error("Port cannot be changed after instantiation (bound to {port})")]
    PortAlreadyBound { port: String },

    /// Values do not fit the format spec they are packed or unpacked with.
    #[error("Format mismatch: {0}")]
    FormatMismatch(#[source] FormatError),

    /// The format string itself could not be parsed.
    #[error("Invalid format string: {0}")]
    InvalidFormat(#[source] FormatError),

    /// The payload has no byte conversion.
    #[error("Unsupported payload: {0}")]
    UnsupportedPayload(String),

    /// The transport failed; passed through unmodified.
    #[error(transparent)]
    Transport(#[from] PortError),

    /// A formatted read did not receive enough bytes before the timeout.
    #[error("Read timed out: expected {expected} bytes, received {received}")]
    Timeout { expected: usize, received: usize },

    /// Port enumeration failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

impl From<FormatError> for Error {
    fn from(err: FormatError) -> Self {
        if err.is_parse_error() {
            Self::InvalidFormat(err)
        } else {
            Self::FormatMismatch(err)
        }
    }
}

impl Error {
    /// Display form of an optional port key.
    pub(crate) fn port_label(port: Option<&str>) -> String {
        port.unwrap_or("<unbound>").to_string()
    }
}
