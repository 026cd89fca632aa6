// SPDX-License-Identifier: GPL-3.0-or-later

use apt_protocol::CodecError;
use thiserror::Error;

/// The flat error taxonomy shared by the connection core and every device
/// controller built on top of it.
#[derive(Debug, Error)]
pub enum AptError {
    /// Out-of-range argument, or a physical-unit value of the wrong
    /// dimensionality, rejected before any bytes are written.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation attempted on a connection that is not `Open` (unopened,
    /// closing, or closed).
    #[error("invalid connection state: {0}")]
    InvalidState(String),

    /// A frame failed to decode: wrong message id, wrong data length, or a
    /// missing/unexpected data bit.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] CodecError),

    /// The underlying transport failed mid-operation.
    #[error("transport I/O error: {0}")]
    TransportIo(String),

    /// The transport reported EOF, or the connection is shutting down. This
    /// is expected during `close` and is logged at debug rather than surfaced
    /// as a caller-visible failure in that path.
    #[error("transport closed")]
    TransportClosed,

    /// A reply-expecting send did not observe a matching message within its
    /// deadline.
    #[error("timed out waiting for a reply")]
    Timeout,

    /// The requested serial number is not present among attached ports.
    #[error("port not found for serial number {0}")]
    PortNotFound(String),
}

impl From<std::io::Error> for AptError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe | ErrorKind::ConnectionAborted => {
                AptError::TransportClosed
            }
            _ => AptError::TransportIo(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AptError>;
