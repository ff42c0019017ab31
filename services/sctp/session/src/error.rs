//! Session error types.

use crate::resolver::AddressFamily;
use crate::table::SlotId;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use thiserror::Error;

/// Result alias for endpoint operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that abort an endpoint operation.
///
/// Transient socket failures (send, deferred connect, option updates) are
/// reported as events instead and never surface here.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Bad parameter value, conflicting modes, or a missing address
    #[error("configuration error: {0}")]
    Config(String),

    /// Host name is neither a literal nor resolvable
    #[error("can't resolve host name: {name}")]
    AddressResolution {
        /// Name that failed to resolve
        name: String,
    },

    /// The socket call itself failed
    #[error("cannot create {family} socket: {source}")]
    SocketCreation {
        /// Requested address family
        family: AddressFamily,
        /// Platform error
        #[source]
        source: io::Error,
    },

    /// Binding to a local address failed
    #[error("bind to {addr} failed: {source}")]
    Bind {
        /// Local address
        addr: SocketAddr,
        /// Platform error
        #[source]
        source: io::Error,
    },

    /// Switching a socket to listening failed
    #[error("listen error on fd {fd}: {source}")]
    Listen {
        /// Listening socket
        fd: RawFd,
        /// Platform error
        #[source]
        source: io::Error,
    },

    /// Accepting on a ready listener failed
    #[error("accept error on listener fd {fd}: {source}")]
    Accept {
        /// Listening socket
        fd: RawFd,
        /// Platform error
        #[source]
        source: io::Error,
    },

    /// Every reconnect attempt failed
    #[error("remote endpoint unreachable after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// Table index is out of range or refers to a removed entry
    #[error("invalid table slot {0:?}")]
    InvalidSlot(SlotId),

    /// Operation targets an fd the endpoint does not own
    #[error("bad client id: {0}")]
    UnknownClient(RawFd),

    /// Other socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Broad classification of [`SessionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid configuration or usage
    Configuration,
    /// A system resource could not be obtained
    Resource,
    /// Automatic recovery gave up
    Recovery,
    /// Internal invariant violated
    Defect,
}

impl SessionError {
    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::Config(_) | SessionError::UnknownClient(_) => ErrorCategory::Configuration,
            SessionError::AddressResolution { .. }
            | SessionError::SocketCreation { .. }
            | SessionError::Bind { .. }
            | SessionError::Listen { .. }
            | SessionError::Accept { .. }
            | SessionError::Io(_) => ErrorCategory::Resource,
            SessionError::ReconnectExhausted { .. } => ErrorCategory::Recovery,
            SessionError::InvalidSlot(_) => ErrorCategory::Defect,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        SessionError::Config(message.into())
    }
}
