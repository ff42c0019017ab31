//! Wire codec error types.

use thiserror::Error;

/// Errors raised while decoding SCTP socket API structures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Buffer shorter than the structure being decoded
    #[error("truncated {what}: need {need} bytes, have {have}")]
    Truncated {
        /// Structure being decoded
        what: &'static str,
        /// Bytes required
        need: usize,
        /// Bytes available
        have: usize,
    },

    /// Declared notification length disagrees with the buffer
    #[error("length mismatch: header declares {declared}, buffer holds {actual}")]
    Length {
        /// Length from the notification header
        declared: usize,
        /// Bytes actually received
        actual: usize,
    },

    /// Payload protocol identifier text is not a 32-bit unsigned decimal
    #[error("invalid payload protocol id: {0}")]
    Ppid(String),
}
