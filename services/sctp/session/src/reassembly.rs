//! Partial message reassembly.
//!
//! A message may arrive over several receives. The first receive allocates a
//! buffer of [`INITIAL_CAPACITY`] bytes; each later receive writes at the
//! current fill offset. When a receive ends without the end-of-record flag
//! and the buffer is exactly full, the buffer doubles.

use bytes::{Bytes, BytesMut};
use tracing::debug;

/// Size of a freshly allocated receive buffer
pub const INITIAL_CAPACITY: usize = 1024;

/// Reassembly state of one connection
#[derive(Debug, Default)]
pub enum Reassembly {
    /// No message in progress, no buffer held
    #[default]
    Empty,
    /// Part of a message has been received
    Reassembling {
        /// Receive buffer, its length is the capacity
        buf: BytesMut,
        /// Bytes received so far
        filled: usize,
    },
}

/// Outcome of recording a receive
#[derive(Debug, PartialEq, Eq)]
pub enum Progress {
    /// More parts are expected
    Partial,
    /// The message is complete
    Complete(Bytes),
}

impl Reassembly {
    /// Free space for the next receive, allocating the buffer if needed
    pub fn recv_window(&mut self) -> &mut [u8] {
        if matches!(self, Reassembly::Empty) {
            *self = Reassembly::Reassembling {
                buf: BytesMut::zeroed(INITIAL_CAPACITY),
                filled: 0,
            };
        } else {
            debug!("Setting the next read offset");
        }
        match self {
            Reassembly::Reassembling { buf, filled } => &mut buf[*filled..],
            Reassembly::Empty => &mut [],
        }
    }

    /// Record `received` bytes written into the last window
    pub fn advance(&mut self, received: usize, end_of_record: bool) -> Progress {
        let Reassembly::Reassembling { buf, filled } = self else {
            return Progress::Partial;
        };
        *filled = (*filled + received).min(buf.len());
        debug!(
            "{} bytes received, receive buffer now holds {} bytes",
            received, filled
        );

        if end_of_record {
            let mut message = std::mem::take(buf);
            message.truncate(*filled);
            *self = Reassembly::Empty;
            return Progress::Complete(message.freeze());
        }

        if *filled == buf.len() {
            debug!(
                "Resizing receive buffer: {} bytes -> {} bytes",
                buf.len(),
                buf.len() * 2
            );
            let doubled = buf.len() * 2;
            buf.resize(doubled, 0);
        }
        Progress::Partial
    }

    /// Drop any partial message
    pub fn reset(&mut self) {
        *self = Reassembly::Empty;
    }

    /// A message is in progress
    pub fn is_reassembling(&self) -> bool {
        matches!(self, Reassembly::Reassembling { .. })
    }

    /// Bytes received so far
    pub fn filled(&self) -> usize {
        match self {
            Reassembly::Reassembling { filled, .. } => *filled,
            Reassembly::Empty => 0,
        }
    }

    /// Current buffer size, 0 when no buffer is held
    pub fn capacity(&self) -> usize {
        match self {
            Reassembly::Reassembling { buf, .. } => buf.len(),
            Reassembly::Empty => 0,
        }
    }
}
