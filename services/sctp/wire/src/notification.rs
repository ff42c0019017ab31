//! SCTP notification decoding.
//!
//! Notifications arrive through the ordinary receive path with the
//! `MSG_NOTIFICATION` flag set. Every notification starts with the same
//! 8-byte header:
//!
//! ```text
//! +-----------+-----------+-----------------------+
//! | u16 type  | u16 flags | u32 length            |
//! +-----------+-----------+-----------------------+
//! | type specific body ...                        |
//! +-----------------------------------------------+
//! ```
//!
//! All fields are in host byte order. Bodies are decoded field by field
//! instead of reinterpreting the buffer as a C union.

use crate::error::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Size of the common notification header
pub const NOTIFICATION_HEADER_SIZE: usize = 8;

/// Base value of the notification type space
pub const SCTP_SN_TYPE_BASE: u16 = 1 << 15;
/// Association change notification
pub const SCTP_ASSOC_CHANGE: u16 = SCTP_SN_TYPE_BASE + 1;
/// Peer address change notification
pub const SCTP_PEER_ADDR_CHANGE: u16 = SCTP_SN_TYPE_BASE + 2;
/// Send failure notification
pub const SCTP_SEND_FAILED: u16 = SCTP_SN_TYPE_BASE + 3;
/// Remote (operational) error notification
pub const SCTP_REMOTE_ERROR: u16 = SCTP_SN_TYPE_BASE + 4;
/// Peer shutdown notification
pub const SCTP_SHUTDOWN_EVENT: u16 = SCTP_SN_TYPE_BASE + 5;
/// Partial delivery API notification
pub const SCTP_PARTIAL_DELIVERY_EVENT: u16 = SCTP_SN_TYPE_BASE + 6;
/// Adaptation layer indication
pub const SCTP_ADAPTATION_INDICATION: u16 = SCTP_SN_TYPE_BASE + 7;

/// Size of `struct sctp_assoc_change` without the trailing info bytes
pub const ASSOC_CHANGE_SIZE: usize = 20;

/// Size of `struct sctp_paddr_change`
pub const PADDR_CHANGE_SIZE: usize = 148;

/// Size of `struct sockaddr_storage` embedded in peer address changes
const SOCKADDR_STORAGE_SIZE: usize = 128;

/// Association state reported by an association change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssocChangeState {
    /// Association is ready for data
    CommUp,
    /// Association failed
    CommLost,
    /// Peer restarted the association
    Restart,
    /// Graceful shutdown completed
    ShutdownComplete,
    /// Association setup failed
    CantStartAssociation,
    /// State code not known to this decoder
    Unknown(u16),
}

impl From<u16> for AssocChangeState {
    fn from(code: u16) -> Self {
        match code {
            0 => AssocChangeState::CommUp,
            1 => AssocChangeState::CommLost,
            2 => AssocChangeState::Restart,
            3 => AssocChangeState::ShutdownComplete,
            4 => AssocChangeState::CantStartAssociation,
            other => AssocChangeState::Unknown(other),
        }
    }
}

impl AssocChangeState {
    /// Kernel state code
    pub fn code(self) -> u16 {
        match self {
            AssocChangeState::CommUp => 0,
            AssocChangeState::CommLost => 1,
            AssocChangeState::Restart => 2,
            AssocChangeState::ShutdownComplete => 3,
            AssocChangeState::CantStartAssociation => 4,
            AssocChangeState::Unknown(code) => code,
        }
    }
}

/// Peer address state reported by a peer address change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerAddrState {
    /// Address is reachable again
    Available,
    /// Address can no longer be reached
    Unreachable,
    /// Address was removed from the association
    Removed,
    /// Address was added to the association
    Added,
    /// Address is now the primary destination
    MadePrimary,
    /// Address was confirmed as valid
    Confirmed,
    /// State code not known to this decoder
    Unknown(i32),
}

impl From<i32> for PeerAddrState {
    fn from(code: i32) -> Self {
        match code {
            0 => PeerAddrState::Available,
            1 => PeerAddrState::Unreachable,
            2 => PeerAddrState::Removed,
            3 => PeerAddrState::Added,
            4 => PeerAddrState::MadePrimary,
            5 => PeerAddrState::Confirmed,
            other => PeerAddrState::Unknown(other),
        }
    }
}

impl PeerAddrState {
    /// Kernel state code
    pub fn code(self) -> i32 {
        match self {
            PeerAddrState::Available => 0,
            PeerAddrState::Unreachable => 1,
            PeerAddrState::Removed => 2,
            PeerAddrState::Added => 3,
            PeerAddrState::MadePrimary => 4,
            PeerAddrState::Confirmed => 5,
            PeerAddrState::Unknown(code) => code,
        }
    }
}

/// Decoded SCTP notification, one variant per category
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Association came up, went down, restarted or failed to start
    AssocChange {
        /// New association state
        state: AssocChangeState,
        /// Error cause code, if any
        error: u16,
        /// Negotiated outbound stream count
        outbound_streams: u16,
        /// Negotiated inbound stream count
        inbound_streams: u16,
        /// Association identifier
        assoc_id: i32,
    },
    /// A peer transport address changed state
    PeerAddrChange {
        /// New address state
        state: PeerAddrState,
        /// Error code, if any
        error: i32,
    },
    /// Peer sent an operational error
    RemoteError {
        /// Error cause code
        error: u16,
    },
    /// A message could not be delivered
    SendFailed {
        /// Error code
        error: u32,
    },
    /// Peer started a graceful shutdown
    Shutdown,
    /// Peer indicated its adaptation layer
    AdaptationIndication {
        /// Adaptation indication bits
        indication: u32,
    },
    /// Partial delivery was aborted
    PartialDelivery {
        /// Partial delivery indication
        indication: u32,
    },
    /// Notification category not handled here
    Other {
        /// Raw notification type
        kind: u16,
    },
}

impl Notification {
    /// Decode a notification from a complete received message
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        ensure_len("notification header", buf, NOTIFICATION_HEADER_SIZE)?;

        let mut header = buf;
        let kind = header.get_u16_ne();
        let _flags = header.get_u16_ne();
        let declared = header.get_u32_ne() as usize;
        if declared > buf.len() || declared < NOTIFICATION_HEADER_SIZE {
            return Err(WireError::Length {
                declared,
                actual: buf.len(),
            });
        }
        let msg = &buf[..declared];
        let mut body = &msg[NOTIFICATION_HEADER_SIZE..];

        let notification = match kind {
            SCTP_ASSOC_CHANGE => {
                ensure_len("association change", msg, ASSOC_CHANGE_SIZE)?;
                Notification::AssocChange {
                    state: AssocChangeState::from(body.get_u16_ne()),
                    error: body.get_u16_ne(),
                    outbound_streams: body.get_u16_ne(),
                    inbound_streams: body.get_u16_ne(),
                    assoc_id: body.get_i32_ne(),
                }
            }
            SCTP_PEER_ADDR_CHANGE => {
                ensure_len("peer address change", msg, PADDR_CHANGE_SIZE)?;
                body.advance(SOCKADDR_STORAGE_SIZE);
                Notification::PeerAddrChange {
                    state: PeerAddrState::from(body.get_i32_ne()),
                    error: body.get_i32_ne(),
                }
            }
            SCTP_REMOTE_ERROR => {
                ensure_len("remote error", msg, NOTIFICATION_HEADER_SIZE + 2)?;
                Notification::RemoteError {
                    error: body.get_u16_ne(),
                }
            }
            SCTP_SEND_FAILED => {
                ensure_len("send failed", msg, NOTIFICATION_HEADER_SIZE + 4)?;
                Notification::SendFailed {
                    error: body.get_u32_ne(),
                }
            }
            SCTP_SHUTDOWN_EVENT => Notification::Shutdown,
            SCTP_ADAPTATION_INDICATION => {
                ensure_len("adaptation indication", msg, NOTIFICATION_HEADER_SIZE + 4)?;
                Notification::AdaptationIndication {
                    indication: body.get_u32_ne(),
                }
            }
            SCTP_PARTIAL_DELIVERY_EVENT => {
                ensure_len("partial delivery", msg, NOTIFICATION_HEADER_SIZE + 4)?;
                Notification::PartialDelivery {
                    indication: body.get_u32_ne(),
                }
            }
            other => Notification::Other { kind: other },
        };

        Ok(notification)
    }

    /// Raw notification type of this value
    pub fn kind(&self) -> u16 {
        match self {
            Notification::AssocChange { .. } => SCTP_ASSOC_CHANGE,
            Notification::PeerAddrChange { .. } => SCTP_PEER_ADDR_CHANGE,
            Notification::RemoteError { .. } => SCTP_REMOTE_ERROR,
            Notification::SendFailed { .. } => SCTP_SEND_FAILED,
            Notification::Shutdown => SCTP_SHUTDOWN_EVENT,
            Notification::AdaptationIndication { .. } => SCTP_ADAPTATION_INDICATION,
            Notification::PartialDelivery { .. } => SCTP_PARTIAL_DELIVERY_EVENT,
            Notification::Other { kind } => *kind,
        }
    }

    /// Encode in the kernel layout.
    ///
    /// The peer address of a peer address change is written as zeroes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        let kind = self.kind();
        match self {
            Notification::AssocChange {
                state,
                error,
                outbound_streams,
                inbound_streams,
                assoc_id,
            } => {
                put_header(&mut buf, kind, ASSOC_CHANGE_SIZE);
                buf.put_u16_ne(state.code());
                buf.put_u16_ne(*error);
                buf.put_u16_ne(*outbound_streams);
                buf.put_u16_ne(*inbound_streams);
                buf.put_i32_ne(*assoc_id);
            }
            Notification::PeerAddrChange { state, error } => {
                put_header(&mut buf, kind, PADDR_CHANGE_SIZE);
                buf.put_bytes(0, SOCKADDR_STORAGE_SIZE);
                buf.put_i32_ne(state.code());
                buf.put_i32_ne(*error);
                buf.put_i32_ne(0);
            }
            Notification::RemoteError { error } => {
                put_header(&mut buf, kind, NOTIFICATION_HEADER_SIZE + 8);
                buf.put_u16_ne(*error);
                buf.put_u16_ne(0);
                buf.put_i32_ne(0);
            }
            Notification::SendFailed { error } => {
                put_header(&mut buf, kind, NOTIFICATION_HEADER_SIZE + 4);
                buf.put_u32_ne(*error);
            }
            Notification::Shutdown => {
                put_header(&mut buf, kind, NOTIFICATION_HEADER_SIZE + 4);
                buf.put_i32_ne(0);
            }
            Notification::AdaptationIndication { indication }
            | Notification::PartialDelivery { indication } => {
                put_header(&mut buf, kind, NOTIFICATION_HEADER_SIZE + 4);
                buf.put_u32_ne(*indication);
            }
            Notification::Other { .. } => {
                put_header(&mut buf, kind, NOTIFICATION_HEADER_SIZE);
            }
        }
        buf.freeze()
    }
}

fn put_header(buf: &mut BytesMut, kind: u16, len: usize) {
    buf.put_u16_ne(kind);
    buf.put_u16_ne(0);
    buf.put_u32_ne(len as u32);
}

fn ensure_len(what: &'static str, buf: &[u8], need: usize) -> Result<(), WireError> {
    if buf.len() < need {
        return Err(WireError::Truncated {
            what,
            need,
            have: buf.len(),
        });
    }
    Ok(())
}
