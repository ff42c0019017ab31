//! SCTP socket API structures for the association multiplexer.
//!
//! This crate decodes and encodes the fixed-layout structures the kernel
//! exchanges with one-to-one SCTP sockets: notifications delivered through
//! the receive path, `sctp_sndrcvinfo` ancillary data, and the payloads of
//! the socket options the multiplexer sets.
//!
//! ## Layouts
//!
//! ```text
//! notification   u16 type | u16 flags | u32 length | body ...
//! sndrcvinfo     32 bytes, ppid in network byte order at offset 8
//! initmsg        4 x u16
//! event subscr.  1 byte per category
//! rtoinfo        i32 assoc_id | u32 initial | u32 max | u32 min
//! ```
//!
//! Everything except the ppid is host byte order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod notification;
pub mod ppid;
pub mod sndrcv;
pub mod sockopt;

// Re-export main types
pub use error::WireError;
pub use notification::{
    AssocChangeState, Notification, PeerAddrState, ASSOC_CHANGE_SIZE, NOTIFICATION_HEADER_SIZE,
    PADDR_CHANGE_SIZE, SCTP_ADAPTATION_INDICATION, SCTP_ASSOC_CHANGE,
    SCTP_PARTIAL_DELIVERY_EVENT, SCTP_PEER_ADDR_CHANGE, SCTP_REMOTE_ERROR, SCTP_SEND_FAILED,
    SCTP_SHUTDOWN_EVENT, SCTP_SN_TYPE_BASE,
};
pub use ppid::{PayloadProtocolId, PpidValue};
pub use sndrcv::{SndRcvInfo, SCTP_SNDRCV, SNDRCV_INFO_SIZE};
pub use sockopt::{
    EventSubscription, InitParams, Linger, RtoInfo, SCTP_EVENTS, SCTP_INITMSG, SCTP_RTOINFO,
};
