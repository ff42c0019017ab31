//! Socket operations used by the endpoint.
//!
//! [`SocketApi`] is the seam between the association logic and the operating
//! system. The [`kernel`] backend talks to Linux SCTP; tests script an
//! in-memory implementation instead.

pub mod kernel;

use crate::resolver::AddressFamily;
use bitflags::bitflags;
use sctp_wire::{EventSubscription, InitParams, Linger, RtoInfo, SndRcvInfo};
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;

pub use kernel::KernelSockets;

/// `MSG_NOTIFICATION` receive flag
pub const MSG_NOTIFICATION: i32 = 0x8000;

bitflags! {
    /// Flags of one receive
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecvFlags: u8 {
        /// The bytes complete a message
        const END_OF_RECORD = 1 << 0;
        /// The message is a notification, not user data
        const NOTIFICATION = 1 << 1;
    }
}

/// Result of one receive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    /// Bytes written to the buffer, 0 on end of stream
    pub len: usize,
    /// Message boundary and notification flags
    pub flags: RecvFlags,
    /// Ancillary `sctp_sndrcvinfo`, when the kernel supplied one
    pub info: Option<SndRcvInfo>,
}

/// Socket operations on one-to-one SCTP sockets, addressed by fd
pub trait SocketApi: Send {
    /// Create an SCTP stream socket
    fn create(&mut self, family: AddressFamily) -> io::Result<RawFd>;
    /// Set `SCTP_INITMSG`
    fn set_init_params(&mut self, fd: RawFd, init: &InitParams) -> io::Result<()>;
    /// Set `SCTP_EVENTS`
    fn set_events(&mut self, fd: RawFd, events: EventSubscription) -> io::Result<()>;
    /// Set `SO_LINGER`
    fn set_linger(&mut self, fd: RawFd, linger: Linger) -> io::Result<()>;
    /// Set `SCTP_RTOINFO`
    fn set_rto_info(&mut self, fd: RawFd, rto: &RtoInfo) -> io::Result<()>;
    /// Switch to non-blocking I/O
    fn set_nonblocking(&mut self, fd: RawFd) -> io::Result<()>;
    /// Bind to a local address
    fn bind(&mut self, fd: RawFd, addr: &SocketAddr) -> io::Result<()>;
    /// Start listening
    fn listen(&mut self, fd: RawFd, backlog: i32) -> io::Result<()>;
    /// Accept one association
    fn accept(&mut self, fd: RawFd) -> io::Result<(RawFd, SocketAddr)>;
    /// Connect, or re-issue a connect that is in progress
    fn connect(&mut self, fd: RawFd, addr: &SocketAddr) -> io::Result<()>;
    /// Receive into `buf` with room for `sctp_sndrcvinfo`
    fn recv(&mut self, fd: RawFd, buf: &mut [u8]) -> io::Result<Received>;
    /// Send one message with `SCTP_SNDRCV` ancillary data
    fn send(&mut self, fd: RawFd, payload: &[u8], info: &SndRcvInfo) -> io::Result<usize>;
    /// Close the socket
    fn close(&mut self, fd: RawFd);
}

/// `connect` reported an asynchronous connect in progress
pub fn is_in_progress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS)
}

/// `connect` reported the socket is already connected
pub fn is_connected(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EISCONN)
}
