//! Linux SCTP backend.
//!
//! Socket lifecycle goes through `socket2`; the SCTP specific pieces
//! (`recvmsg`/`sendmsg` with `SCTP_SNDRCV` control messages and the
//! `IPPROTO_SCTP` options) call libc directly.

use super::{Received, RecvFlags, SocketApi, MSG_NOTIFICATION};
use crate::resolver::AddressFamily;
use sctp_wire::{
    EventSubscription, InitParams, Linger, RtoInfo, SndRcvInfo, SCTP_EVENTS, SCTP_INITMSG,
    SCTP_RTOINFO, SCTP_SNDRCV, SNDRCV_INFO_SIZE,
};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::HashMap;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::ptr;
use tracing::debug;

/// Control buffer for one `sctp_sndrcvinfo` message, aligned for `cmsghdr`
type ControlBuffer = [u64; 8];

/// Sockets owned by the kernel backend, keyed by fd.
///
/// Dropping a socket closes it, so `close` only has to forget the entry.
#[derive(Debug, Default)]
pub struct KernelSockets {
    sockets: HashMap<RawFd, Socket>,
}

impl KernelSockets {
    /// Empty backend
    pub fn new() -> Self {
        Self::default()
    }

    fn socket(&self, fd: RawFd) -> io::Result<&Socket> {
        self.sockets
            .get(&fd)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))
    }

    fn insert(&mut self, socket: Socket) -> RawFd {
        let fd = socket.as_raw_fd();
        self.sockets.insert(fd, socket);
        fd
    }
}

impl SocketApi for KernelSockets {
    fn create(&mut self, family: AddressFamily) -> io::Result<RawFd> {
        let domain = match family {
            AddressFamily::Inet => Domain::IPV4,
            AddressFamily::Inet6 => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::from(libc::IPPROTO_SCTP)))?;
        let fd = self.insert(socket);
        debug!("Created SCTP socket fd {}", fd);
        Ok(fd)
    }

    fn set_init_params(&mut self, fd: RawFd, init: &InitParams) -> io::Result<()> {
        let socket = self.socket(fd)?;
        set_sctp_option(socket, SCTP_INITMSG, &init.encode())
    }

    fn set_events(&mut self, fd: RawFd, events: EventSubscription) -> io::Result<()> {
        let socket = self.socket(fd)?;
        set_sctp_option(socket, SCTP_EVENTS, &events.encode())
    }

    fn set_linger(&mut self, fd: RawFd, linger: Linger) -> io::Result<()> {
        self.socket(fd)?.set_linger(linger.as_duration())
    }

    fn set_rto_info(&mut self, fd: RawFd, rto: &RtoInfo) -> io::Result<()> {
        let socket = self.socket(fd)?;
        set_sctp_option(socket, SCTP_RTOINFO, &rto.encode())
    }

    fn set_nonblocking(&mut self, fd: RawFd) -> io::Result<()> {
        self.socket(fd)?.set_nonblocking(true)
    }

    fn bind(&mut self, fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
        self.socket(fd)?.bind(&SockAddr::from(*addr))
    }

    fn listen(&mut self, fd: RawFd, backlog: i32) -> io::Result<()> {
        self.socket(fd)?.listen(backlog)
    }

    fn accept(&mut self, fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
        let (socket, addr) = self.socket(fd)?.accept()?;
        let addr = addr
            .as_socket()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Address is not valid"))?;
        Ok((self.insert(socket), addr))
    }

    fn connect(&mut self, fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
        self.socket(fd)?.connect(&SockAddr::from(*addr))
    }

    fn recv(&mut self, fd: RawFd, buf: &mut [u8]) -> io::Result<Received> {
        let socket = self.socket(fd)?;
        let mut control: ControlBuffer = [0; 8];
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        // SAFETY: msghdr is plain old data; an all-zero value is valid.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = mem::size_of::<ControlBuffer>() as _;

        // SAFETY: iov and control outlive the call and their lengths are accurate.
        let n = unsafe { libc::recvmsg(socket.as_raw_fd(), &mut msg, 0) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut flags = RecvFlags::empty();
        if msg.msg_flags & libc::MSG_EOR != 0 {
            flags |= RecvFlags::END_OF_RECORD;
        }
        if msg.msg_flags & MSG_NOTIFICATION != 0 {
            flags |= RecvFlags::NOTIFICATION;
        }

        Ok(Received {
            len: n as usize,
            flags,
            info: read_sndrcv(&msg),
        })
    }

    fn send(&mut self, fd: RawFd, payload: &[u8], info: &SndRcvInfo) -> io::Result<usize> {
        let socket = self.socket(fd)?;
        let mut control: ControlBuffer = [0; 8];
        let mut iov = libc::iovec {
            iov_base: payload.as_ptr() as *mut libc::c_void,
            iov_len: payload.len(),
        };
        // SAFETY: msghdr is plain old data; an all-zero value is valid.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast();
        // SAFETY: CMSG_SPACE only computes a size.
        msg.msg_controllen = unsafe { libc::CMSG_SPACE(SNDRCV_INFO_SIZE as u32) } as _;

        let encoded = info.encode();
        // SAFETY: the control buffer holds CMSG_SPACE(SNDRCV_INFO_SIZE) bytes, so
        // the first header and its data area are in bounds.
        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            if cmsg.is_null() {
                return Err(io::Error::from_raw_os_error(libc::ENOBUFS));
            }
            (*cmsg).cmsg_level = libc::IPPROTO_SCTP;
            (*cmsg).cmsg_type = SCTP_SNDRCV;
            (*cmsg).cmsg_len = libc::CMSG_LEN(SNDRCV_INFO_SIZE as u32) as _;
            ptr::copy_nonoverlapping(encoded.as_ptr(), libc::CMSG_DATA(cmsg), SNDRCV_INFO_SIZE);
        }

        // SAFETY: payload and control outlive the call; the kernel only reads them.
        let n = unsafe { libc::sendmsg(socket.as_raw_fd(), &msg, 0) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn close(&mut self, fd: RawFd) {
        if self.sockets.remove(&fd).is_some() {
            debug!("Closed socket fd {}", fd);
        }
    }
}

fn set_sctp_option(socket: &Socket, name: i32, value: &[u8]) -> io::Result<()> {
    // SAFETY: value points to value.len() initialised bytes.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_SCTP,
            name,
            value.as_ptr().cast(),
            value.len() as libc::socklen_t,
        )
    };
    match rc {
        -1 => Err(io::Error::last_os_error()),
        _ => Ok(()),
    }
}

fn read_sndrcv(msg: &libc::msghdr) -> Option<SndRcvInfo> {
    // SAFETY: msg was filled by recvmsg; the CMSG macros stay within
    // msg_control/msg_controllen.
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::IPPROTO_SCTP && (*cmsg).cmsg_type == SCTP_SNDRCV {
                let data = libc::CMSG_DATA(cmsg);
                let header_len = data as usize - cmsg as usize;
                let data_len = ((*cmsg).cmsg_len as usize).saturating_sub(header_len);
                let bytes = std::slice::from_raw_parts(data, data_len);
                return SndRcvInfo::decode(bytes).ok();
            }
            cmsg = libc::CMSG_NXTHDR(msg, cmsg);
        }
    }
    None
}
