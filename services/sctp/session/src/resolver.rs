//! Textual host/port to socket address resolution.

use crate::error::{Result, SessionError};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs};
use tracing::debug;

/// Address family of a resolved endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4
    Inet,
    /// IPv6
    Inet6,
}

impl AddressFamily {
    /// Family of a socket address
    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => AddressFamily::Inet,
            SocketAddr::V6(_) => AddressFamily::Inet6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Inet => write!(f, "AF_INET"),
            AddressFamily::Inet6 => write!(f, "AF_INET6"),
        }
    }
}

/// Name lookup used when the host is not a literal address
pub trait HostLookup: Send {
    /// Candidate addresses for a host name, best first
    fn lookup(&self, name: &str) -> io::Result<Vec<SocketAddr>>;
}

/// Lookup through the system resolver
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLookup;

impl HostLookup for SystemLookup {
    fn lookup(&self, name: &str) -> io::Result<Vec<SocketAddr>> {
        Ok((name, 0).to_socket_addrs()?.collect())
    }
}

/// Resolves configured host names.
///
/// Literal IPv4 is tried first, then literal IPv6, then one name lookup
/// whose first result wins. The port of the result is always the caller's.
pub struct Resolver {
    lookup: Box<dyn HostLookup>,
}

impl Resolver {
    /// Resolver backed by the system name service
    pub fn system() -> Self {
        Self::with_lookup(Box::new(SystemLookup))
    }

    /// Resolver with a custom name lookup
    pub fn with_lookup(lookup: Box<dyn HostLookup>) -> Self {
        Self { lookup }
    }

    /// Resolve `name` and attach `port`
    pub fn resolve(&self, name: &str, port: u16) -> Result<(SocketAddr, AddressFamily)> {
        if let Ok(ip) = name.parse::<Ipv4Addr>() {
            let addr = SocketAddr::V4(SocketAddrV4::new(ip, port));
            return Ok((addr, AddressFamily::Inet));
        }
        if let Ok(ip) = name.parse::<Ipv6Addr>() {
            let addr = SocketAddr::V6(SocketAddrV6::new(ip, port, 0, 0));
            return Ok((addr, AddressFamily::Inet6));
        }

        debug!("Resolving host name {}", name);
        let mut addr = self
            .lookup
            .lookup(name)
            .ok()
            .and_then(|candidates| candidates.into_iter().next())
            .ok_or_else(|| SessionError::AddressResolution {
                name: name.to_string(),
            })?;
        addr.set_port(port);
        Ok((addr, AddressFamily::of(&addr)))
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}
