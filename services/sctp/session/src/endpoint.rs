//! The SCTP endpoint: control operations and shared association state.

use crate::config::EndpointConfig;
use crate::error::{Result, SessionError};
use crate::events::{ClientId, EventSink, SctpEvent};
use crate::factory;
use crate::mode::{self, ConnectionMode};
use crate::readiness::{Interest, Readiness};
use crate::reconnect::{Sleeper, ThreadSleeper};
use crate::resolver::{AddressFamily, Resolver};
use crate::send::{self, SendRequest};
use crate::settings::ProtocolSettings;
use crate::socket::{is_in_progress, SocketApi};
use crate::table::{ConnectionRecord, FdTable, ListenerRecord, SlotId};
use sctp_wire::{EventSubscription, InitParams, Linger, RtoInfo};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use tracing::{debug, info, warn};

/// Connect to a peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Peer host, the configured one when absent
    pub peer_address: Option<String>,
    /// Peer port, the configured one when absent
    pub peer_port: Option<u16>,
}

/// Connect to a peer from a given local address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectFromRequest {
    /// Peer host, the configured one when absent
    pub peer_address: Option<String>,
    /// Peer port, the configured one when absent
    pub peer_port: Option<u16>,
    /// Local host, the configured one when absent
    pub local_address: Option<String>,
    /// Local port
    pub local_port: u16,
}

/// Open a listening socket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenRequest {
    /// Local host, the configured one when absent
    pub local_address: Option<String>,
    /// Local port
    pub local_port: u16,
}

/// Runtime socket option update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketOption {
    /// New init parameters, also applied to the primary socket
    Init(InitParams),
    /// New subscription mask for sockets created from now on
    Events(EventSubscription),
    /// Linger setting for the primary socket
    Linger(Linger),
    /// Retransmission timeouts of one association
    RtoInfo {
        /// Target association
        client_id: ClientId,
        /// New bounds
        info: RtoInfo,
    },
}

/// State shared by the connection modes.
///
/// Owns the connection and listener tables exclusively. Slot ids handed out
/// by the tables are only meaningful within the current call.
pub struct EndpointCore {
    pub(crate) config: EndpointConfig,
    pub(crate) settings: ProtocolSettings,
    pub(crate) sockets: Box<dyn SocketApi>,
    pub(crate) readiness: Box<dyn Readiness>,
    pub(crate) sink: Box<dyn EventSink>,
    pub(crate) sleeper: Box<dyn Sleeper>,
    pub(crate) resolver: Resolver,
    pub(crate) connections: FdTable<ConnectionRecord>,
    pub(crate) listeners: FdTable<ListenerRecord>,
    /// Most recently created socket; the association in single client mode
    pub(crate) current_fd: Option<RawFd>,
}

impl EndpointCore {
    pub(crate) fn deliver(&mut self, event: SctpEvent) {
        self.sink.deliver(event);
    }

    pub(crate) fn subscribed(&self, category: EventSubscription) -> bool {
        self.settings.subscribed(category)
    }

    pub(crate) fn resolve(&self, name: &str, port: u16) -> Result<(SocketAddr, AddressFamily)> {
        self.resolver.resolve(name, port)
    }

    /// New socket with the current settings, remembered as the current fd
    pub(crate) fn create_socket(&mut self, family: AddressFamily) -> Result<RawFd> {
        let fd = factory::create_socket(self.sockets.as_mut(), &self.settings, family)?;
        self.current_fd = Some(fd);
        Ok(fd)
    }

    /// Bind, closing the socket on failure
    pub(crate) fn bind(&mut self, fd: RawFd, addr: &SocketAddr) -> Result<()> {
        if let Err(source) = self.sockets.bind(fd, addr) {
            self.close_socket(fd);
            return Err(SessionError::Bind { addr: *addr, source });
        }
        Ok(())
    }

    /// Bind and listen, closing the socket on failure
    pub(crate) fn bind_and_listen(&mut self, fd: RawFd, addr: &SocketAddr) -> Result<()> {
        self.bind(fd, addr)?;
        if let Err(source) = self.sockets.listen(fd, self.config.server_backlog) {
            self.close_socket(fd);
            return Err(SessionError::Listen { fd, source });
        }
        Ok(())
    }

    pub(crate) fn set_nonblocking(&mut self, fd: RawFd) -> Result<()> {
        self.sockets.set_nonblocking(fd).map_err(SessionError::Io)
    }

    /// Close an fd and drop every readiness interest on it
    pub(crate) fn close_socket(&mut self, fd: RawFd) {
        self.sockets.close(fd);
        self.readiness.unregister(fd, Interest::ALL);
        if self.current_fd == Some(fd) {
            self.current_fd = None;
        }
    }

    pub(crate) fn remove_connection(&mut self, id: SlotId) -> Result<()> {
        let fd = self.connections.fd(id)?;
        self.close_socket(fd);
        self.connections.remove(id)?;
        Ok(())
    }

    pub(crate) fn remove_connection_fd(&mut self, fd: RawFd) -> Result<()> {
        match self.connections.find(fd) {
            Some(id) => self.remove_connection(id),
            None => Ok(()),
        }
    }

    pub(crate) fn remove_listener(&mut self, id: SlotId) -> Result<()> {
        let fd = self.listeners.fd(id)?;
        self.close_socket(fd);
        self.listeners.remove(id)?;
        Ok(())
    }

    pub(crate) fn remove_listener_fd(&mut self, fd: RawFd) -> Result<()> {
        match self.listeners.find(fd) {
            Some(id) => self.remove_listener(id),
            None => Ok(()),
        }
    }

    pub(crate) fn close_all_connections(&mut self) -> Result<()> {
        for fd in self.connections.fds() {
            self.remove_connection_fd(fd)?;
        }
        Ok(())
    }

    pub(crate) fn close_all_listeners(&mut self) -> Result<()> {
        for fd in self.listeners.fds() {
            self.remove_listener_fd(fd)?;
        }
        Ok(())
    }

    /// Peer host and port from the request, falling back to configuration.
    ///
    /// Values given in the request become the new configured peer.
    pub(crate) fn peer_target(
        &mut self,
        address: Option<String>,
        port: Option<u16>,
    ) -> Result<(String, u16)> {
        if address.is_none() && self.config.peer_address.is_none() {
            return Err(SessionError::config("Peer IP address should be defined"));
        }
        if port.is_none() && self.config.peer_port.is_none() {
            return Err(SessionError::config("Peer port should be defined"));
        }
        if address.is_some() {
            self.config.peer_address = address;
        }
        if port.is_some() {
            self.config.peer_port = port;
        }
        match (&self.config.peer_address, self.config.peer_port) {
            (Some(address), Some(port)) => Ok((address.clone(), port)),
            _ => Err(SessionError::config("Peer address and port should be defined")),
        }
    }

    /// Non-blocking connect of a fresh socket.
    ///
    /// An immediate success registers the association, an in-progress
    /// connect waits for writability, anything else is reported and the
    /// socket closed.
    pub(crate) fn start_connect(&mut self, fd: RawFd, peer: SocketAddr) -> Result<()> {
        self.set_nonblocking(fd)?;
        match self.sockets.connect(fd, &peer) {
            Ok(()) => {
                self.deliver(SctpEvent::connect_ok(fd));
                self.connections.put(fd, ConnectionRecord::established());
                self.readiness.register_read(fd);
                info!("Connection successfully established to {}", peer);
            }
            Err(e) if is_in_progress(&e) => {
                self.connections.put(fd, ConnectionRecord::connecting(peer));
                self.readiness.register_write(fd);
                debug!("Connection in progress to {}", peer);
            }
            Err(e) => self.connect_failed(fd, peer, &e),
        }
        Ok(())
    }

    /// Report a failed connect of an unregistered socket
    pub(crate) fn connect_failed(&mut self, fd: RawFd, peer: SocketAddr, err: &io::Error) {
        self.close_socket(fd);
        warn!("Connect error to {}: {}", peer, err);
        self.deliver(SctpEvent::connect_failed(None, err));
    }

    fn report_option_result(&mut self, fd: Option<RawFd>, what: &str, result: io::Result<()>) {
        let event = match result {
            Ok(()) => SctpEvent::ConnectResult {
                client_id: fd,
                error_status: false,
                error_message: None,
            },
            Err(e) => {
                warn!("Setsockopt error ({}): {}", what, e);
                SctpEvent::connect_failed(fd, &e)
            }
        };
        self.deliver(event);
    }
}

/// An SCTP endpoint in single or multiplexed mode.
///
/// Every method runs to completion on the caller's thread. Readiness
/// callbacks arrive through [`Endpoint::handle_readable`],
/// [`Endpoint::handle_writable`] and [`Endpoint::handle_error`].
pub struct Endpoint {
    pub(crate) core: EndpointCore,
    pub(crate) mode: Box<dyn ConnectionMode>,
}

impl Endpoint {
    /// Endpoint over the given socket backend, readiness facility and sink
    pub fn new(
        config: EndpointConfig,
        sockets: Box<dyn SocketApi>,
        readiness: Box<dyn Readiness>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        let mode = mode::select(&config);
        let core = EndpointCore {
            settings: config.protocol,
            config,
            sockets,
            readiness,
            sink,
            sleeper: Box::new(ThreadSleeper),
            resolver: Resolver::system(),
            connections: FdTable::new(),
            listeners: FdTable::new(),
            current_fd: None,
        };
        Self { core, mode }
    }

    /// Replace the backoff sleeper
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.core.sleeper = sleeper;
        self
    }

    /// Replace the address resolver
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.core.resolver = resolver;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &EndpointConfig {
        &self.core.config
    }

    /// Settings applied to new sockets
    pub fn settings(&self) -> &ProtocolSettings {
        &self.core.settings
    }

    /// Name of the connection mode
    pub fn mode_name(&self) -> &'static str {
        self.mode.name()
    }

    /// Live associations
    pub fn connection_count(&self) -> usize {
        self.core.connections.len()
    }

    /// Live multiplexed-mode listeners
    pub fn listener_count(&self) -> usize {
        self.core.listeners.len()
    }

    /// Most recently created socket
    pub fn current_fd(&self) -> Option<RawFd> {
        self.core.current_fd
    }

    /// Arm the endpoint: listen in single server mode, connect in single
    /// reconnect mode.
    pub fn map(&mut self) -> Result<()> {
        debug!("Calling map ({} mode)", self.mode.name());
        self.core.config.validate()?;
        self.mode.map(&mut self.core)
    }

    /// Close every socket the endpoint owns
    pub fn unmap(&mut self) -> Result<()> {
        debug!("Calling unmap ({} mode)", self.mode.name());
        self.mode.unmap(&mut self.core)
    }

    /// Lifecycle hook, nothing to arm
    pub fn start(&mut self) {
        debug!("Calling start");
    }

    /// Lifecycle hook, nothing to disarm
    pub fn stop(&mut self) {
        debug!("Calling stop");
    }

    /// Connect to a peer
    pub fn connect(&mut self, request: ConnectRequest) -> Result<()> {
        debug!("Calling connect");
        self.mode.connect(&mut self.core, request)
    }

    /// Connect to a peer from a local address (multiplexed mode)
    pub fn connect_from(&mut self, request: ConnectFromRequest) -> Result<()> {
        debug!("Calling connect_from");
        self.mode.connect_from(&mut self.core, request)
    }

    /// Open a listener (multiplexed mode)
    pub fn listen(&mut self, request: ListenRequest) -> Result<()> {
        debug!("Calling listen");
        self.mode.listen(&mut self.core, request)
    }

    /// Update a socket option.
    ///
    /// Init and linger go to the primary socket, retransmission timeouts
    /// to the named association. The outcome is reported as a connect
    /// result. A new subscription mask is stored silently.
    pub fn set_socket_option(&mut self, option: SocketOption) -> Result<()> {
        debug!("Calling set_socket_option: {:?}", option);
        match option {
            SocketOption::Init(init) => {
                self.core.settings.init = init;
                let fd = self.mode.primary_fd(&self.core);
                let result = match fd {
                    Some(fd) => self.core.sockets.set_init_params(fd, &init),
                    None => Err(io::Error::from_raw_os_error(libc::EBADF)),
                };
                self.core.report_option_result(fd, "initmsg", result);
            }
            SocketOption::Events(events) => {
                self.core.settings.events = events;
            }
            SocketOption::Linger(linger) => {
                let fd = self.mode.primary_fd(&self.core);
                let result = match fd {
                    Some(fd) => self.core.sockets.set_linger(fd, linger),
                    None => Err(io::Error::from_raw_os_error(libc::EBADF)),
                };
                self.core.report_option_result(fd, "so_linger", result);
            }
            SocketOption::RtoInfo { client_id, info } => {
                let result = self.core.sockets.set_rto_info(client_id, &info);
                self.core
                    .report_option_result(Some(client_id), "sctp_rtoinfo", result);
            }
        }
        Ok(())
    }

    /// Close one association, or everything owned when `client_id` is absent
    pub fn close(&mut self, client_id: Option<ClientId>) -> Result<()> {
        debug!("Calling close: {:?}", client_id);
        self.mode.close(&mut self.core, client_id)
    }

    /// Send one message
    pub fn send(&mut self, request: SendRequest) -> Result<()> {
        let target = self.mode.send_target(&self.core, request.client_id)?;
        let reported = self.mode.failure_client_id(&self.core, target);
        send::send_message(&mut self.core, target, reported, &request);
        Ok(())
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("mode", &self.mode.name())
            .field("connections", &self.core.connections.len())
            .field("listeners", &self.core.listeners.len())
            .field("current_fd", &self.core.current_fd)
            .finish()
    }
}
