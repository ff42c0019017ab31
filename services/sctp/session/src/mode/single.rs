//! Single-association endpoint, client or server.

use super::ConnectionMode;
use crate::endpoint::{ConnectFromRequest, ConnectRequest, EndpointCore, ListenRequest};
use crate::error::{Result, SessionError};
use crate::events::{ClientId, SctpEvent};
use crate::reconnect::reconnect;
use crate::table::ConnectionRecord;
use std::io;
use std::os::fd::RawFd;
use tracing::{debug, info, warn};

/// One association at a time.
///
/// In server mode a listening socket is opened by `map` and every accepted
/// association joins the connection table silently. In client mode the
/// current fd is the association.
#[derive(Debug, Default)]
pub struct SingleConnection {
    listen_fd: Option<RawFd>,
}

impl SingleConnection {
    /// Mode with no listener yet
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionMode for SingleConnection {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn map(&mut self, core: &mut EndpointCore) -> Result<()> {
        if core.config.server_mode {
            let port = core
                .config
                .local_port
                .ok_or_else(|| SessionError::config("in server mode local_port must be defined"))?;
            let (local, family) = core.resolve(&core.config.local_address, port)?;
            let fd = core.create_socket(family)?;
            core.bind_and_listen(fd, &local)?;
            core.readiness.register_read(fd);
            self.listen_fd = Some(fd);
            info!("Listening @ {}:{}", core.config.local_address, port);
        } else if core.config.reconnect {
            info!("Running in simple client reconnect mode");
            let attempts = core.config.reconnect_max_attempts.saturating_add(1);
            reconnect(core, attempts)?;
        } else {
            info!("Running in simple client mode");
        }
        Ok(())
    }

    fn unmap(&mut self, core: &mut EndpointCore) -> Result<()> {
        core.close_all_connections()?;
        if let Some(fd) = self.listen_fd.take() {
            core.close_socket(fd);
        }
        Ok(())
    }

    fn connect(&mut self, core: &mut EndpointCore, request: ConnectRequest) -> Result<()> {
        if core.config.server_mode {
            return Err(SessionError::config("connect is not allowed in server mode"));
        }
        if let Some(fd) = core.current_fd {
            return Err(SessionError::config(format!(
                "an association already exists on fd {}",
                fd
            )));
        }

        let (name, port) = core.peer_target(request.peer_address, request.peer_port)?;
        let (peer, family) = core.resolve(&name, port)?;
        let local = match core.config.local_port {
            Some(local_port) => {
                let (local, local_family) = core.resolve(&core.config.local_address, local_port)?;
                if local_family != family {
                    return Err(SessionError::config(format!(
                        "local address family {} does not match peer family {}",
                        local_family, family
                    )));
                }
                Some(local)
            }
            None => None,
        };

        let fd = core.create_socket(family)?;
        if let Some(local) = local {
            core.bind(fd, &local)?;
        }
        info!("Connecting to {}:{}", name, port);
        match core.sockets.connect(fd, &peer) {
            Ok(()) => {
                core.deliver(SctpEvent::connect_ok(fd));
                core.connections.put(fd, ConnectionRecord::established());
                core.set_nonblocking(fd)?;
                core.readiness.register_read(fd);
                info!("Connection successfully established to {}:{}", name, port);
            }
            Err(e) => core.connect_failed(fd, peer, &e),
        }
        Ok(())
    }

    fn connect_from(&mut self, _core: &mut EndpointCore, request: ConnectFromRequest) -> Result<()> {
        warn!(
            "connect_from is only supported in multiplexed mode, ignoring request for local port {}",
            request.local_port
        );
        Ok(())
    }

    fn listen(&mut self, _core: &mut EndpointCore, request: ListenRequest) -> Result<()> {
        warn!(
            "listen is only supported in multiplexed mode, ignoring request for port {}",
            request.local_port
        );
        Ok(())
    }

    fn close(&mut self, core: &mut EndpointCore, client_id: Option<ClientId>) -> Result<()> {
        if core.config.server_mode {
            match client_id {
                Some(fd) => match core.connections.find(fd) {
                    Some(id) => core.remove_connection(id),
                    None => {
                        debug!("close: fd {} is not an association", fd);
                        Ok(())
                    }
                },
                None => core.close_all_connections(),
            }
        } else {
            if let Some(fd) = client_id {
                return Err(SessionError::config(format!(
                    "client id {} must not be given in client mode",
                    fd
                )));
            }
            match core.current_fd {
                Some(fd) => core.remove_connection_fd(fd),
                None => {
                    debug!("close: no association");
                    Ok(())
                }
            }
        }
    }

    fn send_target(&self, core: &EndpointCore, client_id: Option<ClientId>) -> Result<RawFd> {
        let fd = if core.config.server_mode {
            client_id
                .ok_or_else(|| SessionError::config("client id is required in server mode"))?
        } else {
            if let Some(fd) = client_id {
                return Err(SessionError::config(format!(
                    "client id {} must not be given in client mode",
                    fd
                )));
            }
            core.current_fd
                .ok_or_else(|| SessionError::config("no association to send on"))?
        };
        if !core.connections.contains(fd) {
            return Err(SessionError::UnknownClient(fd));
        }
        Ok(fd)
    }

    fn failure_client_id(&self, core: &EndpointCore, target: RawFd) -> Option<ClientId> {
        core.config.server_mode.then_some(target)
    }

    fn accept(&mut self, core: &mut EndpointCore, fd: RawFd) -> Result<bool> {
        if !core.config.server_mode || self.listen_fd != Some(fd) {
            return Ok(false);
        }
        let (client, remote) = match core.sockets.accept(fd) {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("Accept on fd {} would block", fd);
                return Ok(true);
            }
            Err(source) => return Err(SessionError::Accept { fd, source }),
        };
        core.connections.put(client, ConnectionRecord::established());
        core.set_nonblocking(client)?;
        core.readiness.register_read(client);
        info!("Client connected from {} on fd {}", remote, client);
        Ok(true)
    }

    fn completes_deferred_connects(&self) -> bool {
        false
    }

    fn association_lost(&mut self, core: &mut EndpointCore, fd: RawFd) -> Result<()> {
        core.remove_connection_fd(fd)
    }

    fn reconnects_on_association_loss(&self, core: &EndpointCore) -> bool {
        core.config.reconnect
    }

    fn primary_fd(&self, core: &EndpointCore) -> Option<RawFd> {
        self.listen_fd.or(core.current_fd)
    }
}

#[cfg(test)]
mod tests {
    use crate::endpoint::ConnectRequest;
    use crate::error::SessionError;
    use crate::events::SctpEvent;
    use crate::readiness::Interest;
    use crate::send::SendRequest;
    use crate::testing::{client_config, server_config, Harness};
    use bytes::Bytes;
    use sctp_wire::PayloadProtocolId;
    use std::io;

    fn send_request(client_id: Option<i32>) -> SendRequest {
        SendRequest {
            client_id,
            stream: 0,
            ppid: PayloadProtocolId(46),
            payload: Bytes::from_static(b"ping"),
        }
    }

    #[test]
    fn test_server_map_listens() {
        let mut h = Harness::new(server_config());
        h.endpoint.map().unwrap();

        let listen_fd = h.endpoint.current_fd().unwrap();
        let state = h.sockets.state();
        assert_eq!(state.bound.len(), 1);
        assert_eq!(state.bound[0].1.port(), 3868);
        assert_eq!(state.listening, vec![(listen_fd, 1)]);
        drop(state);
        assert_eq!(h.registry.interest(listen_fd), Interest::READ);
    }

    #[test]
    fn test_server_accept_is_silent() {
        let mut h = Harness::new(server_config());
        h.endpoint.map().unwrap();
        let listen_fd = h.endpoint.current_fd().unwrap();

        h.sockets.push_accept("10.0.0.9:40000".parse().unwrap());
        h.endpoint.handle_readable(listen_fd).unwrap();

        assert_eq!(h.endpoint.connection_count(), 1);
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_server_send_requires_client_id() {
        let mut h = Harness::new(server_config());
        h.endpoint.map().unwrap();
        let err = h.endpoint.send(send_request(None)).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        let err = h.endpoint.send(send_request(Some(99))).unwrap_err();
        assert!(matches!(err, SessionError::UnknownClient(99)));
    }

    #[test]
    fn test_client_connect_and_send() {
        let mut h = Harness::new(client_config());
        h.endpoint.map().unwrap();
        h.endpoint.connect(ConnectRequest::default()).unwrap();

        let fd = h.endpoint.current_fd().unwrap();
        assert_eq!(h.events(), vec![SctpEvent::connect_ok(fd)]);
        assert_eq!(h.registry.interest(fd), Interest::READ);

        h.endpoint.send(send_request(None)).unwrap();
        let state = h.sockets.state();
        assert_eq!(state.sent.len(), 1);
        assert_eq!(state.sent[0].0, fd);
        assert_eq!(state.sent[0].2.ppid, PayloadProtocolId(46));
    }

    #[test]
    fn test_client_rejects_second_connect() {
        let mut h = Harness::new(client_config());
        h.endpoint.connect(ConnectRequest::default()).unwrap();
        let err = h.endpoint.connect(ConnectRequest::default()).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        assert_eq!(h.sockets.state().created.len(), 1);
    }

    #[test]
    fn test_client_connect_failure_reported() {
        let mut h = Harness::new(client_config());
        h.sockets
            .push_connect(Err(io::Error::from_raw_os_error(libc::ECONNREFUSED)));
        h.endpoint.connect(ConnectRequest::default()).unwrap();

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            SctpEvent::ConnectResult {
                client_id: None,
                error_status: true,
                error_message: Some(_),
            }
        ));
        assert_eq!(h.endpoint.current_fd(), None);
        assert_eq!(h.endpoint.connection_count(), 0);
    }

    #[test]
    fn test_client_send_failure_has_no_client_id() {
        let mut h = Harness::new(client_config());
        h.endpoint.connect(ConnectRequest::default()).unwrap();
        h.events();
        h.sockets.state().send_error = Some(libc::EPIPE);

        h.endpoint.send(send_request(None)).unwrap();
        match h.events().as_slice() {
            [SctpEvent::SendFailed { client_id, .. }] => assert_eq!(*client_id, None),
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn test_client_close_rules() {
        let mut h = Harness::new(client_config());
        h.endpoint.connect(ConnectRequest::default()).unwrap();
        let fd = h.endpoint.current_fd().unwrap();

        assert!(matches!(
            h.endpoint.close(Some(fd)).unwrap_err(),
            SessionError::Config(_)
        ));
        h.endpoint.close(None).unwrap();
        assert_eq!(h.endpoint.connection_count(), 0);
        assert_eq!(h.sockets.close_count(fd), 1);
        assert_eq!(h.registry.interest(fd), Interest::empty());
    }

    #[test]
    fn test_server_close_unknown_fd_is_noop() {
        let mut h = Harness::new(server_config());
        h.endpoint.map().unwrap();
        let listen_fd = h.endpoint.current_fd().unwrap();
        h.sockets.push_accept("10.0.0.9:40000".parse().unwrap());
        h.endpoint.handle_readable(listen_fd).unwrap();

        h.endpoint.close(Some(99)).unwrap();
        assert_eq!(h.endpoint.connection_count(), 1);
        assert!(h.sockets.state().closed.is_empty());
    }

    #[test]
    fn test_server_unmap_closes_everything() {
        let mut h = Harness::new(server_config());
        h.endpoint.map().unwrap();
        let listen_fd = h.endpoint.current_fd().unwrap();
        h.sockets.push_accept("10.0.0.9:40000".parse().unwrap());
        h.endpoint.handle_readable(listen_fd).unwrap();

        h.endpoint.unmap().unwrap();
        assert_eq!(h.endpoint.connection_count(), 0);
        assert_eq!(h.sockets.state().closed.len(), 2);
        assert!(h.registry.snapshot().is_empty());
    }
}
