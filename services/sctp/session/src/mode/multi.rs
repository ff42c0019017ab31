//! Multiplexed endpoint: any number of associations and listeners.

use super::ConnectionMode;
use crate::endpoint::{ConnectFromRequest, ConnectRequest, EndpointCore, ListenRequest};
use crate::error::{Result, SessionError};
use crate::events::{ClientId, SctpEvent};
use crate::table::{ConnectionRecord, ListenerRecord};
use std::io;
use std::os::fd::RawFd;
use tracing::{debug, info};

/// Associations and listeners addressed by client id.
///
/// Connects are non-blocking; completion is detected on writability.
#[derive(Debug, Default)]
pub struct MultiConnection;

impl MultiConnection {
    /// New multiplexed mode
    pub fn new() -> Self {
        Self
    }
}

impl ConnectionMode for MultiConnection {
    fn name(&self) -> &'static str {
        "normal"
    }

    fn map(&mut self, _core: &mut EndpointCore) -> Result<()> {
        info!("Running in normal mode");
        Ok(())
    }

    fn unmap(&mut self, core: &mut EndpointCore) -> Result<()> {
        core.close_all_connections()?;
        core.close_all_listeners()
    }

    fn connect(&mut self, core: &mut EndpointCore, request: ConnectRequest) -> Result<()> {
        let (name, port) = core.peer_target(request.peer_address, request.peer_port)?;
        let (peer, family) = core.resolve(&name, port)?;
        let fd = core.create_socket(family)?;
        info!("Connecting to {}:{}", name, port);
        core.start_connect(fd, peer)
    }

    fn connect_from(&mut self, core: &mut EndpointCore, request: ConnectFromRequest) -> Result<()> {
        let (name, port) = core.peer_target(request.peer_address, request.peer_port)?;
        let (peer, family) = core.resolve(&name, port)?;
        let local_address = request
            .local_address
            .unwrap_or_else(|| core.config.local_address.clone());
        let (local, local_family) = core.resolve(&local_address, request.local_port)?;
        if local_family != family {
            return Err(SessionError::config(format!(
                "local address family {} does not match peer family {}",
                local_family, family
            )));
        }

        let fd = core.create_socket(family)?;
        core.bind(fd, &local)?;
        info!(
            "Connecting to {}:{} from {}:{}",
            name, port, local_address, request.local_port
        );
        core.start_connect(fd, peer)
    }

    fn listen(&mut self, core: &mut EndpointCore, request: ListenRequest) -> Result<()> {
        let local_address = request
            .local_address
            .unwrap_or_else(|| core.config.local_address.clone());
        let (local, family) = core.resolve(&local_address, request.local_port)?;
        let fd = core.create_socket(family)?;
        core.bind_and_listen(fd, &local)?;
        core.listeners.put(
            fd,
            ListenerRecord {
                local_address: local_address.clone(),
                local_port: request.local_port,
            },
        );
        core.readiness.register_read(fd);
        info!("Listening @ {}:{} on fd {}", local_address, request.local_port, fd);
        if core.config.report_listen_result {
            core.deliver(SctpEvent::connect_ok(fd));
        }
        Ok(())
    }

    fn close(&mut self, core: &mut EndpointCore, client_id: Option<ClientId>) -> Result<()> {
        match client_id {
            Some(fd) => {
                core.remove_connection_fd(fd)?;
                core.remove_listener_fd(fd)
            }
            None => {
                core.close_all_connections()?;
                core.close_all_listeners()
            }
        }
    }

    fn send_target(&self, core: &EndpointCore, client_id: Option<ClientId>) -> Result<RawFd> {
        let fd = client_id
            .ok_or_else(|| SessionError::config("client id is required in normal mode"))?;
        if core.connections.contains(fd) || core.listeners.contains(fd) {
            Ok(fd)
        } else {
            Err(SessionError::UnknownClient(fd))
        }
    }

    fn failure_client_id(&self, _core: &EndpointCore, target: RawFd) -> Option<ClientId> {
        Some(target)
    }

    fn accept(&mut self, core: &mut EndpointCore, fd: RawFd) -> Result<bool> {
        let Some(id) = core.listeners.find(fd) else {
            return Ok(false);
        };
        let listener = core.listeners.get(id)?.clone();
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
        info!(
            "Client connected from {} on fd {} via listener {}",
            remote, client, fd
        );
        core.deliver(SctpEvent::PeerConnected {
            client_id: client,
            local_address: listener.local_address,
            local_port: listener.local_port,
            remote_address: remote.ip().to_string(),
            remote_port: remote.port(),
        });
        Ok(true)
    }

    fn completes_deferred_connects(&self) -> bool {
        true
    }

    fn association_lost(&mut self, core: &mut EndpointCore, fd: RawFd) -> Result<()> {
        core.remove_connection_fd(fd)?;
        core.remove_listener_fd(fd)
    }

    fn reconnects_on_association_loss(&self, _core: &EndpointCore) -> bool {
        false
    }

    fn primary_fd(&self, core: &EndpointCore) -> Option<RawFd> {
        core.current_fd
    }
}

#[cfg(test)]
mod tests {
    use crate::endpoint::{ConnectFromRequest, ConnectRequest, ListenRequest};
    use crate::error::SessionError;
    use crate::events::SctpEvent;
    use crate::readiness::Interest;
    use crate::testing::{multi_config, Harness};
    use crate::EndpointConfig;
    use std::io;

    fn listen_request(port: u16) -> ListenRequest {
        ListenRequest {
            local_address: Some("127.0.0.1".to_string()),
            local_port: port,
        }
    }

    #[test]
    fn test_connect_in_progress_waits_for_write() {
        let mut h = Harness::new(multi_config());
        h.sockets
            .push_connect(Err(io::Error::from_raw_os_error(libc::EINPROGRESS)));
        h.endpoint.connect(ConnectRequest::default()).unwrap();

        let fd = h.endpoint.current_fd().unwrap();
        assert_eq!(h.registry.interest(fd), Interest::WRITE);
        assert_eq!(h.endpoint.connection_count(), 1);
        assert!(h.sockets.state().nonblocking.contains(&fd));
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_connect_immediate_success() {
        let mut h = Harness::new(multi_config());
        h.endpoint.connect(ConnectRequest::default()).unwrap();
        let fd = h.endpoint.current_fd().unwrap();
        assert_eq!(h.events(), vec![SctpEvent::connect_ok(fd)]);
        assert_eq!(h.registry.interest(fd), Interest::READ);
    }

    #[test]
    fn test_connect_override_becomes_default() {
        let mut h = Harness::new(multi_config());
        h.endpoint
            .connect(ConnectRequest {
                peer_address: Some("10.0.0.7".to_string()),
                peer_port: Some(3000),
            })
            .unwrap();
        assert_eq!(h.endpoint.config().peer_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(h.endpoint.config().peer_port, Some(3000));
    }

    #[test]
    fn test_connect_without_peer_fails() {
        let mut h = Harness::new(EndpointConfig::default());
        let err = h.endpoint.connect(ConnectRequest::default()).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        assert!(h.sockets.state().created.is_empty());
    }

    #[test]
    fn test_unresolvable_peer_creates_no_socket() {
        let mut h = Harness::new(EndpointConfig::default());
        let err = h
            .endpoint
            .connect(ConnectRequest {
                peer_address: Some("peer.invalid".to_string()),
                peer_port: Some(2905),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::AddressResolution { .. }));
        assert!(h.sockets.state().created.is_empty());
    }

    #[test]
    fn test_connect_from_family_mismatch() {
        let mut h = Harness::new(multi_config());
        let err = h
            .endpoint
            .connect_from(ConnectFromRequest {
                local_address: Some("::1".to_string()),
                local_port: 5000,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        assert!(h.sockets.state().created.is_empty());
    }

    #[test]
    fn test_connect_from_binds_local() {
        let mut h = Harness::new(multi_config());
        h.endpoint
            .connect_from(ConnectFromRequest {
                local_address: Some("10.0.0.1".to_string()),
                local_port: 5000,
                ..Default::default()
            })
            .unwrap();
        let fd = h.endpoint.current_fd().unwrap();
        let state = h.sockets.state();
        assert_eq!(state.bound, vec![(fd, "10.0.0.1:5000".parse().unwrap())]);
        assert_eq!(state.connects, vec![(fd, "10.0.0.2:2905".parse().unwrap())]);
    }

    #[test]
    fn test_listen_and_accept_reports_peer() {
        let mut h = Harness::new(multi_config());
        h.endpoint.listen(listen_request(3868)).unwrap();
        let listener = h.endpoint.current_fd().unwrap();
        assert_eq!(h.endpoint.listener_count(), 1);
        assert!(h.events().is_empty());

        h.sockets.push_accept("192.168.1.20:41000".parse().unwrap());
        h.endpoint.handle_readable(listener).unwrap();

        let events = h.events();
        match events.as_slice() {
            [SctpEvent::PeerConnected {
                client_id,
                local_address,
                local_port,
                remote_address,
                remote_port,
            }] => {
                assert_ne!(*client_id, listener);
                assert_eq!(local_address, "127.0.0.1");
                assert_eq!(*local_port, 3868);
                assert_eq!(remote_address, "192.168.1.20");
                assert_eq!(*remote_port, 41000);
                assert_eq!(h.registry.interest(*client_id), Interest::READ);
            }
            other => panic!("unexpected events {:?}", other),
        }
        assert_eq!(h.endpoint.connection_count(), 1);
    }

    #[test]
    fn test_listen_result_reported_when_enabled() {
        let mut h = Harness::new(EndpointConfig {
            report_listen_result: true,
            ..multi_config()
        });
        h.endpoint.listen(listen_request(3868)).unwrap();
        let fd = h.endpoint.current_fd().unwrap();
        assert_eq!(h.events(), vec![SctpEvent::connect_ok(fd)]);
    }

    #[test]
    fn test_listen_bind_failure_closes_socket() {
        let mut h = Harness::new(multi_config());
        h.sockets.state().fail_bind = true;
        let err = h.endpoint.listen(listen_request(3868)).unwrap_err();
        assert!(matches!(err, SessionError::Bind { .. }));
        assert_eq!(h.endpoint.listener_count(), 0);
        assert_eq!(h.sockets.state().closed.len(), 1);
    }

    #[test]
    fn test_close_one_and_all() {
        let mut h = Harness::new(multi_config());
        h.endpoint.listen(listen_request(3868)).unwrap();
        let listener = h.endpoint.current_fd().unwrap();
        h.endpoint.connect(ConnectRequest::default()).unwrap();
        let first = h.endpoint.current_fd().unwrap();
        h.endpoint.connect(ConnectRequest::default()).unwrap();

        h.endpoint.close(Some(first)).unwrap();
        assert_eq!(h.endpoint.connection_count(), 1);
        assert_eq!(h.sockets.close_count(first), 1);

        h.endpoint.close(Some(listener)).unwrap();
        assert_eq!(h.endpoint.listener_count(), 0);

        h.endpoint.close(None).unwrap();
        assert_eq!(h.endpoint.connection_count(), 0);
        assert!(h.registry.snapshot().is_empty());
    }

    #[test]
    fn test_send_requires_known_client() {
        let mut h = Harness::new(multi_config());
        let request = crate::send::SendRequest {
            client_id: None,
            stream: 1,
            ppid: sctp_wire::PayloadProtocolId(3),
            payload: bytes::Bytes::from_static(b"x"),
        };
        assert!(matches!(
            h.endpoint.send(request.clone()).unwrap_err(),
            SessionError::Config(_)
        ));
        let request = crate::send::SendRequest {
            client_id: Some(42),
            ..request
        };
        assert!(matches!(
            h.endpoint.send(request).unwrap_err(),
            SessionError::UnknownClient(42)
        ));
    }
}
