//! SCTP socket creation.

use crate::error::{Result, SessionError};
use crate::resolver::AddressFamily;
use crate::settings::ProtocolSettings;
use crate::socket::SocketApi;
use std::os::fd::RawFd;
use tracing::{debug, warn};

/// Create a socket and apply the current protocol settings.
///
/// Option failures are logged and the socket is still returned.
pub fn create_socket(
    sockets: &mut dyn SocketApi,
    settings: &ProtocolSettings,
    family: AddressFamily,
) -> Result<RawFd> {
    debug!("Creating SCTP socket ({})", family);
    let fd = sockets
        .create(family)
        .map_err(|source| SessionError::SocketCreation { family, source })?;

    debug!("Setting SCTP socket options (initmsg) on fd {}", fd);
    if let Err(e) = sockets.set_init_params(fd, &settings.init) {
        warn!("Setsockopt error (initmsg) on fd {}: {}", fd, e);
    }

    debug!("Setting SCTP socket options (events) on fd {}", fd);
    if let Err(e) = sockets.set_events(fd, settings.events) {
        warn!("Setsockopt error (events) on fd {}: {}", fd, e);
    }

    Ok(fd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSockets;
    use sctp_wire::EventSubscription;

    #[test]
    fn test_applies_settings() {
        let fake = FakeSockets::new();
        let mut sockets = fake.clone();
        let settings = ProtocolSettings {
            events: EventSubscription::DATA_IO | EventSubscription::ASSOCIATION,
            ..Default::default()
        };

        let fd = create_socket(&mut sockets, &settings, AddressFamily::Inet).unwrap();
        let state = fake.state();
        assert_eq!(state.created, vec![(fd, AddressFamily::Inet)]);
        assert_eq!(state.init_params.get(&fd), Some(&settings.init));
        assert_eq!(state.events.get(&fd), Some(&settings.events));
    }

    #[test]
    fn test_option_failure_is_not_fatal() {
        let fake = FakeSockets::new();
        fake.state().fail_options = true;
        let mut sockets = fake.clone();

        let fd = create_socket(&mut sockets, &ProtocolSettings::default(), AddressFamily::Inet6);
        assert!(fd.is_ok());
    }

    #[test]
    fn test_socket_call_failure() {
        let fake = FakeSockets::new();
        fake.state().fail_create = true;
        let mut sockets = fake.clone();

        let err = create_socket(&mut sockets, &ProtocolSettings::default(), AddressFamily::Inet)
            .unwrap_err();
        assert!(matches!(err, SessionError::SocketCreation { .. }));
    }
}
