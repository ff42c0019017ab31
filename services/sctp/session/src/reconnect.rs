//! Forced reconnect with bounded exponential backoff.

use crate::endpoint::EndpointCore;
use crate::error::{Result, SessionError};
use crate::table::ConnectionRecord;
use std::os::fd::RawFd;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delays between failed reconnect attempts.
///
/// Starts at one unit and doubles after every second failure:
/// 1, 1, 2, 2, 4, 4, ...
#[derive(Debug, Clone)]
pub struct Backoff {
    unit: Duration,
    factor: u32,
    failures: u32,
}

impl Backoff {
    /// Sequence measured in `unit`
    pub fn new(unit: Duration) -> Self {
        Self {
            unit,
            factor: 1,
            failures: 0,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.failures % 2 == 0 && self.failures != 0 {
            self.factor = self.factor.saturating_mul(2);
        }
        self.failures += 1;
        Some(self.unit.saturating_mul(self.factor))
    }
}

/// Blocking wait between attempts
pub trait Sleeper: Send {
    /// Block for `duration`
    fn sleep(&mut self, duration: Duration);
}

/// Sleeps on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Reconnect to the configured peer.
///
/// Resolves the peer once, then makes up to `max_attempts` blocking
/// connects. No other association is serviced meanwhile. Running out of
/// attempts is fatal.
pub(crate) fn reconnect(core: &mut EndpointCore, max_attempts: u32) -> Result<RawFd> {
    let (name, port) = core.peer_target(None, None)?;
    let (peer, family) = core.resolve(&name, port)?;
    info!("[reconnect] Connecting to {}:{}", name, port);

    let mut backoff = Backoff::new(core.config.reconnect_backoff_unit);
    for attempt in 1..=max_attempts {
        let fd = core.create_socket(family)?;
        match core.sockets.connect(fd, &peer) {
            Ok(()) => {
                core.connections.put(fd, ConnectionRecord::established());
                core.set_nonblocking(fd)?;
                core.readiness.register_read(fd);
                info!(
                    "[reconnect] Connection successfully established to {}:{}",
                    name, port
                );
                return Ok(fd);
            }
            Err(e) => {
                core.close_socket(fd);
                warn!("[reconnect] Connect error (attempt {}/{}): {}", attempt, max_attempts, e);
                if let Some(delay) = backoff.next() {
                    debug!("[reconnect] Waiting {:?} before the next attempt", delay);
                    core.sleeper.sleep(delay);
                }
            }
        }
    }

    Err(SessionError::ReconnectExhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::readiness::Interest;
    use crate::testing::Harness;
    use std::io;

    #[test]
    fn test_backoff_sequence() {
        let delays: Vec<u64> = Backoff::new(Duration::from_secs(1))
            .take(8)
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![1, 1, 2, 2, 4, 4, 8, 8]);
    }

    fn reconnect_config() -> EndpointConfig {
        EndpointConfig {
            simple_mode: true,
            reconnect: true,
            peer_address: Some("127.0.0.1".to_string()),
            peer_port: Some(9000),
            ..Default::default()
        }
    }

    #[test]
    fn test_exhaustion_is_fatal() {
        let mut h = Harness::new(reconnect_config());
        for _ in 0..6 {
            h.sockets.push_connect(Err(io::Error::from_raw_os_error(libc::ECONNREFUSED)));
        }

        let err = reconnect(&mut h.endpoint.core, 6).unwrap_err();
        assert!(matches!(err, SessionError::ReconnectExhausted { attempts: 6 }));
        assert_eq!(
            h.sleeps(),
            vec![1, 1, 2, 2, 4, 4]
                .into_iter()
                .map(Duration::from_secs)
                .collect::<Vec<_>>()
        );

        let state = h.sockets.state();
        assert_eq!(state.created.len(), 6);
        assert_eq!(state.closed.len(), 6);
        assert!(h.endpoint.core.connections.is_empty());
        assert_eq!(h.endpoint.current_fd(), None);
    }

    #[test]
    fn test_success_after_failures() {
        let mut h = Harness::new(reconnect_config());
        h.sockets.push_connect(Err(io::Error::from_raw_os_error(libc::ECONNREFUSED)));
        h.sockets.push_connect(Ok(()));

        let fd = reconnect(&mut h.endpoint.core, 6).unwrap();
        assert_eq!(h.sleeps(), vec![Duration::from_secs(1)]);
        assert_eq!(h.endpoint.connection_count(), 1);
        assert_eq!(h.endpoint.current_fd(), Some(fd));
        assert_eq!(h.registry.interest(fd), Interest::READ);
        assert!(h.sockets.state().nonblocking.contains(&fd));
    }

    #[test]
    fn test_requires_peer() {
        let mut h = Harness::new(EndpointConfig {
            simple_mode: true,
            ..Default::default()
        });
        let err = reconnect(&mut h.endpoint.core, 3).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        assert!(h.sockets.state().created.is_empty());
    }
}
