//! poll(2) readiness loop driving the endpoint.

use anyhow::Result;
use sctp_session::{Endpoint, ErrorCategory, Interest, InterestRegistry, SessionError};
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Readiness reported for one fd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ready {
    Error,
    Writable,
    Readable,
    WritableAndReadable,
}

/// Poll the registered fds until `running` is cleared or a fatal error.
///
/// The endpoint is handed back either way so the caller can unmap it.
pub fn run(
    mut endpoint: Endpoint,
    registry: InterestRegistry,
    running: Arc<AtomicBool>,
    interval: Duration,
) -> (Endpoint, Result<()>) {
    let result = poll_loop(&mut endpoint, &registry, &running, interval);
    (endpoint, result)
}

fn poll_loop(
    endpoint: &mut Endpoint,
    registry: &InterestRegistry,
    running: &AtomicBool,
    interval: Duration,
) -> Result<()> {
    let timeout = i32::try_from(interval.as_millis()).unwrap_or(i32::MAX);

    while running.load(Ordering::SeqCst) {
        let mut fds: Vec<libc::pollfd> = registry
            .snapshot()
            .into_iter()
            .map(|(fd, interest)| libc::pollfd {
                fd,
                events: poll_events(interest),
                revents: 0,
            })
            .collect();
        if fds.is_empty() {
            std::thread::sleep(interval);
            continue;
        }

        // SAFETY: fds is a valid, exclusively borrowed array of fds.len() entries.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err.into());
        }

        for pollfd in fds.iter().filter(|p| p.revents != 0) {
            // An earlier callback in this round may have closed the fd.
            if registry.interest(pollfd.fd).is_empty() {
                continue;
            }
            let Some(ready) = classify(pollfd.revents) else {
                continue;
            };
            if let Err(e) = dispatch(endpoint, pollfd.fd, ready) {
                if is_fatal(&e) {
                    error!(component = "poller", "Fatal endpoint error: {}", e);
                    return Err(e.into());
                }
                warn!(component = "poller", client_id = pollfd.fd, "{}", e);
            }
        }
    }
    debug!(component = "poller", "Poll loop stopped");
    Ok(())
}

/// Only usage errors leave the loop running
fn is_fatal(err: &SessionError) -> bool {
    match err.category() {
        ErrorCategory::Configuration => false,
        ErrorCategory::Resource | ErrorCategory::Recovery | ErrorCategory::Defect => true,
    }
}

fn poll_events(interest: Interest) -> libc::c_short {
    let mut events = 0;
    if interest.contains(Interest::READ) {
        events |= libc::POLLIN;
    }
    if interest.contains(Interest::WRITE) {
        events |= libc::POLLOUT;
    }
    events
}

fn classify(revents: libc::c_short) -> Option<Ready> {
    if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        return Some(Ready::Error);
    }
    match (revents & libc::POLLOUT != 0, revents & libc::POLLIN != 0) {
        (true, true) => Some(Ready::WritableAndReadable),
        (true, false) => Some(Ready::Writable),
        (false, true) => Some(Ready::Readable),
        (false, false) => None,
    }
}

fn dispatch(endpoint: &mut Endpoint, fd: RawFd, ready: Ready) -> Result<(), SessionError> {
    match ready {
        Ready::Error => endpoint.handle_error(fd),
        Ready::Readable => endpoint.handle_readable(fd),
        Ready::Writable => endpoint.handle_writable(fd),
        Ready::WritableAndReadable => {
            endpoint.handle_writable(fd)?;
            endpoint.handle_readable(fd)
        }
    }
}
