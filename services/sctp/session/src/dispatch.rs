//! Readiness callbacks.
//!
//! The event loop owning the readiness facility calls these when a
//! registered fd becomes readable, writable or reports an error. Each call
//! runs to completion before the next one.

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::events::SctpEvent;
use crate::notify;
use crate::readiness::Interest;
use crate::reassembly::Progress;
use crate::reconnect::reconnect;
use crate::socket::{is_connected, RecvFlags};
use crate::table::SlotId;
use sctp_wire::{AssocChangeState, EventSubscription};
use std::io;
use std::os::fd::RawFd;
use tracing::{debug, info, warn};

impl Endpoint {
    /// `fd` is readable: accept on a listener, otherwise receive one part
    /// of a message.
    pub fn handle_readable(&mut self, fd: RawFd) -> Result<()> {
        if self.mode.accept(&mut self.core, fd)? {
            return Ok(());
        }
        let Some(id) = self.core.connections.find(fd) else {
            debug!("Readable event on unknown fd {}", fd);
            return Ok(());
        };

        let record = self.core.connections.get_mut(id)?;
        let received = match self.core.sockets.recv(fd, record.reassembly.recv_window()) {
            Ok(received) if received.len == 0 => None,
            Ok(received) => Some(received),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                debug!("Spurious readable event on fd {}", fd);
                return Ok(());
            }
            Err(e) => {
                warn!("Receive error on fd {}: {}", fd, e);
                None
            }
        };
        let Some(received) = received else {
            return self.connection_lost(id, fd);
        };

        let progress = record.reassembly.advance(
            received.len,
            received.flags.contains(RecvFlags::END_OF_RECORD),
        );
        let message = match progress {
            Progress::Partial => {
                debug!("Partial message on fd {}, waiting for more", fd);
                return Ok(());
            }
            Progress::Complete(message) => message,
        };

        if received.flags.contains(RecvFlags::NOTIFICATION) {
            return notify::handle_notification(&mut self.core, self.mode.as_mut(), fd, &message);
        }

        let info = received.info.unwrap_or_default();
        debug!(
            "Message of {} bytes on fd {} (stream {}, ppid {})",
            message.len(),
            fd,
            info.stream,
            info.ppid.0
        );
        self.core.deliver(SctpEvent::Data {
            client_id: fd,
            stream: info.stream,
            ppid: info.ppid.value(),
            payload: message,
        });
        Ok(())
    }

    /// `fd` is writable: complete a pending non-blocking connect
    pub fn handle_writable(&mut self, fd: RawFd) -> Result<()> {
        if !self.mode.completes_deferred_connects() {
            debug!("Writable event on fd {} ignored in {} mode", fd, self.mode.name());
            return Ok(());
        }
        let Some(id) = self.core.connections.find(fd) else {
            debug!("Writable event on unknown fd {}", fd);
            return Ok(());
        };
        let record = self.core.connections.get(id)?;
        let remote = match (record.connecting, record.remote) {
            (true, Some(remote)) => remote,
            _ => {
                debug!("Writable event on fd {} without a pending connect", fd);
                return Ok(());
            }
        };

        self.core.readiness.unregister(fd, Interest::WRITE);
        match self.core.sockets.connect(fd, &remote) {
            Err(e) if !is_connected(&e) => {
                warn!("Connect error to {}: {}", remote, e);
                self.core.remove_connection(id)?;
                self.core.deliver(SctpEvent::connect_failed(Some(fd), &e));
            }
            _ => {
                self.core.connections.get_mut(id)?.connecting = false;
                self.core.deliver(SctpEvent::connect_ok(fd));
                self.core.readiness.register_read(fd);
                info!("Connection successfully established to {}", remote);
            }
        }
        Ok(())
    }

    /// `fd` reported an error condition.
    ///
    /// A pending connect is completed through the writable path so a
    /// refused connect surfaces as a failed connect result. Otherwise the
    /// next receive surfaces the error.
    pub fn handle_error(&mut self, fd: RawFd) -> Result<()> {
        debug!("Error event on fd {}", fd);
        let connecting = match self.core.connections.find(fd) {
            Some(id) => self.core.connections.get(id)?.connecting,
            None => false,
        };
        if connecting {
            return self.handle_writable(fd);
        }
        self.handle_readable(fd)
    }

    fn connection_lost(&mut self, id: SlotId, fd: RawFd) -> Result<()> {
        info!("Connection closed on fd {}", fd);
        self.core.remove_connection(id)?;
        if self.core.subscribed(EventSubscription::ASSOCIATION) {
            self.core.deliver(SctpEvent::AssocChange {
                client_id: fd,
                state: AssocChangeState::CommLost,
            });
        }
        if self.core.config.reconnect {
            let attempts = self.core.config.reconnect_max_attempts;
            reconnect(&mut self.core, attempts)?;
        }
        Ok(())
    }
}
