//! Events delivered to the protocol client.

use bytes::Bytes;
use sctp_wire::{AssocChangeState, PeerAddrState, PpidValue};
use serde::Serialize;
use std::io;
use std::os::fd::RawFd;
use tokio::sync::mpsc;
use tracing::warn;

/// Identifier of an association or listener, its socket fd
pub type ClientId = RawFd;

/// Everything the endpoint reports upward
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SctpEvent {
    /// Outcome of a connect, listen or socket option request
    ConnectResult {
        /// Affected socket, absent when none was created
        client_id: Option<ClientId>,
        /// The request failed
        error_status: bool,
        /// Platform error text
        error_message: Option<String>,
    },
    /// A listener accepted an association
    PeerConnected {
        /// New association
        client_id: ClientId,
        /// Listener address
        local_address: String,
        /// Listener port
        local_port: u16,
        /// Peer address
        remote_address: String,
        /// Peer port
        remote_port: u16,
    },
    /// A complete user message
    Data {
        /// Receiving association
        client_id: ClientId,
        /// Stream id
        stream: u16,
        /// Payload protocol id
        ppid: PpidValue,
        /// Message bytes
        payload: Bytes,
    },
    /// An outbound message could not be sent
    SendFailed {
        /// Target association, when it is reported
        client_id: Option<ClientId>,
        /// Stream id of the message
        stream: u16,
        /// Payload protocol id of the message
        ppid: PpidValue,
        /// Message bytes
        payload: Bytes,
        /// Platform error text
        error_message: String,
    },
    /// Association state changed
    AssocChange {
        /// Association
        client_id: ClientId,
        /// New state
        state: AssocChangeState,
    },
    /// Peer address state changed
    PeerAddrChange {
        /// Association
        client_id: ClientId,
        /// New state
        state: PeerAddrState,
    },
    /// Peer reported an operational error
    RemoteError {
        /// Association
        client_id: ClientId,
    },
    /// Kernel could not deliver a message
    SendFailureNotification {
        /// Association
        client_id: ClientId,
    },
    /// Peer started shutdown
    ShutdownEvent {
        /// Association
        client_id: ClientId,
    },
    /// Peer adaptation layer indication
    AdaptationIndication {
        /// Association
        client_id: ClientId,
    },
    /// Partial delivery aborted
    PartialDelivery {
        /// Association
        client_id: ClientId,
    },
}

impl SctpEvent {
    /// Successful result for `fd`
    pub fn connect_ok(fd: ClientId) -> Self {
        SctpEvent::ConnectResult {
            client_id: Some(fd),
            error_status: false,
            error_message: None,
        }
    }

    /// Failed result carrying the platform error text
    pub fn connect_failed(client_id: Option<ClientId>, err: &io::Error) -> Self {
        SctpEvent::ConnectResult {
            client_id,
            error_status: true,
            error_message: Some(error_text(err)),
        }
    }

    /// Association or listener the event refers to
    pub fn client_id(&self) -> Option<ClientId> {
        match self {
            SctpEvent::ConnectResult { client_id, .. } | SctpEvent::SendFailed { client_id, .. } => {
                *client_id
            }
            SctpEvent::PeerConnected { client_id, .. }
            | SctpEvent::Data { client_id, .. }
            | SctpEvent::AssocChange { client_id, .. }
            | SctpEvent::PeerAddrChange { client_id, .. }
            | SctpEvent::RemoteError { client_id }
            | SctpEvent::SendFailureNotification { client_id }
            | SctpEvent::ShutdownEvent { client_id }
            | SctpEvent::AdaptationIndication { client_id }
            | SctpEvent::PartialDelivery { client_id } => Some(*client_id),
        }
    }
}

/// `strerror` style text of an I/O error
pub(crate) fn error_text(err: &io::Error) -> String {
    match err.raw_os_error() {
        Some(code) => io::Error::from_raw_os_error(code)
            .to_string()
            .split(" (os error")
            .next()
            .unwrap_or_default()
            .to_string(),
        None => err.to_string(),
    }
}

/// Delivery channel to the protocol client
pub trait EventSink: Send {
    /// Hand one event to the client
    fn deliver(&mut self, event: SctpEvent);
}

impl EventSink for mpsc::UnboundedSender<SctpEvent> {
    fn deliver(&mut self, event: SctpEvent) {
        if self.send(event).is_err() {
            warn!("Event receiver dropped, discarding event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_text_strips_code() {
        let err = io::Error::from_raw_os_error(libc::ECONNREFUSED);
        assert_eq!(error_text(&err), "Connection refused");
    }

    #[test]
    fn test_event_json_shape() {
        let event = SctpEvent::Data {
            client_id: 7,
            stream: 1,
            ppid: PpidValue::Wide("4294967295".to_string()),
            payload: Bytes::from_static(b"\x01\x02"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "data");
        assert_eq!(json["client_id"], 7);
        assert_eq!(json["ppid"], "4294967295");
        assert_eq!(event.client_id(), Some(7));
    }

    #[test]
    fn test_mpsc_sink_delivers() {
        let (mut tx, mut rx) = mpsc::unbounded_channel();
        tx.deliver(SctpEvent::connect_ok(4));
        assert_eq!(rx.try_recv().unwrap(), SctpEvent::connect_ok(4));

        drop(rx);
        // a closed receiver only logs
        tx.deliver(SctpEvent::ShutdownEvent { client_id: 4 });
    }
}
