//! Outbound messages.

use crate::endpoint::EndpointCore;
use crate::events::{error_text, ClientId, SctpEvent};
use bytes::Bytes;
use sctp_wire::{PayloadProtocolId, SndRcvInfo};
use serde::{Deserialize, Serialize};
use std::os::fd::RawFd;
use tracing::{debug, warn};

/// One message to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Target association; required except in single client mode
    pub client_id: Option<ClientId>,
    /// Stream id
    pub stream: u16,
    /// Payload protocol id
    pub ppid: PayloadProtocolId,
    /// Message bytes
    pub payload: Bytes,
}

/// Hand the message to the kernel in one call.
///
/// A failed send is reported as a send failure event carrying the unsent
/// message; nothing is retried or queued.
pub(crate) fn send_message(
    core: &mut EndpointCore,
    target: RawFd,
    reported: Option<ClientId>,
    request: &SendRequest,
) {
    let info = SndRcvInfo::outbound(request.stream, request.ppid);
    match core.sockets.send(target, &request.payload, &info) {
        Ok(sent) => debug!(
            "Sent {} bytes on fd {} (stream {}, ppid {})",
            sent, target, request.stream, request.ppid.0
        ),
        Err(e) => {
            warn!("Send error on fd {}: {}", target, e);
            core.deliver(SctpEvent::SendFailed {
                client_id: reported,
                stream: request.stream,
                ppid: request.ppid.value(),
                payload: request.payload.clone(),
                error_message: error_text(&e),
            });
        }
    }
}
