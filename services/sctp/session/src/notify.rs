//! Translation of kernel notifications into client events.

use crate::endpoint::EndpointCore;
use crate::error::Result;
use crate::events::SctpEvent;
use crate::mode::ConnectionMode;
use crate::reconnect::reconnect;
use sctp_wire::{AssocChangeState, EventSubscription, Notification};
use std::os::fd::RawFd;
use tracing::{debug, info, warn};

/// Handle one complete notification received on `fd`.
///
/// Each category is forwarded only when subscribed. A lost association is
/// dropped from the tables first and, in reconnect mode, re-established
/// after the event is delivered.
pub(crate) fn handle_notification(
    core: &mut EndpointCore,
    mode: &mut dyn ConnectionMode,
    fd: RawFd,
    message: &[u8],
) -> Result<()> {
    let notification = match Notification::decode(message) {
        Ok(notification) => notification,
        Err(e) => {
            warn!("Dropping malformed notification on fd {}: {}", fd, e);
            return Ok(());
        }
    };
    debug!("Notification on fd {}: {:?}", fd, notification);

    let (category, event) = match notification {
        Notification::AssocChange { state, .. } => {
            match state {
                AssocChangeState::CommUp => info!("Association up on fd {}", fd),
                AssocChangeState::CommLost => {
                    info!("Communication lost on fd {}", fd);
                    mode.association_lost(core, fd)?;
                }
                AssocChangeState::Restart => info!("Association restarted on fd {}", fd),
                AssocChangeState::ShutdownComplete => info!("Shutdown complete on fd {}", fd),
                AssocChangeState::CantStartAssociation => {
                    info!("Association could not start on fd {}", fd)
                }
                AssocChangeState::Unknown(code) => {
                    warn!("Unknown association change state {} on fd {}", code, fd)
                }
            }
            (
                EventSubscription::ASSOCIATION,
                SctpEvent::AssocChange {
                    client_id: fd,
                    state,
                },
            )
        }
        Notification::PeerAddrChange { state, .. } => (
            EventSubscription::ADDRESS,
            SctpEvent::PeerAddrChange {
                client_id: fd,
                state,
            },
        ),
        Notification::RemoteError { error } => {
            info!("Remote error {} on fd {}", error, fd);
            (
                EventSubscription::PEER_ERROR,
                SctpEvent::RemoteError { client_id: fd },
            )
        }
        Notification::SendFailed { error } => {
            info!("Send failed notification ({}) on fd {}", error, fd);
            (
                EventSubscription::SEND_FAILURE,
                SctpEvent::SendFailureNotification { client_id: fd },
            )
        }
        Notification::Shutdown => {
            info!("Peer shutdown on fd {}", fd);
            (
                EventSubscription::SHUTDOWN,
                SctpEvent::ShutdownEvent { client_id: fd },
            )
        }
        Notification::AdaptationIndication { .. } => (
            EventSubscription::ADAPTATION_LAYER,
            SctpEvent::AdaptationIndication { client_id: fd },
        ),
        Notification::PartialDelivery { .. } => (
            EventSubscription::PARTIAL_DELIVERY,
            SctpEvent::PartialDelivery { client_id: fd },
        ),
        Notification::Other { kind } => {
            warn!("Unknown notification type {:#06x} on fd {}", kind, fd);
            return Ok(());
        }
    };

    let lost = matches!(
        event,
        SctpEvent::AssocChange {
            state: AssocChangeState::CommLost,
            ..
        }
    );
    if core.subscribed(category) {
        core.deliver(event);
    }
    if lost && mode.reconnects_on_association_loss(core) {
        let attempts = core.config.reconnect_max_attempts;
        reconnect(core, attempts)?;
    }
    Ok(())
}
