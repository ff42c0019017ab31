//! Socket level protocol settings applied to every new socket.

use sctp_wire::{EventSubscription, InitParams};
use serde::{Deserialize, Serialize};

/// Init parameters and notification subscriptions.
///
/// Written at start of day from configuration and overwritten wholesale by
/// runtime option updates. Only sockets created afterwards pick up a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSettings {
    /// `SCTP_INITMSG` values
    pub init: InitParams,
    /// `SCTP_EVENTS` subscription mask
    pub events: EventSubscription,
}

impl ProtocolSettings {
    /// Whether notifications of the given category are delivered
    pub fn subscribed(&self, category: EventSubscription) -> bool {
        self.events.contains(category)
    }
}
