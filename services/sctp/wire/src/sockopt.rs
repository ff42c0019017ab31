//! SCTP socket option payloads.

use bitflags::bitflags;
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `SCTP_RTOINFO` option name
pub const SCTP_RTOINFO: i32 = 0;
/// `SCTP_INITMSG` option name
pub const SCTP_INITMSG: i32 = 2;
/// `SCTP_EVENTS` option name
pub const SCTP_EVENTS: i32 = 11;

/// Association initialisation parameters (`struct sctp_initmsg`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitParams {
    /// Requested outbound streams
    pub num_ostreams: u16,
    /// Maximum inbound streams accepted
    pub max_instreams: u16,
    /// INIT retransmission attempts, 0 for the system default
    pub max_attempts: u16,
    /// Largest INIT RTO in milliseconds, 0 for the system default
    pub max_init_timeout: u16,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            num_ostreams: 64,
            max_instreams: 64,
            max_attempts: 0,
            max_init_timeout: 0,
        }
    }
}

impl InitParams {
    /// Kernel representation
    pub fn encode(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        let mut buf = &mut out[..];
        buf.put_u16_ne(self.num_ostreams);
        buf.put_u16_ne(self.max_instreams);
        buf.put_u16_ne(self.max_attempts);
        buf.put_u16_ne(self.max_init_timeout);
        out
    }
}

bitflags! {
    /// Notification categories the socket subscribes to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EventSubscription: u16 {
        /// Deliver `sctp_sndrcvinfo` with every data message
        const DATA_IO = 1 << 0;
        /// Association change notifications
        const ASSOCIATION = 1 << 1;
        /// Peer address change notifications
        const ADDRESS = 1 << 2;
        /// Send failure notifications
        const SEND_FAILURE = 1 << 3;
        /// Remote error notifications
        const PEER_ERROR = 1 << 4;
        /// Shutdown notifications
        const SHUTDOWN = 1 << 5;
        /// Partial delivery notifications
        const PARTIAL_DELIVERY = 1 << 6;
        /// Adaptation layer indications
        const ADAPTATION_LAYER = 1 << 7;
    }
}

impl Default for EventSubscription {
    fn default() -> Self {
        EventSubscription::all()
    }
}

impl EventSubscription {
    /// Kernel representation: one byte per category, in declaration order
    pub fn encode(&self) -> [u8; 8] {
        let order = [
            EventSubscription::DATA_IO,
            EventSubscription::ASSOCIATION,
            EventSubscription::ADDRESS,
            EventSubscription::SEND_FAILURE,
            EventSubscription::PEER_ERROR,
            EventSubscription::SHUTDOWN,
            EventSubscription::PARTIAL_DELIVERY,
            EventSubscription::ADAPTATION_LAYER,
        ];
        let mut out = [0u8; 8];
        for (slot, flag) in out.iter_mut().zip(order) {
            *slot = u8::from(self.contains(flag));
        }
        out
    }
}

/// `SO_LINGER` setting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Linger {
    /// Whether close lingers
    pub enabled: bool,
    /// Linger time in seconds
    pub seconds: u32,
}

impl Linger {
    /// Value in the form socket APIs expect
    pub fn as_duration(&self) -> Option<Duration> {
        self.enabled
            .then(|| Duration::from_secs(u64::from(self.seconds)))
    }
}

/// Retransmission timeout bounds (`struct sctp_rtoinfo`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtoInfo {
    /// Association identifier, 0 on one-to-one sockets
    pub assoc_id: i32,
    /// Initial RTO in milliseconds
    pub initial: u32,
    /// Maximum RTO in milliseconds
    pub max: u32,
    /// Minimum RTO in milliseconds
    pub min: u32,
}

impl RtoInfo {
    /// Kernel representation
    pub fn encode(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        let mut buf = &mut out[..];
        buf.put_i32_ne(self.assoc_id);
        buf.put_u32_ne(self.initial);
        buf.put_u32_ne(self.max);
        buf.put_u32_ne(self.min);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_subscription_bytes() {
        let all = EventSubscription::default().encode();
        assert_eq!(all, [1u8; 8]);

        let some = (EventSubscription::DATA_IO | EventSubscription::SHUTDOWN).encode();
        assert_eq!(some, [1, 0, 0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn test_init_params_layout() {
        let init = InitParams {
            num_ostreams: 10,
            max_instreams: 20,
            max_attempts: 3,
            max_init_timeout: 500,
        };
        let raw = init.encode();
        assert_eq!(u16::from_ne_bytes([raw[0], raw[1]]), 10);
        assert_eq!(u16::from_ne_bytes([raw[6], raw[7]]), 500);
    }

    #[test]
    fn test_linger_duration() {
        assert_eq!(Linger::default().as_duration(), None);
        let on = Linger {
            enabled: true,
            seconds: 5,
        };
        assert_eq!(on.as_duration(), Some(Duration::from_secs(5)));
    }
}
