//! `sctp_sndrcvinfo` ancillary data.
//!
//! Carried in a `SCTP_SNDRCV` control message on both send and receive.
//! Layout (host byte order unless noted):
//!
//! ```text
//! 0   u16 stream      2   u16 ssn        4   u16 flags     6   pad
//! 8   u32 ppid (network byte order)      12  u32 context
//! 16  u32 timetolive  20  u32 tsn        24  u32 cumtsn    28  i32 assoc_id
//! ```

use crate::error::WireError;
use crate::ppid::PayloadProtocolId;
use bytes::{Buf, BufMut};

/// Size of `struct sctp_sndrcvinfo`
pub const SNDRCV_INFO_SIZE: usize = 32;

/// Control message type of `sctp_sndrcvinfo` at level `IPPROTO_SCTP`
pub const SCTP_SNDRCV: i32 = 1;

/// Per-message send/receive metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SndRcvInfo {
    /// Stream number
    pub stream: u16,
    /// Stream sequence number
    pub ssn: u16,
    /// Message flags
    pub flags: u16,
    /// Payload protocol identifier
    pub ppid: PayloadProtocolId,
    /// Opaque send context
    pub context: u32,
    /// Message lifetime in milliseconds
    pub time_to_live: u32,
    /// Transmission sequence number
    pub tsn: u32,
    /// Cumulative TSN
    pub cum_tsn: u32,
    /// Association identifier
    pub assoc_id: i32,
}

impl SndRcvInfo {
    /// Metadata for an outbound message on the given stream
    pub fn outbound(stream: u16, ppid: PayloadProtocolId) -> Self {
        Self {
            stream,
            ppid,
            ..Default::default()
        }
    }

    /// Write the kernel representation
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        buf.put_u16_ne(self.stream);
        buf.put_u16_ne(self.ssn);
        buf.put_u16_ne(self.flags);
        buf.put_u16_ne(0);
        buf.put_slice(&self.ppid.to_be_bytes());
        buf.put_u32_ne(self.context);
        buf.put_u32_ne(self.time_to_live);
        buf.put_u32_ne(self.tsn);
        buf.put_u32_ne(self.cum_tsn);
        buf.put_i32_ne(self.assoc_id);
    }

    /// Kernel representation as a fixed array
    pub fn encode(&self) -> [u8; SNDRCV_INFO_SIZE] {
        let mut out = [0u8; SNDRCV_INFO_SIZE];
        self.encode_into(&mut &mut out[..]);
        out
    }

    /// Read the kernel representation
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < SNDRCV_INFO_SIZE {
            return Err(WireError::Truncated {
                what: "sndrcvinfo",
                need: SNDRCV_INFO_SIZE,
                have: buf.len(),
            });
        }
        let mut b = buf;
        let stream = b.get_u16_ne();
        let ssn = b.get_u16_ne();
        let flags = b.get_u16_ne();
        b.advance(2);
        let ppid = PayloadProtocolId::from_be_bytes([b[0], b[1], b[2], b[3]]);
        b.advance(4);
        Ok(Self {
            stream,
            ssn,
            flags,
            ppid,
            context: b.get_u32_ne(),
            time_to_live: b.get_u32_ne(),
            tsn: b.get_u32_ne(),
            cum_tsn: b.get_u32_ne(),
            assoc_id: b.get_i32_ne(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppid_is_network_order() {
        let info = SndRcvInfo::outbound(3, PayloadProtocolId(0x0102_0304));
        let raw = info.encode();
        assert_eq!(&raw[8..12], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(u16::from_ne_bytes([raw[0], raw[1]]), 3);
    }

    #[test]
    fn test_decode_received_info() {
        let info = SndRcvInfo {
            stream: 7,
            ssn: 2,
            flags: 0,
            ppid: PayloadProtocolId(46),
            context: 0,
            time_to_live: 0,
            tsn: 1000,
            cum_tsn: 999,
            assoc_id: 5,
        };
        assert_eq!(SndRcvInfo::decode(&info.encode()).unwrap(), info);
        assert!(SndRcvInfo::decode(&[0u8; 16]).is_err());
    }
}
