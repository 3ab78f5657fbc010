use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GossipError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GossipError {
    /// The datagram was corrupted in flight. Dropped, never retried.
    #[error("checksum failure from {from}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        from: IpAddr,
        expected: u32,
        actual: u32,
    },

    #[error("member list overflow")]
    MemberListOverflow,

    #[error("malformed broadcast section: {0}")]
    MalformedBroadcast(String),

    #[error("address {0} cannot be represented in the active address family")]
    UnresolvableAddress(SocketAddr),

    #[error("unknown node status byte {0:#04x}")]
    InvalidStatus(u8),

    #[error("datagram truncated: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    #[error("broadcast payload of {0} bytes exceeds the allowed size")]
    BroadcastTooLarge(usize),

    #[error("the gossip actor has stopped")]
    ClusterStopped,
}
