use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use bincode::{Decode, Encode};

use crate::clusters::GossipError;

/// Lifecycle of a cluster member as seen by this process.
///
/// Alive, Suspected and Dead form a directed lifecycle.
/// `ForwardTo` is not a lifecycle state at all: it only ever appears as the
/// first member of a PINGREQ to name the probe target, and is never stored on
/// a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Encode, Decode)]
pub enum NodeStatus {
    #[default]
    Unknown,
    Alive,
    Suspected,
    Dead,
    ForwardTo,
}

impl NodeStatus {
    pub fn is_protocol_only(self) -> bool {
        self == NodeStatus::ForwardTo
    }

    /// How far along the failure path a status is. Used to let the stricter
    /// claim win when two pieces of gossip carry the same heartbeat.
    pub(crate) fn severity(self) -> u8 {
        match self {
            NodeStatus::Unknown | NodeStatus::ForwardTo => 0,
            NodeStatus::Alive => 1,
            NodeStatus::Suspected => 2,
            NodeStatus::Dead => 3,
        }
    }
}

impl From<NodeStatus> for u8 {
    fn from(status: NodeStatus) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for NodeStatus {
    type Error = GossipError;

    fn try_from(value: u8) -> Result<Self, GossipError> {
        match value {
            0 => Ok(NodeStatus::Unknown),
            1 => Ok(NodeStatus::Alive),
            2 => Ok(NodeStatus::Suspected),
            3 => Ok(NodeStatus::Dead),
            4 => Ok(NodeStatus::ForwardTo),
            other => Err(GossipError::InvalidStatus(other)),
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeStatus::Unknown => "UNKNOWN",
            NodeStatus::Alive => "ALIVE",
            NodeStatus::Suspected => "SUSPECTED",
            NodeStatus::Dead => "DEAD",
            NodeStatus::ForwardTo => "FORWARD_TO",
        };
        f.write_str(name)
    }
}

/// A peer, identified by IP and UDP response port.
///
/// Shared as `Arc<Node>` between the directory, in-flight messages and the
/// state machine, so heartbeat and status are atomics.
#[derive(Debug)]
pub struct Node {
    addr: SocketAddr,
    heartbeat: AtomicU32,
    status: AtomicU8,
}

impl Node {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            heartbeat: AtomicU32::new(0),
            status: AtomicU8::new(NodeStatus::Unknown.into()),
        }
    }

    #[inline]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn heartbeat(&self) -> u32 {
        self.heartbeat.load(Ordering::Acquire)
    }

    pub fn set_heartbeat(&self, heartbeat: u32) {
        self.heartbeat.store(heartbeat, Ordering::Release);
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus::try_from(self.status.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Stores `status` and reports whether it changed. `ForwardTo` is refused.
    pub fn set_status(&self, status: NodeStatus) -> bool {
        if status.is_protocol_only() {
            return false;
        }
        self.status.swap(status.into(), Ordering::AcqRel) != u8::from(status)
    }

    /// Admitted nodes are those the membership layer has formed an opinion on.
    pub fn is_admitted(&self) -> bool {
        self.status() != NodeStatus::Unknown
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for Node {}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}
