use std::net::SocketAddr;

use bincode::{Decode, Encode};

use crate::clusters::NodeStatus;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum RpcRequest {
    Join(SocketAddr),
    /// Leaving with the node's own address takes it out of the cluster.
    Leave(SocketAddr),
    Broadcast(Vec<u8>),
    /// Turns the connection into a feed of received broadcasts.
    Stream,
    /// Turns the connection into a feed of membership changes.
    Monitor,
    Nodes,
    Healthy,
    /// Protocol period in milliseconds.
    SetHeartbeat(u64),
    SetLogThreshold(String),
    Ping(SocketAddr),
    LocalAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum RpcResponse {
    Ok,
    Error(String),
    Broadcast {
        origin: SocketAddr,
        index: u32,
        payload: Vec<u8>,
    },
    StatusChanged {
        addr: SocketAddr,
        status: NodeStatus,
        heartbeat: u32,
    },
    Nodes(Vec<NodeInfo>),
    Pong {
        alive: bool,
    },
    Address(SocketAddr),
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct NodeInfo {
    pub addr: SocketAddr,
    pub status: NodeStatus,
    pub heartbeat: u32,
}
