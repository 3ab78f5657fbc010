use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::clusters::{Broadcast, GossipError, Message, Node, NodeStatus};
use crate::schedulers::{
    ticker::{DIRECT_ACK_TIMEOUT_TICKS, INDIRECT_ACK_TIMEOUT_TICKS, SUSPECT_TIMEOUT_TICKS},
    timer::TTimer,
};

/// Internal Events (Actor Logic)
#[derive(Debug)]
pub enum SwimCommand {
    // From Transport
    PacketReceived { message: Message },
    // From Ticker
    Timeout(SwimTimeOutCallback),
    // From the RPC control plane
    Control(ControlCommand),
}

#[derive(Debug)]
pub enum ControlCommand {
    Join(SocketAddr),
    Leave(SocketAddr),
    Broadcast {
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<(), GossipError>>,
    },
    Ping {
        target: SocketAddr,
        reply: oneshot::Sender<bool>,
    },
    SetHeartbeat(Duration),
}

impl From<SwimTimeOutCallback> for SwimCommand {
    fn from(value: SwimTimeOutCallback) -> Self {
        SwimCommand::Timeout(value)
    }
}

impl From<ControlCommand> for SwimCommand {
    fn from(value: ControlCommand) -> Self {
        SwimCommand::Control(value)
    }
}

#[derive(Debug, Default)]
pub enum SwimTimeOutCallback {
    #[default]
    ProtocolPeriodElapsed,
    TimedOut {
        seq: u32,
        target: Option<SocketAddr>,
        phase: ProbePhase,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePhase {
    Direct,
    Indirect,
    Suspect,
}

/// Where a single probe of one target stands, from the prober's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    AwaitingDirectAck,
    AwaitingIndirectAck,
    ConfirmedAlive,
    Suspected,
    Dead,
}

/// Observable effects of the state machine, fanned out by the actor.
#[derive(Debug, Clone)]
pub enum SwimEvent {
    StatusChanged {
        node: Arc<Node>,
        status: NodeStatus,
        heartbeat: u32,
    },
    BroadcastReceived(Broadcast),
    PingCompleted {
        target: SocketAddr,
        alive: bool,
    },
}

/// Outbound Commands (Logic -> Transport)
#[derive(Debug)]
pub struct OutboundPacket {
    pub target: SocketAddr,
    message: Message,
}

impl OutboundPacket {
    pub(crate) fn new(target: SocketAddr, message: Message) -> Self {
        OutboundPacket { target, message }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }
}

#[derive(Debug)]
pub(crate) struct SwimTimer {
    target: SocketAddr,
    phase: ProbePhase,
    ticks_remaining: u32,
}

impl TTimer for SwimTimer {
    type Callback = SwimTimeOutCallback;

    fn tick(&mut self) -> u32 {
        self.ticks_remaining = self.ticks_remaining.saturating_sub(1);
        self.ticks_remaining
    }

    fn to_timeout_callback(self, seq: u32) -> SwimTimeOutCallback {
        SwimTimeOutCallback::TimedOut {
            seq,
            target: Some(self.target),
            phase: self.phase,
        }
    }

    #[cfg(test)]
    fn target(&self) -> Option<SocketAddr> {
        Some(self.target)
    }
}

impl SwimTimer {
    pub(crate) fn direct_probe(target: SocketAddr) -> Self {
        Self {
            target,
            phase: ProbePhase::Direct,
            ticks_remaining: DIRECT_ACK_TIMEOUT_TICKS,
        }
    }

    pub(crate) fn indirect_probe(target: SocketAddr) -> Self {
        Self {
            target,
            phase: ProbePhase::Indirect,
            ticks_remaining: INDIRECT_ACK_TIMEOUT_TICKS,
        }
    }

    pub(crate) fn suspect_timer(target: SocketAddr) -> Self {
        Self {
            target,
            phase: ProbePhase::Suspect,
            ticks_remaining: SUSPECT_TIMEOUT_TICKS,
        }
    }
}
