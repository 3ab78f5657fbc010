use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::clusters::swims::actor::SwimActor;
use crate::clusters::swims::{ControlCommand, SwimCommand, SwimEvent};
use crate::clusters::transport::SwimTransportActor;
use crate::clusters::{AddressFamily, GossipError, KnownNodes, Node, NodeDirectory};
use crate::schedulers::actor::run_scheduling_actor;

const MAILBOX_CAPACITY: usize = 1024;
const EVENT_CAPACITY: usize = 256;

/// What a gossip node needs to know before it starts.
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub bind_addr: SocketAddr,
    pub family: AddressFamily,
    pub seeds: Vec<SocketAddr>,
    pub protocol_period: Duration,
    pub max_broadcast_bytes: usize,
}

/// Cheap, cloneable front door to a running gossip node.
#[derive(Clone)]
pub struct ClusterHandle {
    commands: mpsc::Sender<SwimCommand>,
    directory: Arc<KnownNodes>,
    local: Arc<Node>,
    events: broadcast::Sender<SwimEvent>,
}

impl ClusterHandle {
    /// Binds the gossip socket and spawns transport, scheduler and SWIM actor.
    pub async fn start(options: ClusterOptions) -> anyhow::Result<Self> {
        let directory = Arc::new(KnownNodes::new(options.family));

        let (swim_tx, swim_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (transport_tx, transport_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (ticker_tx, ticker_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let transport = SwimTransportActor::new(
            options.bind_addr,
            directory.clone(),
            swim_tx.clone(),
            transport_rx,
        )
        .await?;
        let local = directory.lookup_or_create(transport.local_addr()?)?;

        let actor = SwimActor::new(
            local.clone(),
            directory.clone(),
            options.seeds,
            options.max_broadcast_bytes,
            swim_rx,
            transport_tx,
            ticker_tx,
            events_tx.clone(),
        );

        tokio::spawn(transport.run());
        tokio::spawn(run_scheduling_actor(
            swim_tx.clone(),
            ticker_rx,
            options.protocol_period,
        ));
        tokio::spawn(actor.run());

        Ok(Self {
            commands: swim_tx,
            directory,
            local,
            events: events_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local.addr()
    }

    /// Every node that has been admitted, in address order.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.directory.admitted()
    }

    /// Admitted nodes currently believed alive, in address order.
    pub fn healthy(&self) -> Vec<Arc<Node>> {
        self.directory.healthy()
    }

    pub async fn join(&self, addr: SocketAddr) -> Result<(), GossipError> {
        self.control(ControlCommand::Join(addr)).await
    }

    pub async fn leave(&self, addr: SocketAddr) -> Result<(), GossipError> {
        self.control(ControlCommand::Leave(addr)).await
    }

    pub async fn set_protocol_period(&self, period: Duration) -> Result<(), GossipError> {
        self.control(ControlCommand::SetHeartbeat(period)).await
    }

    pub async fn broadcast(&self, payload: Vec<u8>) -> Result<(), GossipError> {
        let (reply, rx) = oneshot::channel();
        self.control(ControlCommand::Broadcast { payload, reply })
            .await?;
        rx.await.map_err(|_| GossipError::ClusterStopped)?
    }

    /// Resolves once `target` acks or the direct probe times out.
    pub async fn ping(&self, target: SocketAddr) -> Result<bool, GossipError> {
        let (reply, rx) = oneshot::channel();
        self.control(ControlCommand::Ping { target, reply }).await?;
        rx.await.map_err(|_| GossipError::ClusterStopped)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SwimEvent> {
        self.events.subscribe()
    }

    async fn control(&self, command: ControlCommand) -> Result<(), GossipError> {
        self.commands
            .send(command.into())
            .await
            .map_err(|_| GossipError::ClusterStopped)
    }
}
