use crate::clusters::swims::swim::Swim;
use crate::clusters::swims::{
    ControlCommand, OutboundPacket, SwimCommand, SwimEvent, SwimTimer,
};
use crate::clusters::{AddressFamily, KnownNodes, Node};
use crate::schedulers::actor::ticks_for;
use crate::schedulers::ticker_message::TickerCommand;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};

// ==========================================
// PROTOCOL LAYER (SWIM Actor)
// ==========================================

pub struct SwimActor {
    mailbox: mpsc::Receiver<SwimCommand>,
    transport_tx: mpsc::Sender<OutboundPacket>,
    ticker_tx: mpsc::Sender<TickerCommand<SwimTimer>>,
    events_tx: broadcast::Sender<SwimEvent>,
    family: AddressFamily,
    seeds: Vec<SocketAddr>,
    pending_pings: HashMap<SocketAddr, Vec<oneshot::Sender<bool>>>,
    state: Swim,
}

impl SwimActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        local: Arc<Node>,
        directory: Arc<KnownNodes>,
        seeds: Vec<SocketAddr>,
        max_broadcast_bytes: usize,
        mailbox: mpsc::Receiver<SwimCommand>,
        transport_tx: mpsc::Sender<OutboundPacket>,
        ticker_tx: mpsc::Sender<TickerCommand<SwimTimer>>,
        events_tx: broadcast::Sender<SwimEvent>,
    ) -> Self {
        let family = directory.family();
        Self {
            mailbox,
            transport_tx,
            ticker_tx,
            events_tx,
            family,
            seeds,
            pending_pings: HashMap::new(),
            state: Swim::new(local, directory, max_broadcast_bytes),
        }
    }

    pub async fn run(mut self) {
        tracing::info!("SwimActor started for {}", self.state.local());

        for seed in std::mem::take(&mut self.seeds) {
            self.state.join(seed);
        }
        self.flush().await;

        while let Some(event) = self.mailbox.recv().await {
            self.handle_actor_event(event).await;
        }
        tracing::info!("SwimActor mailbox closed, stopping");
    }

    async fn handle_actor_event(&mut self, event: SwimCommand) {
        match event {
            SwimCommand::PacketReceived { message } => self.state.step(message),
            SwimCommand::Timeout(tick_event) => self.state.handle_timeout(tick_event),
            SwimCommand::Control(command) => self.handle_control(command).await,
        }

        self.flush().await;
    }

    async fn handle_control(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Join(addr) => self.state.join(addr),
            ControlCommand::Leave(addr) => self.state.leave(addr),
            ControlCommand::Broadcast { payload, reply } => {
                let _ = reply.send(self.state.broadcast(payload));
            }
            ControlCommand::Ping { target, reply } => {
                let key = self.family.canonicalize(target).unwrap_or(target);
                self.pending_pings.entry(key).or_default().push(reply);
                self.state.ping(target);
            }
            ControlCommand::SetHeartbeat(period) => {
                let ticks = ticks_for(period);
                if self
                    .ticker_tx
                    .send(TickerCommand::SetProtocolPeriod(ticks))
                    .await
                    .is_err()
                {
                    tracing::warn!("Scheduler is gone; protocol period unchanged");
                }
            }
        }
    }

    async fn flush(&mut self) {
        for event in self.state.take_events() {
            self.publish(event);
        }

        // The transport waits on our mailbox, so never block on its queue.
        // A dropped datagram is just a lost packet to the protocol.
        for pkt in self.state.take_outbound() {
            match self.transport_tx.try_send(pkt) {
                Ok(()) => {}
                Err(TrySendError::Full(pkt)) => {
                    tracing::warn!(
                        "Transport queue full, dropping {} to {}",
                        pkt.message().verb(),
                        pkt.target
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Transport is gone, dropping outbound packet");
                }
            }
        }

        for cmd in self.state.take_timer_commands() {
            let _ = self.ticker_tx.send(cmd.into()).await;
        }
    }

    fn publish(&mut self, event: SwimEvent) {
        if let SwimEvent::PingCompleted { target, alive } = event {
            for reply in self.pending_pings.remove(&target).unwrap_or_default() {
                let _ = reply.send(alive);
            }
            return;
        }
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::NodeDirectory;
    use std::time::Duration;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[tokio::test]
    async fn stalled_transport_does_not_block_the_mailbox() {
        let directory = Arc::new(KnownNodes::new(AddressFamily::V4));
        let local = directory.lookup_or_create(addr(8000)).unwrap();

        let (mailbox_tx, mailbox_rx) = mpsc::channel(16);
        // Nobody drains the transport queue.
        let (transport_tx, _transport_rx) = mpsc::channel(1);
        let (ticker_tx, _ticker_rx) = mpsc::channel(64);
        let (events_tx, _) = broadcast::channel(16);

        let actor = SwimActor::new(
            local,
            directory,
            vec![],
            256,
            mailbox_rx,
            transport_tx,
            ticker_tx,
            events_tx,
        );
        tokio::spawn(actor.run());

        for port in 9000..9004 {
            mailbox_tx
                .send(ControlCommand::Join(addr(port)).into())
                .await
                .unwrap();
        }

        let (reply, alive) = oneshot::channel();
        mailbox_tx
            .send(
                ControlCommand::Ping {
                    target: addr(8000),
                    reply,
                }
                .into(),
            )
            .await
            .unwrap();

        let alive = tokio::time::timeout(Duration::from_secs(2), alive)
            .await
            .expect("actor stalled behind a full transport queue")
            .unwrap();
        assert!(alive);
    }
}
